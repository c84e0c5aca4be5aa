//! Apply a YAML patch manifest to template and page files.
//!
//! Usage: `apply-patches [--dry-run] <manifest.yml>`
//!
//! Missing anchors are reported and skipped. With `--dry-run` nothing is
//! written; the tool only reports what would change.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regional_dashboard::patch::{manifest::Manifest, PatchOutcome};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regional_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut dry_run = false;
    let mut manifest_path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" | "-n" => dry_run = true,
            _ if manifest_path.is_none() => manifest_path = Some(PathBuf::from(arg)),
            _ => {
                eprintln!("unexpected argument: {}", arg);
                return ExitCode::FAILURE;
            }
        }
    }
    let Some(manifest_path) = manifest_path else {
        eprintln!("usage: apply-patches [--dry-run] <manifest.yml>");
        return ExitCode::FAILURE;
    };

    let manifest = match Manifest::load(&manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0;
    for result in manifest.apply(dry_run) {
        match result {
            Ok(report) => {
                let applied = report
                    .outcomes
                    .iter()
                    .filter(|o| matches!(o, PatchOutcome::Applied { .. }))
                    .count();
                let verb = match (report.changed, dry_run) {
                    (true, true) => "would change",
                    (true, false) => "patched",
                    (false, _) => "unchanged",
                };
                println!(
                    "{:<12} {} ({} of {} op(s) applied)",
                    verb,
                    report.path.display(),
                    applied,
                    report.outcomes.len()
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("error: {}", e);
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
