//! Report maintenance tool
//!
//! Usage:
//!   `repair-reports fix-missing <report_id>` - restore or fail one report
//!   `repair-reports fix-stuck` - complete reports stuck in processing
//!   `repair-reports monitor` - check completed reports' artifacts
//!
//! Reads `config.yml` (with `DASHBOARD_*` overrides) like the server.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regional_dashboard::{
    config::Config,
    db::{self, repositories::SqlxReportRepository},
    services::{reports::repair::FixOutcome, ReportService},
};

const USAGE: &str = "usage: repair-reports <fix-missing <report_id> | fix-stuck | monitor>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regional_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) when the command ran but found problems it could not fix
async fn run(args: &[String]) -> Result<bool> {
    let command = args.first().map(String::as_str);
    if !matches!(command, Some("fix-missing" | "fix-stuck" | "monitor")) {
        bail!(USAGE);
    }

    let config = Config::load_with_env(Path::new("config.yml"))?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;
    let service = Arc::new(ReportService::new(
        SqlxReportRepository::boxed(pool.clone()),
        &config.paths,
    ));

    let ok = match command {
        Some("fix-missing") => {
            let Some(report_id) = args.get(1) else {
                bail!(USAGE);
            };
            match service.fix_missing(report_id).await? {
                FixOutcome::PathRestored { file_path } => {
                    println!("{}: artifact path restored ({})", report_id, file_path);
                    true
                }
                FixOutcome::MarkedFailed => {
                    println!("{}: no artifact found, marked failed", report_id);
                    false
                }
                FixOutcome::Unchanged => {
                    println!("{}: nothing to fix", report_id);
                    true
                }
            }
        }
        Some("fix-stuck") => {
            let summary = service.fix_stuck_processing().await?;
            for id in &summary.completed {
                println!("completed  {}", id);
            }
            for renamed in &summary.renamed {
                println!("renamed    {} -> {}", renamed.old_id, renamed.new_id);
            }
            for id in &summary.untouched {
                println!("untouched  {}", id);
            }
            println!(
                "{} completed, {} renamed, {} without artifact",
                summary.completed.len(),
                summary.renamed.len(),
                summary.untouched.len()
            );
            summary.untouched.is_empty()
        }
        _ => {
            let report = service.monitor().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!(
                "{} completed report(s), {} problem(s)",
                report.total,
                report.problem_count()
            );
            report.problem_count() == 0
        }
    };

    pool.close().await;
    Ok(ok)
}
