//! Replay a YAML UI walkthrough against the running dashboard.
//!
//! Usage: `run-demo <scenario.yml> [--headless] [--screen big|small] [--base-url URL] [--dry-run]`
//!
//! `--dry-run` replays the steps against a recording driver and prints the
//! browser calls instead of opening Chromium. A real browser needs the
//! `browser` feature.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regional_dashboard::demo::{BrowserDriver, DemoRunner, RecordingDriver, Scenario, Viewport};

const USAGE: &str =
    "usage: run-demo <scenario.yml> [--headless] [--screen big|small] [--base-url URL] [--dry-run]";

#[derive(Debug, Default)]
struct Options {
    scenario: Option<PathBuf>,
    headless: bool,
    screen: Option<String>,
    base_url: Option<String>,
    dry_run: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--headless" => options.headless = true,
            "--dry-run" => options.dry_run = true,
            "--screen" => options.screen = Some(args.next().ok_or("--screen needs a value")?),
            "--base-url" => options.base_url = Some(args.next().ok_or("--base-url needs a value")?),
            _ if arg.starts_with("--") => return Err(format!("unknown option: {}", arg)),
            _ if options.scenario.is_none() => options.scenario = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument: {}", arg)),
        }
    }
    Ok(options)
}

#[cfg(feature = "browser")]
async fn browser_driver(options: &Options, viewport: Viewport) -> Result<Arc<dyn BrowserDriver>, String> {
    let driver = regional_dashboard::demo::ChromiumDriver::launch(options.headless, viewport)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Arc::new(driver))
}

#[cfg(not(feature = "browser"))]
async fn browser_driver(_options: &Options, _viewport: Viewport) -> Result<Arc<dyn BrowserDriver>, String> {
    Err("built without the `browser` feature; rebuild with --features browser or use --dry-run".into())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regional_dashboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };
    let Some(path) = options.scenario.clone() else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    let mut scenario = match Scenario::load(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(base_url) = &options.base_url {
        scenario.base_url = base_url.trim_end_matches('/').to_string();
    }

    let viewport = Viewport::for_screen(options.screen.as_deref());
    tracing::info!("Viewport {}x{}", viewport.width, viewport.height);

    let ok = if options.dry_run {
        scenario.config.action_delay = 0.0;
        scenario.config.slow_motion = 0;
        let recorder = Arc::new(RecordingDriver::new());
        let runner = DemoRunner::new(recorder.clone(), scenario).with_settle_delay(Duration::ZERO);
        let ok = runner.run().await;
        for call in recorder.calls() {
            println!("{:?}", call);
        }
        ok
    } else {
        let driver = match browser_driver(&options, viewport).await {
            Ok(driver) => driver,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        let ok = DemoRunner::new(driver.clone(), scenario).run().await;
        if let Err(e) = driver.close().await {
            tracing::warn!("Failed to close browser: {}", e);
        }
        ok
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
