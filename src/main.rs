//! Regional industrial dashboard server

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regional_dashboard::{
    api::{self, AppState},
    cache::create_cache,
    config::{Config, SiteConfigStore},
    db::{
        self,
        repositories::{SqlxReportRepository, SqlxWechatArticleRepository},
    },
    services::{ReportService, WechatService},
    templates::TemplateEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regional_dashboard=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting regional dashboard...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!(
        "Database connected: {:?} {}",
        config.database.driver,
        db::redact_url(&config.database.url)
    );

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    // Initialize cache
    let cache = create_cache(&config.cache);
    tracing::info!("Cache initialized");

    let site_config = Arc::new(SiteConfigStore::from_paths(&config.paths));
    let available = site_config.available_llm_services();
    if available.is_empty() {
        tracing::warn!(
            "No LLM API keys configured in {}; report generation is unavailable",
            site_config.path().display()
        );
    } else {
        let names: Vec<&str> = available.iter().map(|s| s.as_str()).collect();
        tracing::info!("LLM services available: {}", names.join(", "));
    }

    // Services
    let report_service = Arc::new(ReportService::new(
        SqlxReportRepository::boxed(pool.clone()),
        &config.paths,
    ));
    let wechat_service = Arc::new(WechatService::new(SqlxWechatArticleRepository::boxed(pool.clone())));

    // Templates, with overrides from the configured directory
    let templates = Arc::new(TemplateEngine::new(&config.paths.templates_dir)?);
    tracing::info!("Template engine initialized");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cors_origin = config.server.cors_origin.clone();

    let state = AppState::new(
        Arc::new(config),
        site_config,
        report_service,
        wechat_service,
        cache,
        templates,
    );

    // Build router
    let app = api::build_router(state, &cors_origin);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}
