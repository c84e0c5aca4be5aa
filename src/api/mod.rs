//! API layer - HTTP handlers and routing
//!
//! Routes are grouped by concern:
//! - Site config and tracked WeChat accounts (`config`)
//! - Report listing, artifacts and source lookup (`reports`)
//! - WeChat article search and analysis (`wechat`)
//! - POI search (`poi`)
//! - Document and POI file uploads (`upload`)
//! - Dashboard charts (`charts`)
//! - Provider status and health (`status`)
//! - SSE report generation under `/streaming/api/stream` (`streaming`)
//! - Server-rendered pages and the SPA fallback (`pages`, `static_files`)

pub mod charts;
pub mod config;
pub mod middleware;
pub mod pages;
pub mod poi;
pub mod reports;
pub mod static_files;
pub mod status;
pub mod streaming;
pub mod upload;
pub mod wechat;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, Failure, GeneratorFactory, RequestStats};

/// Build the router mounted under `/api`
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .merge(config::router())
        .merge(reports::router())
        .merge(charts::router())
        .merge(wechat::router())
        .merge(poi::router())
        .merge(upload::router())
        .merge(status::router())
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) if cors_origin != "*" => AllowOrigin::exact(origin),
        Ok(_) => AllowOrigin::any(),
        Err(e) => {
            tracing::warn!("Invalid CORS origin {:?} ({}), allowing any origin", cors_origin, e);
            AllowOrigin::any()
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL])
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let assets_dir = state.config.paths.frontend_dist.join("assets");

    Router::new()
        .nest("/api", build_api_router())
        .nest("/streaming/api/stream", streaming::router())
        .merge(pages::router())
        .merge(status::root_router())
        // Built SPA assets; everything else unmatched goes to the SPA fallback
        .nest_service("/assets", ServeDir::new(assets_dir))
        .fallback(static_files::serve_spa)
        .layer(cors_layer(cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router-level test fixtures

    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
    };
    use serde_json::Value;
    use tempfile::TempDir;

    use super::AppState;
    use crate::cache::create_cache;
    use crate::config::{CacheConfig, Config, SiteConfigStore};
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::db::repositories::{SqlxReportRepository, SqlxWechatArticleRepository};
    use crate::services::{ReportService, WechatService};
    use crate::templates::TemplateEngine;

    /// State over an in-memory database with every path inside a temp dir
    pub async fn build_test_state() -> (AppState, TempDir) {
        build_test_state_with(|_| {}).await
    }

    /// Like `build_test_state`, with a hook to adjust the config first
    pub async fn build_test_state_with(adjust: impl FnOnce(&mut Config)) -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.paths.site_config = dir.path().join("config.json");
        config.paths.data_dir = dir.path().join("data");
        config.paths.frontend_dist = dir.path().join("dist");
        config.paths.templates_dir = dir.path().join("no-templates");
        config.paths.prompt_template = dir.path().join("prompt.md");
        adjust(&mut config);

        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let site_config = Arc::new(SiteConfigStore::new(config.paths.site_config.clone()));
        let report_service = Arc::new(ReportService::new(
            SqlxReportRepository::boxed(pool.clone()),
            &config.paths,
        ));
        let wechat_service = Arc::new(WechatService::new(SqlxWechatArticleRepository::boxed(pool)));
        let cache = create_cache(&CacheConfig::default());
        let templates = Arc::new(TemplateEngine::new(&config.paths.templates_dir).unwrap());

        let state = AppState::new(
            Arc::new(config),
            site_config,
            report_service,
            wechat_service,
            cache,
            templates,
        );
        (state, dir)
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// multipart/form-data request with one `file` field
    pub fn multipart_file(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let boundary = "dashboard-test-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            f = filename
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }
}
