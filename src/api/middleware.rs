//! Shared HTTP state, error responses and request accounting

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::MemoryCache;
use crate::config::{Config, SiteConfigError, SiteConfigStore};
use crate::llm::{ErrorHistory, LlmService, ReportGenerator};
use crate::services::{ReportService, ReportServiceError, WechatService, WechatServiceError};
use crate::templates::TemplateEngine;

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Sum of response times in microseconds
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Builds the report generator for a requested service
pub type GeneratorFactory = Arc<dyn Fn(LlmService) -> ReportGenerator + Send + Sync>;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub site_config: Arc<SiteConfigStore>,
    pub report_service: Arc<ReportService>,
    pub wechat_service: Arc<WechatService>,
    pub error_history: Arc<ErrorHistory>,
    pub cache: Arc<MemoryCache>,
    pub templates: Arc<TemplateEngine>,
    pub generators: GeneratorFactory,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire the state together; report generators resolve provider keys
    /// from the site config on every request so key edits apply at once.
    pub fn new(
        config: Arc<Config>,
        site_config: Arc<SiteConfigStore>,
        report_service: Arc<ReportService>,
        wechat_service: Arc<WechatService>,
        cache: Arc<MemoryCache>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        let error_history = Arc::new(ErrorHistory::new());

        let generators: GeneratorFactory = {
            let config = config.clone();
            let site_config = site_config.clone();
            let history = error_history.clone();
            Arc::new(move |service| {
                ReportGenerator::from_config(
                    service,
                    &config.llm,
                    &config.paths,
                    &site_config,
                    history.clone(),
                )
            })
        };

        Self {
            config,
            site_config,
            report_service,
            wechat_service,
            error_history,
            cache,
            templates,
            generators,
            request_stats: Arc::new(RequestStats::new()),
        }
    }

    pub fn with_generators(mut self, generators: GeneratorFactory) -> Self {
        self.generators = generators;
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for internal API routes
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ReportServiceError> for ApiError {
    fn from(err: ReportServiceError) -> Self {
        match err {
            ReportServiceError::NotFound(id) => ApiError::not_found(format!("Report not found: {}", id)),
            ReportServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ ReportServiceError::InvalidTransition { .. } => ApiError::conflict(e.to_string()),
            ReportServiceError::InternalError(e) => {
                tracing::error!("Report service error: {:#}", e);
                ApiError::internal_error(e.to_string())
            }
        }
    }
}

impl From<SiteConfigError> for ApiError {
    fn from(err: SiteConfigError) -> Self {
        tracing::error!("Site config error: {}", err);
        ApiError::internal_error(err.to_string())
    }
}

/// `{success: false, error}` body the dashboard front end expects from its
/// data routes
#[derive(Debug)]
pub struct Failure {
    pub status: StatusCode,
    pub message: String,
}

impl Failure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<WechatServiceError> for Failure {
    fn from(err: WechatServiceError) -> Self {
        match err {
            WechatServiceError::ValidationError(msg) => Failure::bad_request(msg),
            WechatServiceError::InternalError(e) => {
                tracing::error!("WeChat service error: {:#}", e);
                Failure::internal(e.to_string())
            }
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::service_unavailable("x").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::new("WHATEVER", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "city"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
        let json = serde_json::to_value(ApiError::not_found("gone")).unwrap();
        assert!(json["error"].get("details").is_none());
    }

    #[test]
    fn test_report_errors_map_to_codes() {
        let err: ApiError = ReportServiceError::NotFound("r1".into()).into();
        assert_eq!(err.error.code, "NOT_FOUND");
        let err: ApiError = ReportServiceError::ValidationError("bad".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }
}
