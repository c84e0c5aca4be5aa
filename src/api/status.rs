//! Health and provider status endpoints
//!
//! - GET  /api/api-status - LLM error summary and the last few failures
//! - POST /api/api-status/clear - forget recorded failures
//! - GET  /healthz - liveness with request and cache statistics

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::middleware::AppState;

const RECENT_ERRORS: usize = 5;

#[derive(Debug, Serialize)]
pub struct RecentError {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub service: &'static str,
    pub message: String,
    pub timestamp: String,
    pub retry_after: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ApiStatusResponse {
    pub success: bool,
    pub error_summary: Value,
    pub recent_errors: Vec<RecentError>,
    pub has_recent_issues: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_response_time_us: f64,
    pub cache_entries: u64,
}

/// Routes nested under `/api`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api-status", get(api_status))
        .route("/api-status/clear", post(clear_api_status))
}

/// Routes at the server root
pub fn root_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// GET /api/api-status
async fn api_status(State(state): State<AppState>) -> Json<ApiStatusResponse> {
    let history = &state.error_history;
    let recent_errors = history
        .recent(RECENT_ERRORS)
        .into_iter()
        .map(|e| RecentError {
            error_type: e.error_type.as_str(),
            service: e.service.as_str(),
            message: e.user_message,
            timestamp: e.timestamp.to_rfc3339(),
            retry_after: e.retry_after,
        })
        .collect();

    Json(ApiStatusResponse {
        success: true,
        error_summary: history.summary(),
        recent_errors,
        has_recent_issues: !history.is_empty(),
    })
}

/// POST /api/api-status/clear
async fn clear_api_status(State(state): State<AppState>) -> Json<Value> {
    state.error_history.clear();
    tracing::info!("API error history cleared");
    Json(json!({
        "success": true,
        "message": "API error history cleared",
    }))
}

/// GET /healthz
async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = &state.request_stats;
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: stats.uptime_seconds(),
        total_requests: stats.total_requests(),
        avg_response_time_us: stats.avg_response_time_us(),
        cache_entries: state.cache.entry_count(),
    })
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{body_json, build_test_state, get, post_json};
    use crate::llm::LlmService;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_api_status_lifecycle() {
        let (state, _dir) = build_test_state().await;
        let history = state.error_history.clone();
        let app = crate::api::build_router(state, "http://localhost");

        let body = body_json(app.clone().oneshot(get("/api/api-status")).await.unwrap()).await;
        assert_eq!(body["has_recent_issues"], false);
        assert_eq!(body["error_summary"]["status"], "ok");

        for _ in 0..7 {
            history.record("429 Too Many Requests, retry after 30 seconds", LlmService::Kimi);
        }
        history.record("403 API key not valid. Please pass a valid API key.", LlmService::Gemini);

        let body = body_json(app.clone().oneshot(get("/api/api-status")).await.unwrap()).await;
        assert_eq!(body["has_recent_issues"], true);
        assert_eq!(body["error_summary"]["total_errors"], 8);
        let recent = body["recent_errors"].as_array().unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[4]["service"], "gemini");
        assert_eq!(recent[4]["type"], "authentication_error");

        let body = body_json(
            app.clone()
                .oneshot(post_json("/api/api-status/clear", json!({})))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["message"], "API error history cleared");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_healthz_counts_requests() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        app.clone().oneshot(get("/api/reports")).await.unwrap();
        let body = body_json(app.oneshot(get("/healthz")).await.unwrap()).await;
        assert_eq!(body["status"], "ok");
        assert!(body["total_requests"].as_u64().unwrap() >= 1);
    }
}
