//! Site configuration endpoints
//!
//! - GET  /api/config - stored site config (defaults when missing)
//! - POST /api/config - merge an update into the stored config
//! - GET  /api/wechat-config - tracked official accounts
//! - POST /api/wechat-config - replace the tracked account list

use std::path::PathBuf;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};
use crate::config::site::default_site_config;

const WECHAT_ACCOUNTS_FILE: &str = "wechat_accounts_config.json";

#[derive(Debug, Deserialize)]
pub struct ConfigQuery {
    /// Mask API keys in the response
    #[serde(default)]
    pub redact: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config).post(save_config))
        .route("/wechat-config", get(get_wechat_config).post(save_wechat_config))
}

/// GET /api/config
async fn get_config(
    State(state): State<AppState>,
    Query(query): Query<ConfigQuery>,
) -> Json<Value> {
    let store = &state.site_config;
    let loaded = if query.redact {
        store.redacted()
    } else {
        store.load()
    };
    match loaded {
        Ok(config) => Json(Value::Object(config)),
        Err(e) => {
            tracing::warn!("Serving default site config: {}", e);
            Json(Value::Object(default_site_config()))
        }
    }
}

/// POST /api/config
async fn save_config(
    State(state): State<AppState>,
    Json(update): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let Value::Object(update) = update else {
        return Err(ApiError::validation_error("Config update must be a JSON object"));
    };
    let result = state.site_config.save_merged(&update)?;
    Ok(Json(result))
}

fn wechat_accounts_path(state: &AppState) -> PathBuf {
    state.config.paths.data_dir.join(WECHAT_ACCOUNTS_FILE)
}

/// GET /api/wechat-config
async fn get_wechat_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = wechat_accounts_path(&state);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Json(json!([]))),
        Err(e) => return Err(ApiError::internal_error(format!("Failed to read {}: {}", path.display(), e))),
    };
    serde_json::from_str(&content)
        .map(Json)
        .map_err(|e| ApiError::internal_error(format!("Invalid {}: {}", path.display(), e)))
}

/// POST /api/wechat-config
async fn save_wechat_config(
    State(state): State<AppState>,
    Json(accounts): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let path = wechat_accounts_path(&state);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
    }
    let content = serde_json::to_string_pretty(&accounts)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to write {}: {}", path.display(), e)))?;
    tracing::info!("WeChat account config saved to {}", path.display());
    Ok(Json(json!({ "status": "success" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, build_test_state, get, post_json};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_get_defaults_then_merge() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let body = body_json(app.clone().oneshot(get("/api/config")).await.unwrap()).await;
        assert_eq!(body["categories"][0], "产业概述");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/config",
                json!({"api_keys": {"kimi": "sk-kimi-123", "baidu_map": "ak"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"success": true, "version": "1.1"}));

        app.clone()
            .oneshot(post_json("/api/config", json!({"api_keys": {"baidu_map": "ak-2"}})))
            .await
            .unwrap();
        let body = body_json(app.clone().oneshot(get("/api/config")).await.unwrap()).await;
        assert_eq!(body["api_keys"]["kimi"], "sk-kimi-123");
        assert_eq!(body["api_keys"]["baidu_map"], "ak-2");

        let body = body_json(app.clone().oneshot(get("/api/config?redact=true")).await.unwrap()).await;
        assert_eq!(body["api_keys"]["kimi"], "sk-k****");

        let response = app.oneshot(post_json("/api/config", json!([1, 2]))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wechat_config_round_trip() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let body = body_json(app.clone().oneshot(get("/api/wechat-config")).await.unwrap()).await;
        assert_eq!(body, json!([]));

        let accounts = json!([{"name": "上海发布", "enabled": true}]);
        let body = body_json(
            app.clone()
                .oneshot(post_json("/api/wechat-config", accounts.clone()))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["status"], "success");

        let body = body_json(app.oneshot(get("/api/wechat-config")).await.unwrap()).await;
        assert_eq!(body, accounts);
    }
}
