//! Dashboard chart endpoints
//!
//! - POST /api/dashboard - build a dashboard from an analysis result
//! - GET /api/report/{report_id}/visualizations - dashboard for a stored report

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::charts::{generate_dashboard, AnalysisResult, Dashboard};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", post(build_dashboard))
        .route("/report/{report_id}/visualizations", get(report_visualizations))
}

/// POST /api/dashboard
async fn build_dashboard(Json(analysis): Json<AnalysisResult>) -> Json<Dashboard> {
    Json(generate_dashboard(&analysis))
}

/// GET /api/report/{report_id}/visualizations
async fn report_visualizations(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<Dashboard>, ApiError> {
    let document = state.report_service.load_report_document(&report_id).await?;
    let analysis = match document.get("analysis") {
        Some(raw) if !raw.is_null() => match serde_json::from_value::<AnalysisResult>(raw.clone()) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Ignoring malformed analysis in report {}: {}", report_id, e);
                AnalysisResult::default()
            }
        },
        _ => AnalysisResult::default(),
    };
    Ok(Json(generate_dashboard(&analysis)))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{body_json, build_test_state, get, post_json};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_dashboard_from_posted_analysis() {
        let (state, _dir) = build_test_state().await;
        let app = crate::api::build_router(state, "http://localhost");

        let analysis = json!({
            "ai_opportunities": {
                "智能制造": {"potential_score": 82.0, "recommendation": "优先布局"},
                "智慧物流": {"potential_score": 35.0}
            },
            "statistics": {"total_words": 1200, "reading_time_minutes": 4}
        });
        let response = app.oneshot(post_json("/api/dashboard", analysis)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["summary"]["high_priority_ai"], 1);
        assert_eq!(body["ai_opportunities"]["智能制造"]["priority_level"], "high");
        assert_eq!(body["ai_opportunities"]["智慧物流"]["priority_level"], "low");
        assert_eq!(body["charts"]["ai_opportunities"]["data"][0]["type"], "scatterpolar");
    }

    #[tokio::test]
    async fn test_report_visualizations() {
        let (state, _dir) = build_test_state().await;
        let reports = state.report_service.clone();
        let with_analysis = reports.create_llm_report("苏州", "生物医药", None).await.unwrap();
        reports
            .write_llm_artifact(
                &with_analysis.report_id,
                &json!({"full_content": "", "analysis": {"ai_opportunities": {"药物研发": {"potential_score": 55.0}}}}),
            )
            .await
            .unwrap();
        let plain = reports.create_llm_report("苏州", "纺织", None).await.unwrap();
        reports
            .write_llm_artifact(&plain.report_id, &json!({"full_content": "纺织"}))
            .await
            .unwrap();
        let app = crate::api::build_router(state, "http://localhost");

        let uri = format!("/api/report/{}/visualizations", with_analysis.report_id);
        let body = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(body["ai_opportunities"]["药物研发"]["priority_level"], "medium");

        let uri = format!("/api/report/{}/visualizations", plain.report_id);
        let body = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(body["summary"]["ai_opportunities"], 0);
        assert_eq!(body["charts"]["ai_opportunities"]["data"][0]["r"], json!([]));

        let response = app.oneshot(get("/api/report/unknown/visualizations")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
