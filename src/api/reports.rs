//! Report endpoints
//!
//! - GET /api/reports - all reports, newest first
//! - GET /api/report/{report_id} - the report's JSON artifact
//! - GET /api/report/{report_id}/source?query= - sentences mentioning `query`
//! - GET /api/reports/{report_id}/download-json - the artifact as an attachment

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::middleware::{ApiError, AppState};
use crate::models::ReportSummary;

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ReportListResponse {
    pub success: bool,
    pub reports: Vec<ReportSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub success: bool,
    pub query: String,
    pub sources: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(list_reports))
        .route("/report/{report_id}", get(get_report_document))
        .route("/report/{report_id}/source", get(find_source))
        .route("/reports/{report_id}/download-json", get(download_json))
}

/// GET /api/reports
async fn list_reports(State(state): State<AppState>) -> Result<Json<ReportListResponse>, ApiError> {
    let reports = state.report_service.list().await?;
    Ok(Json(ReportListResponse {
        success: true,
        count: reports.len(),
        reports,
    }))
}

/// GET /api/report/{report_id}
async fn get_report_document(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.report_service.load_report_document(&report_id).await?))
}

/// GET /api/report/{report_id}/source
async fn find_source(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<SourceResponse>, ApiError> {
    let sources = state.report_service.find_source(&report_id, &query.query).await?;
    Ok(Json(SourceResponse {
        success: true,
        query: query.query,
        sources,
    }))
}

/// GET /api/reports/{report_id}/download-json
async fn download_json(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
) -> Result<Response, ApiError> {
    let (filename, bytes) = state.report_service.report_json(&report_id).await?;
    let disposition = format!(
        "attachment; filename=\"report.json\"; filename*=UTF-8''{}",
        urlencoding::encode(&filename)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
