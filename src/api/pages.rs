//! Server-rendered pages
//!
//! - GET /streaming-generate-report - live report generation page
//! - GET /report/{report_id} - rendered report artifact

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::Value;
use tera::Context as TeraContext;

use crate::api::middleware::AppState;
use crate::api::static_files::render_template_page;
use crate::services::ReportServiceError;
use crate::templates::{markdown_to_html, StandardVars};

#[derive(Debug, Deserialize)]
pub struct StreamingPageQuery {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default = "default_llm_service")]
    pub llm_service: String,
    #[serde(default)]
    pub additional_context: String,
}

fn default_llm_service() -> String {
    "kimi".to_string()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/streaming-generate-report", get(streaming_page))
        .route("/report/{report_id}", get(report_page))
}

async fn streaming_page(
    State(state): State<AppState>,
    Query(query): Query<StreamingPageQuery>,
) -> Response {
    if query.city.trim().is_empty() || query.industry.trim().is_empty() {
        return render_template_page(&state, "index.html", "/streaming-generate-report");
    }

    let mut context = TeraContext::new();
    context.insert("city", query.city.trim());
    context.insert("industry", query.industry.trim());
    context.insert("llm_service", &query.llm_service);
    context.insert("additional_context", &query.additional_context);

    Html(state.templates.render_with_fallback(
        "streaming.html",
        &context,
        &StandardVars::new("/streaming-generate-report"),
    ))
    .into_response()
}

fn text(document: &Value, key: &str) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn report_page(State(state): State<AppState>, Path(report_id): Path<String>) -> Response {
    let request_path = format!("/report/{}", report_id);
    let vars = StandardVars::new(&request_path);

    let report = match state.report_service.get(&report_id).await {
        Ok(report) => report,
        Err(e) => return error_page(&state, &vars, &e),
    };
    let document = match state.report_service.load_report_document(&report_id).await {
        Ok(document) => document,
        Err(e) => return error_page(&state, &vars, &e),
    };

    let mut context = TeraContext::new();
    context.insert("title", &report.title);
    context.insert("city", &report.city);
    context.insert("industry", &report.industry);
    context.insert("service", &text(&document, "service"));
    context.insert("generated_at", &text(&document, "generated_at"));
    context.insert("summary_zh", &text(&document, "summary_zh"));
    context.insert("summary_en", &text(&document, "summary_en"));
    if let Some(swot) = document.get("swot").filter(|s| s.is_object()) {
        context.insert("swot", swot);
    }
    context.insert("content_html", &markdown_to_html(&text(&document, "full_content")));

    Html(state.templates.render_with_fallback("report.html", &context, &vars)).into_response()
}

fn error_page(state: &AppState, vars: &StandardVars, err: &ReportServiceError) -> Response {
    let status = match err {
        ReportServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ReportServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut context = TeraContext::new();
    context.insert("error_message", &err.to_string());
    (
        status,
        Html(state.templates.render_with_fallback("error.html", &context, vars)),
    )
        .into_response()
}
