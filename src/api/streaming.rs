//! Streaming report generation
//!
//! - POST /streaming/api/stream/generate-report - SSE report stream
//! - GET  /streaming/api/stream/test - five test events
//! - GET  /streaming/api/stream/health - streaming health check
//!
//! Every event has an `event:` line naming its type and a `data:` line with
//! `{type, data, timestamp}`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::channel::mpsc;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::middleware::AppState;
use crate::llm::report::ReportAccumulator;
use crate::llm::{GenerationChunk, LlmService, ReportGenerator};

const TEST_EVENT_COUNT: u64 = 5;
const TEST_EVENT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
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
        .route("/generate-report", post(generate_report))
        .route("/test", get(stream_test))
        .route("/health", get(health))
}

/// Seconds since the epoch with millisecond precision
fn timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn sse_event(kind: &str, data: Value) -> Event {
    let payload = json!({
        "type": kind,
        "data": data,
        "timestamp": timestamp(),
    });
    Event::default().event(kind).data(payload.to_string())
}

fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}

/// POST /streaming/api/stream/generate-report
async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<GenerateReportRequest>,
) -> Response {
    let city = request.city.trim().to_string();
    let industry = request.industry.trim().to_string();
    if city.is_empty() || industry.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "City and industry are required" })),
        )
            .into_response();
    }

    let service = LlmService::parse_or_default(&request.llm_service);
    let generator = Arc::new((state.generators)(service));
    let (tx, rx) = mpsc::unbounded();

    tokio::spawn(run_report_stream(
        state,
        generator,
        ReportRequest {
            city,
            industry,
            additional_context: request.additional_context,
        },
        EventSink { tx },
    ));

    sse_response(rx.map(Ok::<_, Infallible>))
}

struct ReportRequest {
    city: String,
    industry: String,
    additional_context: String,
}

/// The client went away
struct Closed;

struct EventSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    fn send(&self, kind: &str, data: Value) -> Result<(), Closed> {
        self.tx.unbounded_send(sse_event(kind, data)).map_err(|_| Closed)
    }
}

async fn run_report_stream(
    state: AppState,
    generator: Arc<ReportGenerator>,
    request: ReportRequest,
    sink: EventSink,
) {
    let service = generator.service();
    let ReportRequest {
        city,
        industry,
        additional_context,
    } = request;

    if stream_report(&state, generator, &city, &industry, additional_context, &sink)
        .await
        .is_err()
    {
        tracing::info!("Client disconnected from {} stream for {} - {}", service, city, industry);
    }
}

async fn stream_report(
    state: &AppState,
    generator: Arc<ReportGenerator>,
    city: &str,
    industry: &str,
    additional_context: String,
    sink: &EventSink,
) -> Result<(), Closed> {
    let service = generator.service();
    sink.send(
        "generation_start",
        json!({
            "message": "开始生成报告...",
            "city": city,
            "industry": industry,
            "service": service,
        }),
    )?;

    if !generator.is_available(service) {
        tracing::warn!("{} key missing; cannot start report stream", service);
        return sink.send(
            "error",
            json!({
                "error": format!("{} 密钥未配置或无效，无法初始化客户端", service.display_name()),
                "type": "authentication_error",
                "service": service,
            }),
        );
    }

    let reports = &state.report_service;
    let report = match reports.create_llm_report(city, industry, None).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Failed to create report row: {}", e);
            return sink.send(
                "error",
                json!({ "error": e.to_string(), "type": "internal_error", "service": service }),
            );
        }
    };
    let report_id = report.report_id;
    if let Err(e) = reports.mark_processing(&report_id).await {
        tracing::warn!("Failed to mark {} processing: {}", report_id, e);
    }

    let mut accumulator = ReportAccumulator::default();
    let mut chunks = generator.generate(city.to_string(), industry.to_string(), additional_context);
    let mut main_written = false;

    while let Some(chunk) = chunks.next().await {
        accumulator.observe(&chunk);

        if let GenerationChunk::Error { error, api_error } = &chunk {
            if let Err(e) = reports.mark_failed(&report_id).await {
                tracing::warn!("Failed to mark {} failed: {}", report_id, e);
            }
            let field = |name: &str| api_error.get(name).cloned().unwrap_or(Value::Null);
            return sink.send(
                "error",
                json!({
                    "error": field("user_message"),
                    "type": "api_error",
                    "raw": error,
                    "suggested_action": field("suggested_action"),
                    "retry_after": field("retry_after"),
                    "service": field("service"),
                    "error_type": field("type"),
                }),
            );
        }

        let payload = serde_json::to_value(&chunk).unwrap_or(Value::Null);
        if let Err(closed) = sink.send("report_chunk", payload) {
            if !main_written {
                if let Err(e) = reports.mark_failed(&report_id).await {
                    tracing::warn!("Failed to mark {} failed: {}", report_id, e);
                }
            }
            return Err(closed);
        }

        if matches!(chunk, GenerationChunk::Complete { .. }) {
            main_written = save_artifact(state, &accumulator, &report_id, city, industry, true).await;
        }
    }

    if !main_written {
        // Generator task ended without a main report
        if let Err(e) = reports.mark_failed(&report_id).await {
            tracing::warn!("Failed to mark {} failed: {}", report_id, e);
        }
        return sink.send(
            "error",
            json!({ "error": "报告生成未完成", "type": "api_error", "service": service }),
        );
    }

    // Rewrite with the summaries and SWOT that followed the main report
    save_artifact(state, &accumulator, &report_id, city, industry, false).await;

    sink.send(
        "report_complete",
        json!({
            "message": "报告生成完成",
            "city": city,
            "industry": industry,
            "service": accumulator.service.unwrap_or(service),
            "report_id": report_id,
        }),
    )
}

/// Write the artifact; `complete` also moves the row to Completed
async fn save_artifact(
    state: &AppState,
    accumulator: &ReportAccumulator,
    report_id: &str,
    city: &str,
    industry: &str,
    complete: bool,
) -> bool {
    let Some(document) = accumulator.clone().into_document(report_id, city, industry) else {
        return false;
    };
    let reports = &state.report_service;
    let path = match reports.write_llm_artifact(report_id, &document).await {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to write artifact for {}: {}", report_id, e);
            return false;
        }
    };
    if complete {
        if let Err(e) = reports.mark_completed(report_id, &path).await {
            tracing::error!("Failed to mark {} completed: {}", report_id, e);
            return false;
        }
    }
    true
}

/// GET /streaming/api/stream/test
async fn stream_test() -> Response {
    let events = stream::iter(1..=TEST_EVENT_COUNT).then(|i| async move {
        if i > 1 {
            tokio::time::sleep(TEST_EVENT_INTERVAL).await;
        }
        Ok::<_, Infallible>(sse_event(
            "test",
            json!({ "message": format!("Test message {}", i), "timestamp": timestamp() }),
        ))
    });
    sse_response(events)
}

/// GET /streaming/api/stream/health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "streaming_enabled": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
