//! LLM provider integration
//!
//! - `LlmService` names the supported providers
//! - `LlmClient` opens a streamed completion and yields text deltas
//! - `errors` classifies provider failures into user-facing messages
//! - `report` drives the multi-stage industry report generation

pub mod doubao;
pub mod errors;
pub mod gemini;
pub mod kimi;
pub mod report;
pub mod sse;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{LlmConfig, SiteConfigStore};

pub use doubao::DoubaoClient;
pub use errors::{ApiErrorType, ClassifiedError, ErrorHistory};
pub use gemini::GeminiClient;
pub use kimi::KimiClient;
pub use report::{GenerationChunk, ReportGenerator};

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmService {
    Kimi,
    Gemini,
    Doubao,
}

impl LlmService {
    /// Fallback order
    pub const ALL: [LlmService; 3] = [LlmService::Kimi, LlmService::Gemini, LlmService::Doubao];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmService::Kimi => "kimi",
            LlmService::Gemini => "gemini",
            LlmService::Doubao => "doubao",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kimi" => Some(LlmService::Kimi),
            "gemini" => Some(LlmService::Gemini),
            "doubao" => Some(LlmService::Doubao),
            _ => None,
        }
    }

    /// Parse a request value; unknown names fall back to Kimi
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or(LlmService::Kimi)
    }

    /// Name used in user-facing messages ("Kimi", "Gemini", "Doubao")
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmService::Kimi => "Kimi",
            LlmService::Gemini => "Gemini",
            LlmService::Doubao => "Doubao",
        }
    }
}

impl fmt::Display for LlmService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider failure.
///
/// The display text is what `errors::classify` matches against, so variants
/// render with the vocabulary providers use for the same condition.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("connection timeout: {0}")]
    Timeout(String),

    #[error("connection refused: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0} api key is not configured")]
    MissingKey(LlmService),

    #[error("没有可用的回退服务")]
    NoFallback,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_connect() {
            LlmError::Connect(err.to_string())
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

impl LlmError {
    /// Build a status error from a non-success response, pulling the
    /// provider's own message out of a JSON error body when there is one.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => json
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .or_else(|| json.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .unwrap_or(text),
            Err(_) => text,
        };
        LlmError::Status { status, body }
    }
}

/// Text deltas of one streamed completion
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// A provider that can stream a completion for a single prompt
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn service(&self) -> LlmService;

    /// Open the completion stream. Failures to connect or a non-success
    /// status are returned here; mid-stream failures arrive as stream items.
    async fn stream_completion(&self, prompt: &str) -> Result<TextStream, LlmError>;
}

/// Enforces a minimum spacing between consecutive calls
#[derive(Debug)]
pub struct MinInterval {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl MinInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Sleep until the interval since the previous call has elapsed
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Shared HTTP client for provider calls
pub fn http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(LlmError::from)
}

/// Build the client for `service` using the key resolved from the site config
pub fn create_client(
    service: LlmService,
    config: &LlmConfig,
    store: &SiteConfigStore,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    let key = store
        .resolve_llm_key(service)
        .ok_or(LlmError::MissingKey(service))?;
    let http = http_client(config)?;

    let client: Arc<dyn LlmClient> = match service {
        LlmService::Kimi => Arc::new(KimiClient::new(http, key, config)),
        LlmService::Gemini => Arc::new(GeminiClient::new(http, key, config)),
        LlmService::Doubao => Arc::new(DoubaoClient::new()),
    };
    Ok(client)
}
