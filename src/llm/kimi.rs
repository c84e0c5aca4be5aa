//! Kimi (Moonshot) client over the OpenAI-compatible chat completions API

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use super::sse::text_deltas;
use super::{LlmClient, LlmError, LlmService, MinInterval, TextStream};
use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "你是一位专业的产业分析师，擅长撰写深度的区域产业分析报告。请基于用户提供的框架和要求，生成详实、专业的分析报告，文字长度在5000字以上。";

const OPEN_ATTEMPTS: u32 = 2;

pub struct KimiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    limiter: MinInterval,
}

impl KimiClient {
    pub fn new(http: reqwest::Client, api_key: String, config: &LlmConfig) -> Self {
        Self {
            http,
            api_key,
            base_url: config.kimi_base_url.trim_end_matches('/').to_string(),
            model: config.kimi_model.clone(),
            temperature: config.kimi_temperature,
            max_tokens: config.kimi_max_tokens,
            limiter: MinInterval::new(Duration::from_millis(config.min_interval_ms)),
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
            "stream_options": {"include_usage": true},
        })
    }

    async fn open(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::from_response(response).await);
        }
        Ok(response)
    }
}

/// `choices[0].delta.content`; usage-only frames carry no choices
fn delta_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl LlmClient for KimiClient {
    fn service(&self) -> LlmService {
        LlmService::Kimi
    }

    async fn stream_completion(&self, prompt: &str) -> Result<TextStream, LlmError> {
        self.limiter.wait().await;
        let body = self.request_body(prompt);

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.open(&body).await {
                Ok(response) => break response,
                Err(e) if attempt < OPEN_ATTEMPTS => {
                    tracing::warn!("Kimi stream open failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!("Kimi stream opened (model {})", self.model);
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(text_deltas(bytes, delta_content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> KimiClient {
        let config = LlmConfig {
            kimi_base_url: server.uri(),
            min_interval_ms: 0,
            ..LlmConfig::default()
        };
        KimiClient::new(reqwest::Client::new(), "test-key".to_string(), &config)
    }

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for d in deltas {
            let frame = json!({"choices": [{"index": 0, "delta": {"content": d}}]});
            body.push_str(&format!("data: {}\n\n", frame));
        }
        body.push_str("data: {\"choices\": [], \"usage\": {\"total_tokens\": 10}}\n\n");
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[test]
    fn test_request_body_shape() {
        let config = LlmConfig::default();
        let client = KimiClient::new(reqwest::Client::new(), "k".to_string(), &config);
        let body = client.request_body("写报告");
        assert_eq!(body["model"], "moonshot-v1-128k");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 8000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "写报告");
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[tokio::test]
    async fn test_streams_deltas_until_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body(&["上海", "人工智能", "产业"]), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let stream = client.stream_completion("prompt").await.unwrap();
        let deltas: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(deltas, vec!["上海", "人工智能", "产业"]);
    }

    #[tokio::test]
    async fn test_error_status_is_retried_then_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Your account quota exceeded", "type": "exceeded_current_quota_error"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.stream_completion("prompt").await.err().unwrap();
        match &err {
            LlmError::Status { status, body } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(body, "Your account quota exceeded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            crate::llm::errors::detect_type(&err.to_string(), LlmService::Kimi),
            crate::llm::ApiErrorType::QuotaExceeded
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = LlmConfig {
            kimi_base_url: "http://127.0.0.1:9".to_string(),
            min_interval_ms: 0,
            ..LlmConfig::default()
        };
        let client = KimiClient::new(reqwest::Client::new(), "k".to_string(), &config);
        let err = client.stream_completion("prompt").await.err().unwrap();
        assert!(matches!(err, LlmError::Connect(_) | LlmError::Request(_)));
    }
}
