//! Google Gemini client over `streamGenerateContent`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use super::sse::text_deltas;
use super::{LlmClient, LlmError, LlmService, MinInterval, TextStream};
use crate::config::LlmConfig;

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    limiter: MinInterval,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: String, config: &LlmConfig) -> Self {
        Self {
            http,
            api_key,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            limiter: MinInterval::new(Duration::from_millis(config.min_interval_ms)),
        }
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 8000,
                "topP": 0.8,
                "topK": 40,
            },
        })
    }
}

/// Concatenated `candidates[0].content.parts[*].text`
fn candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn service(&self) -> LlmService {
        LlmService::Gemini
    }

    async fn stream_completion(&self, prompt: &str) -> Result<TextStream, LlmError> {
        self.limiter.wait().await;

        let url = format!(
            "{}/models/{}:streamGenerateContent",
            self.base_url, self.model
        );
        let response = self
            .http
            .post(url)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&Self::request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::from_response(response).await);
        }

        tracing::info!("Gemini stream opened (model {})", self.model);
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(text_deltas(bytes, candidate_text))
    }
}
