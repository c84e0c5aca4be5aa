//! Doubao placeholder client
//!
//! The Doubao streaming API is not wired up yet. The client emits a fixed
//! notice one character at a time so the rest of the pipeline can be
//! exercised end to end.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{LlmClient, LlmError, LlmService, TextStream};

pub const PLACEHOLDER_TEXT: &str = "【豆包大模型流式内容占位符】\n\n这是一个模拟的流式响应，用于测试系统功能。\n\n实际实现时，这里将包含豆包大模型生成的真实内容。\n\n";

pub struct DoubaoClient {
    delay: Duration,
}

impl DoubaoClient {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }

    /// No pacing between characters
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

impl Default for DoubaoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for DoubaoClient {
    fn service(&self) -> LlmService {
        LlmService::Doubao
    }

    async fn stream_completion(&self, _prompt: &str) -> Result<TextStream, LlmError> {
        tracing::warn!("Doubao streaming is a placeholder; emitting fixed content");
        let delay = self.delay;
        let chars: Vec<String> = PLACEHOLDER_TEXT.chars().map(String::from).collect();
        Ok(stream::iter(chars)
            .then(move |c| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(c)
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emits_placeholder_char_by_char() {
        let client = DoubaoClient::immediate();
        let deltas: Vec<String> = client
            .stream_completion("ignored")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(deltas.len(), PLACEHOLDER_TEXT.chars().count());
        assert!(deltas.iter().all(|d| d.chars().count() == 1));
        assert_eq!(deltas.concat(), PLACEHOLDER_TEXT);
    }
}
