//! Server-sent event parsing for streamed completions
//!
//! Both providers answer with `data: {...}` lines. Bytes are buffered until a
//! newline arrives, so a JSON payload split across network chunks is only
//! parsed once it is complete.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use super::{LlmError, TextStream};

/// One complete `data:` line
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    Payload(String),
    Done,
}

/// Accumulates raw bytes and yields complete `data:` lines
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and drain every complete line from the buffer
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..pos + 1).collect();
            if let Some(data) = parse_line(&line_bytes[..pos]) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<SseData> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(bytes: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line == "data: [DONE]" || line == "data:[DONE]" {
        return Some(SseData::Done);
    }
    line.strip_prefix("data:")
        .map(|payload| SseData::Payload(payload.trim_start().to_string()))
}

/// Byte stream of a provider response, already mapped into `LlmError`
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, LlmError>>;

struct DeltaState {
    bytes: ByteStream,
    lines: SseLineBuffer,
    pending: VecDeque<String>,
    extract: fn(&Value) -> Option<String>,
    done: bool,
}

impl DeltaState {
    fn absorb(&mut self, data: SseData) {
        match data {
            SseData::Done => self.done = true,
            SseData::Payload(json) => match serde_json::from_str::<Value>(&json) {
                Ok(value) => {
                    if let Some(text) = (self.extract)(&value) {
                        if !text.is_empty() {
                            self.pending.push_back(text);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("Skipping unparsable SSE payload ({} bytes): {}", json.len(), e);
                }
            },
        }
    }
}

/// Turn a provider byte stream into a stream of text deltas.
///
/// `extract` pulls the delta text out of one decoded payload. The stream ends
/// at `data: [DONE]` or when the connection closes.
pub fn text_deltas(bytes: ByteStream, extract: fn(&Value) -> Option<String>) -> TextStream {
    let state = DeltaState {
        bytes,
        lines: SseLineBuffer::new(),
        pending: VecDeque::new(),
        extract,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(delta) = st.pending.pop_front() {
                return Some((Ok(delta), st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for data in st.lines.push(&chunk) {
                        if st.done {
                            break;
                        }
                        st.absorb(data);
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    if let Some(data) = st.lines.finish() {
                        st.absorb(data);
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_of(value: &Value) -> Option<String> {
        value["text"].as_str().map(str::to_string)
    }

    fn bytes_of(chunks: Vec<&'static str>) -> ByteStream {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed()
    }

    #[test]
    fn test_line_buffer_waits_for_newline() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: {\"te").is_empty());
        let lines = buf.push(b"xt\":\"hi\"}\n\n");
        assert_eq!(lines, vec![SseData::Payload("{\"text\":\"hi\"}".to_string())]);
    }

    #[test]
    fn test_line_buffer_done_marker_and_comments() {
        let mut buf = SseLineBuffer::new();
        let lines = buf.push(b": keep-alive\nevent: message\ndata: [DONE]\n");
        assert_eq!(lines, vec![SseData::Done]);
    }

    #[test]
    fn test_line_buffer_handles_crlf_and_split_utf8() {
        let mut buf = SseLineBuffer::new();
        let payload = "data: {\"text\":\"产业\"}\r\n".as_bytes();
        let (a, b) = payload.split_at(17);
        assert!(buf.push(a).is_empty());
        let lines = buf.push(b);
        assert_eq!(lines, vec![SseData::Payload("{\"text\":\"产业\"}".to_string())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut buf = SseLineBuffer::new();
        buf.push(b"data: {\"text\":\"tail\"}");
        assert_eq!(
            buf.finish(),
            Some(SseData::Payload("{\"text\":\"tail\"}".to_string()))
        );
        assert_eq!(buf.finish(), None);
    }

    #[tokio::test]
    async fn test_text_deltas_stop_at_done() {
        let bytes = bytes_of(vec![
            "data: {\"text\":\"a\"}\n",
            "data: {\"text\":\"b\"}\ndata: [DONE]\n",
            "data: {\"text\":\"ignored\"}\n",
        ]);
        let deltas: Vec<String> = text_deltas(bytes, content_of)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_text_deltas_skip_bad_json_and_empty_text() {
        let bytes = bytes_of(vec![
            "data: not-json\n",
            "data: {\"text\":\"\"}\n",
            "data: {\"other\":1}\n",
            "data: {\"text\":\"ok\"}",
        ]);
        let deltas: Vec<String> = text_deltas(bytes, content_of)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_text_deltas_surface_transport_errors() {
        let bytes: ByteStream = stream::iter(vec![
            Ok(b"data: {\"text\":\"x\"}\n".to_vec()),
            Err(LlmError::Request("reset".to_string())),
        ])
        .boxed();
        let items: Vec<Result<String, LlmError>> = text_deltas(bytes, content_of).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("x"));
        assert!(items[1].is_err());
    }
}
