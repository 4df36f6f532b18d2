//! Mistral chat-completion client.
//!
//! Requests are sent with `stream: true`; the server-sent events are decoded
//! incrementally and the `choices[0].delta.content` fragments are joined
//! into the full answer.

use async_trait::async_trait;
use carebot_core::chat::{ChatMessage, ChatModel};
use carebot_core::error::{Error, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;

use crate::http::{check_status, join_url};

const SERVICE: &str = "mistral";

pub struct MistralChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl MistralChat {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for MistralChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": true,
        });

        let response = self
            .client
            .post(join_url(&self.base_url, "v1/chat/completions"))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let mut decoder = SseDecoder::default();
        let mut answer = String::new();
        let mut stream = response.bytes_stream();

        'read: while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| Error::remote(SERVICE, e))?;
            for event in decoder.push(&bytes) {
                match event? {
                    SseEvent::Delta(text) => answer.push_str(&text),
                    SseEvent::Done => break 'read,
                }
            }
        }
        for event in decoder.finish() {
            if let SseEvent::Delta(text) = event? {
                answer.push_str(&text);
            }
        }

        tracing::debug!(model = %self.model, chars = answer.len(), "completion received");
        Ok(answer.trim().to_string())
    }
}

/// A decoded server-sent event of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Incremental decoder for `data:` lines. Bytes are buffered until a full
/// line arrives, so events and multi-byte characters may span chunks.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Vec<Result<SseEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<Result<SseEvent>> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(e) => {
            return Some(Err(Error::remote(
                SERVICE,
                format!("malformed stream event: {}", e),
            )))
        }
    };
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str())
    {
        return Some(Err(Error::remote(SERVICE, message)));
    }
    json.pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| Ok(SseEvent::Delta(c.to_string())))
}
