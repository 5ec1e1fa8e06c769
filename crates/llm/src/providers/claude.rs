//! Claude (Anthropic Messages API) streaming provider.
//!
//! Sends `stream: true` requests and translates the SSE `data:` payloads into
//! provider-agnostic [`StreamEvent`]s. Cancellation is checked between network
//! reads, so a cancelled token ends the stream without waiting for the next
//! chunk.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::provider::{CompletionRequest, EventStream, LlmError, LlmProvider};
use crate::stream::{StopReason, StreamEvent};

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g. `"claude-sonnet-4-20250514"`)
    /// * `base_url` - API base URL (e.g. `"https://api.anthropic.com"`)
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SSE parsing
// ---------------------------------------------------------------------------

/// Parse one SSE `data:` payload into zero or more stream events.
///
/// Anthropic repeats the event type inside the JSON body, so the `event:` line
/// carries no extra information and is ignored by the caller.
pub(crate) fn parse_sse_data(data: &str) -> Vec<StreamEvent> {
    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let mut events = Vec::new();
    match parsed["type"].as_str() {
        Some("content_block_start") => {
            if let Some(text) = parsed["content_block"]["text"].as_str() {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta {
                        text: text.to_string(),
                    });
                }
            }
        }
        Some("content_block_delta") => {
            if parsed["delta"]["type"].as_str() == Some("text_delta") {
                if let Some(text) = parsed["delta"]["text"].as_str() {
                    events.push(StreamEvent::TextDelta {
                        text: text.to_string(),
                    });
                }
            }
        }
        Some("message_delta") => {
            let stop_reason = match parsed["delta"]["stop_reason"].as_str() {
                Some("max_tokens") => StopReason::MaxTokens,
                Some("stop_sequence") => StopReason::StopSequence,
                _ => StopReason::EndTurn,
            };
            events.push(StreamEvent::MessageEnd { stop_reason });
        }
        Some("error") => {
            let message = parsed["error"]["message"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| data.to_string());
            events.push(StreamEvent::Error { message });
        }
        Some(other) => {
            trace!(event_type = other, "ignoring SSE event");
        }
        None => {}
    }
    events
}

/// Split complete lines off `buffer`, returning the `data:` payloads found.
///
/// Works on raw bytes: a chunk may end inside a multi-byte character, so only
/// whole lines are decoded.
fn drain_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw[..newline_pos]);
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            payloads.push(data.trim_start().to_string());
        }
    }
    payloads
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        debug!(model = %self.model, url = %url, "starting Claude streaming request");

        let send = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(LlmError::StreamError("cancelled before response".to_string()));
            }
            result = send => result.map_err(|e| LlmError::NetworkError(e.to_string()))?,
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.unwrap_or_default();
            if status == 401 {
                return Err(LlmError::AuthError);
            }
            if status == 429 {
                let retry_after = serde_json::from_str::<Value>(&body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                return Err(LlmError::RateLimited {
                    retry_after_secs: retry_after,
                });
            }
            return Err(LlmError::ApiError {
                status,
                message: body_text,
            });
        }

        type ByteStream =
            Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>;

        struct State {
            bytes: ByteStream,
            buffer: Vec<u8>,
            pending: std::collections::VecDeque<StreamEvent>,
            cancel: CancellationToken,
        }

        let state = State {
            bytes: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
            pending: std::collections::VecDeque::new(),
            cancel,
        };

        let event_stream = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(evt) = state.pending.pop_front() {
                    return Some((Ok(evt), state));
                }

                let next = tokio::select! {
                    _ = state.cancel.cancelled() => {
                        debug!("Claude stream cancelled");
                        return None;
                    }
                    next = state.bytes.next() => next,
                };

                match next {
                    Some(Ok(chunk)) => {
                        state.buffer.extend_from_slice(&chunk);
                        for data in drain_data_lines(&mut state.buffer) {
                            state.pending.extend(parse_sse_data(&data));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(LlmError::StreamError(e.to_string())), state));
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(event_stream))
    }

    fn provider_name(&self) -> &str {
        "claude"
    }
}
