//! In-process backend: a streamed model call raced against the timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ruleguard_llm::{CompletionRequest, LlmError, LlmProvider, StreamEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::InvokeError;

pub struct ModelBackend {
    provider: Arc<dyn LlmProvider>,
    name: String,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl ModelBackend {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        let name = format!("model:{}", provider.provider_name());
        Self {
            provider,
            name,
            system_prompt: None,
            max_tokens: 4096,
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Pull the stream until the message ends, accumulating text deltas.
    async fn collect(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InvokeError> {
        let mut stream = self.provider.stream(request, cancel.clone()).await?;
        let mut text = String::new();
        let mut chunks = 0usize;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: delta } => {
                    chunks += 1;
                    text.push_str(&delta);
                }
                StreamEvent::MessageEnd { stop_reason } => {
                    debug!(?stop_reason, chunks, "model stream finished");
                    break;
                }
                StreamEvent::Error { message } => {
                    return Err(LlmError::StreamError(message).into());
                }
            }
        }

        // A provider ends its stream early when cancelled; that is not a result.
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }
        Ok(text)
    }
}

#[async_trait]
impl Backend for ModelBackend {
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String, InvokeError> {
        let mut request = CompletionRequest::new(prompt);
        request.max_tokens = self.max_tokens;
        if let Some(system) = &self.system_prompt {
            request = request.with_system(system.clone());
        }

        // Dropping the collect future on timeout/cancel discards late chunks.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvokeError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                warn!(backend = %self.name, timeout_ms = timeout.as_millis() as u64, "timeout fired");
                cancel.cancel();
                Err(InvokeError::Timeout(timeout))
            }
            result = self.collect(request, &cancel) => result,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
