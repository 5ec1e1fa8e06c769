use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::stream::StreamEvent;

/// Boxed stream of incremental model output.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// A single-turn completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Streaming model provider implemented by each backend.
///
/// The `cancel` token is cooperative: implementations must stop pulling from
/// the network and end the stream once it is cancelled.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a streamed completion.
    async fn stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, LlmError>;

    /// Provider name for logging/debugging (e.g., "claude", "mock").
    fn provider_name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    AuthError,
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Mock LLM provider for testing callers without real API calls.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::stream::StopReason;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A mock provider that emits pre-configured chunks with an optional delay
    /// before each one, honoring cancellation between chunks.
    pub struct MockLlmProvider {
        chunks: Vec<String>,
        delay: Duration,
        fail_with: Option<String>,
        calls: AtomicUsize,
        saw_cancel: Arc<AtomicBool>,
        last_request: Mutex<Option<CompletionRequest>>,
        last_token: Mutex<Option<CancellationToken>>,
    }

    impl MockLlmProvider {
        pub fn new(chunks: Vec<&str>) -> Self {
            Self {
                chunks: chunks.into_iter().map(String::from).collect(),
                delay: Duration::ZERO,
                fail_with: None,
                calls: AtomicUsize::new(0),
                saw_cancel: Arc::new(AtomicBool::new(false)),
                last_request: Mutex::new(None),
                last_token: Mutex::new(None),
            }
        }

        /// Sleep this long before every chunk.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Fail the request up front with a network error.
        pub fn failing(message: &str) -> Self {
            let mut mock = Self::new(Vec::new());
            mock.fail_with = Some(message.to_string());
            mock
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Whether a stream produced by this provider observed cancellation.
        pub fn saw_cancel(&self) -> bool {
            self.saw_cancel.load(Ordering::SeqCst)
        }

        /// The most recent request passed to `stream`.
        pub fn last_request(&self) -> Option<CompletionRequest> {
            self.last_request.lock().expect("mock lock poisoned").clone()
        }

        /// The cancellation token handed to the most recent `stream` call.
        pub fn last_token(&self) -> Option<CancellationToken> {
            self.last_token.lock().expect("mock lock poisoned").clone()
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn stream(
            &self,
            request: CompletionRequest,
            cancel: CancellationToken,
        ) -> Result<EventStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("mock lock poisoned") = Some(request);
            *self.last_token.lock().expect("mock lock poisoned") = Some(cancel.clone());
            if let Some(message) = &self.fail_with {
                return Err(LlmError::NetworkError(message.clone()));
            }

            let mut events: Vec<StreamEvent> = self
                .chunks
                .iter()
                .map(|text| StreamEvent::TextDelta { text: text.clone() })
                .collect();
            events.push(StreamEvent::MessageEnd {
                stop_reason: StopReason::EndTurn,
            });

            let delay = self.delay;
            let saw_cancel = Arc::clone(&self.saw_cancel);
            let state = (events.into_iter(), cancel, saw_cancel);
            let s = stream::unfold(state, move |(mut events, cancel, saw_cancel)| async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        saw_cancel.store(true, Ordering::SeqCst);
                        None
                    }
                    _ = tokio::time::sleep(delay) => {
                        match events.next() {
                            Some(event) => Some((Ok(event), (events, cancel, saw_cancel))),
                            None => None,
                        }
                    }
                }
            });
            Ok(Box::pin(s))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockLlmProvider;
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[test]
    fn request_defaults_and_system_prompt() {
        let request = CompletionRequest::new("review this");
        assert_eq!(request.system, None);
        assert_eq!(request.temperature, 0.0);

        let request = request.with_system("You are a code reviewer.");
        assert_eq!(request.system.as_deref(), Some("You are a code reviewer."));
        assert_eq!(request.prompt, "review this");
    }

    #[tokio::test(start_paused = true)]
    async fn mock_stream_stops_when_cancelled() {
        let provider = MockLlmProvider::new(vec!["a", "b", "c"]).with_delay(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let mut stream = provider
            .stream(CompletionRequest::new("p"), cancel.clone())
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, StreamEvent::TextDelta { ref text } if text == "a"));

        cancel.cancel();
        assert!(stream.next().await.is_none());
        assert!(provider.saw_cancel());
        assert_eq!(provider.last_request().unwrap().prompt, "p");
    }
}
