//! The [`Backend`] seam and the [`ExternalInvoker`] that wraps it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::InvokeError;

/// One way of running an expensive-tier prompt to completion.
///
/// `cancel` is the combined cancellation context for this call. Backends own
/// the `timeout`: when it elapses they cancel `cancel`, tear down whatever they
/// started and return [`InvokeError::Timeout`] without waiting further.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String, InvokeError>;

    /// Backend name for logging (e.g., "claude-cli", "model:claude").
    fn name(&self) -> &str;
}

/// Runs prompts through a configured [`Backend`] and collapses every failure
/// to `None` at the tier boundary.
#[derive(Clone)]
pub struct ExternalInvoker {
    backend: Arc<dyn Backend>,
}

impl ExternalInvoker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run `prompt`, returning the raw response text.
    ///
    /// `None` means the tier produced no usable result; an empty string is a
    /// successful run. The caller's token and the internal timeout share one
    /// child token, so the call stops when either fires first.
    pub async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Option<String> {
        match self.try_invoke(prompt, timeout, cancel).await {
            Ok(text) => Some(text),
            Err(_) => None,
        }
    }

    /// Like [`invoke`](Self::invoke) but keeps the failure for callers that
    /// need to distinguish failure kinds.
    pub async fn try_invoke(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, InvokeError> {
        let combined = match cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let started = Instant::now();

        let result = self.backend.run(prompt, timeout, combined).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => info!(
                backend = self.backend.name(),
                elapsed_ms,
                bytes = text.len(),
                "invocation completed"
            ),
            Err(e) => warn!(
                backend = self.backend.name(),
                kind = e.kind(),
                elapsed_ms,
                error = %e,
                "invocation failed"
            ),
        }
        result
    }
}
