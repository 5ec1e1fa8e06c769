//! Invocation error taxonomy.

use std::time::Duration;

use ruleguard_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cancelled by caller")]
    Cancelled,

    #[error("failed to spawn '{program}': {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("model call failed: {0}")]
    NetworkOrModel(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::Timeout(_) => "timeout",
            InvokeError::Cancelled => "cancelled",
            InvokeError::SpawnFailure { .. } => "spawn_failure",
            InvokeError::NonZeroExit { .. } => "non_zero_exit",
            InvokeError::NetworkOrModel(_) => "network_or_model",
            InvokeError::Io(_) => "io",
        }
    }
}
