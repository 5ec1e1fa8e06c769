//! Streaming LLM providers used by the in-process analysis backend.

pub mod provider;
pub mod providers;
pub mod stream;

pub use provider::{CompletionRequest, EventStream, LlmError, LlmProvider};
pub use providers::claude::ClaudeProvider;
pub use providers::create_provider;
pub use stream::{StopReason, StreamEvent};
