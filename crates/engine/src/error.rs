//! Engine error types.

use ruleguard_core::RuleguardError;
use ruleguard_invoker::InvokeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend answered, but not with a findings list.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No backend is configured or it could not be built.
    #[error("expensive tier unavailable: {0}")]
    BackendUnavailable(String),

    /// The invoker returned no result (timeout, spawn failure, non-zero exit, ...).
    #[error("invocation produced no result")]
    InvocationFailed,

    #[error("configuration error: {0}")]
    Config(#[from] RuleguardError),

    #[error("invoker error: {0}")]
    Invoke(#[from] InvokeError),
}
