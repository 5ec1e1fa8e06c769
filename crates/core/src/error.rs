use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unknown AI backend: {0}")]
    UnknownBackend(String),

    #[error("unknown severity: {0}")]
    UnknownSeverity(String),
}
