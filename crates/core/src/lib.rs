pub mod config;
pub mod error;
pub mod finding;

pub use config::{AiBackendConfig, AnalysisConfig, BackendKind};
pub use error::*;
pub use finding::*;
