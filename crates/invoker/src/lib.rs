//! Expensive-tier invocation: run one prompt through either an in-process
//! model call or a spawned CLI tool, bounded by a timeout and a cancellation
//! token, with every failure collapsing to `None` at [`ExternalInvoker::invoke`].

pub mod backend;
pub mod error;
pub mod model;
pub mod process;

use std::sync::Arc;

use ruleguard_core::{AiBackendConfig, BackendKind};

pub use backend::{Backend, ExternalInvoker};
pub use error::InvokeError;
pub use model::ModelBackend;
pub use process::{strip_preamble, terminate, ProcessBackend};

/// Build the backend selected by `config`.
pub fn create_backend(config: &AiBackendConfig) -> Result<Arc<dyn Backend>, InvokeError> {
    match config.backend {
        BackendKind::InProcess => {
            let provider = ruleguard_llm::create_provider(config)?;
            Ok(Arc::new(ModelBackend::new(Arc::from(provider))))
        }
        BackendKind::ExternalProcess => Ok(Arc::new(ProcessBackend::for_tool(
            &config.external_tool,
            config.external_model.as_deref(),
        ))),
    }
}
