pub mod claude;

use ruleguard_core::AiBackendConfig;

use crate::provider::{LlmError, LlmProvider};

/// Create the in-process LLM provider described by the AI backend config.
pub fn create_provider(config: &AiBackendConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    let api_key = config
        .api_key
        .as_ref()
        .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
    Ok(Box::new(claude::ClaudeProvider::new(
        api_key.clone(),
        config.model_family.clone(),
        config.api_base_url.clone(),
    )))
}
