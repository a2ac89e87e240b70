//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a client.

use crate::client::LlmClient;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::OllamaClient;
use relay_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key, sent as a bearer token
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let mut client = OllamaClient::with_base_url(endpoint.unwrap_or(DEFAULT_OLLAMA_URL));
            if let Some(key) = api_key {
                client = client.with_api_key(key);
            }
            tracing::debug!(provider, "Created LLM client");
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(format!(
            "Unknown provider: {}. Supported: ollama",
            provider
        ))),
    }
}
