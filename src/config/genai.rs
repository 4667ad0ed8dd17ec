//! Generative provider configuration
//!
//! Provider and model selection are resolved once per run and threaded
//! explicitly into the extraction call, so concurrent runs with different
//! user profiles cannot interfere through ambient state.

use serde::{Deserialize, Serialize};

/// Configuration for the generative extraction client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenAiConfig {
    /// Provider tag used for usage accounting ("openai", "openrouter", ...)
    pub provider: String,
    /// Chat-completions base URL (OpenAI-compatible)
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Output budget for the first attempt
    pub draft_max_tokens: u32,
    /// Output budget for the larger-budget retry
    pub retry_max_tokens: u32,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Include fetched-page text excerpts in the prompt
    pub include_page_excerpts: bool,
    /// Characters of page text included per candidate URL
    pub excerpt_chars: usize,
    /// Pages excerpted at most
    pub max_excerpted_pages: usize,
    /// Optional prompt template override; `{course}`, `{context}` and
    /// `{hints}` placeholders are substituted
    pub prompt_template: Option<String>,
}

impl Default for GenAiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "COURSEINTEL_API_KEY".to_string(),
            draft_max_tokens: 2048,
            retry_max_tokens: 4096,
            request_timeout_secs: 90,
            include_page_excerpts: true,
            excerpt_chars: 2000,
            max_excerpted_pages: 5,
            prompt_template: None,
        }
    }
}

impl GenAiConfig {
    /// Resolve the API key from the configured environment variable.
    /// A missing key is a configuration error and fails the run up front.
    pub fn resolve_api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Missing API key: environment variable {} is not set",
                self.api_key_env
            )
        })
    }
}
