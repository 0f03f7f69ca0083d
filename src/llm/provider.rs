use async_trait::async_trait;

use crate::llm::{LLMRequest, LLMResponse};
use crate::types::AppResult;

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider.
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> Self {
        let adapter: Box<dyn LLMAdapter> = match provider.name.as_str() {
            // "google" accepted as an alias since the API lives under Google's AI platform
            "gemini" | "google" => Box::new(crate::llm::gemini::GeminiAdapter::new(&provider.api_key)),
            _ => panic!("Unsupported provider: {}", provider.name),
        };

        Self { adapter }
    }

    /// Wrap an adapter directly; used by tests to inject mock-backed adapters.
    pub fn with_adapter(adapter: Box<dyn LLMAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.generate_content(request).await
    }
}
