// LLM abstraction layer

pub mod provider;
pub mod gemini;

pub use provider::*;

/// Request for a single generation call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Content part for multimodal requests (text, inline documents/images).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum RequestPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "inline_data")]
    InlineData {
        media_type: String, // e.g. "image/png", "application/pdf"
        base64: String,
    },
}

impl LLMRequest {
    /// Plain text prompt against the given model.
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![RequestPart::Text { text: prompt.into() }],
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Text prompt accompanied by an inline media payload (vision/OCR use).
    pub fn with_inline_data(
        model: impl Into<String>,
        prompt: impl Into<String>,
        media_type: impl Into<String>,
        data: &[u8],
    ) -> Self {
        use base64::Engine;
        Self {
            model: model.into(),
            parts: vec![
                RequestPart::Text { text: prompt.into() },
                RequestPart::InlineData {
                    media_type: media_type.into(),
                    base64: base64::engine::general_purpose::STANDARD.encode(data),
                },
            ],
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
