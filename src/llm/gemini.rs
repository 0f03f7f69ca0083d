// Gemini (Google Generative Language API) adapter
// API Reference: https://ai.google.dev/api/generate-content
// Endpoint shape: POST {base}/models/{model}:generateContent with an x-goog-api-key header.
// Inline data parts (base64 images or PDFs) ride alongside text in the same content block,
// which is how both the vision OCR fallback and the image extraction paths work.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::provider::LLMAdapter;
use crate::llm::{LLMRequest, LLMResponse, RequestPart, TokenUsage};
use crate::types::{AppError, AppResult};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

// Request types for the Gemini API

#[derive(Serialize)]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Serialize, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// Response types for the Gemini API

#[derive(Deserialize)]
struct GeminiGenerateResponse {
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GeminiAdapter {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Point the adapter at a non-default base URL (used by tests with a local mock server).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn convert_part(part: &RequestPart) -> GeminiPart {
        match part {
            RequestPart::Text { text } => GeminiPart {
                text: Some(text.clone()),
                inline_data: None,
            },
            RequestPart::InlineData { media_type, base64 } => GeminiPart {
                text: None,
                inline_data: Some(GeminiInlineData {
                    mime_type: media_type.clone(),
                    data: base64.clone(),
                }),
            },
        }
    }
}

#[async_trait]
impl LLMAdapter for GeminiAdapter {
    async fn generate_content(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);

        let generation_config = if request.temperature.is_some() || request.max_output_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            })
        } else {
            None
        };

        let gemini_request = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: request.parts.iter().map(Self::convert_part).collect(),
            }],
            generation_config,
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Gemini request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "Gemini API error ({}): {} (status: {:?})",
                    status, error_response.error.message, error_response.error.status
                )));
            }

            return Err(AppError::LLMApi(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = gemini_response
            .candidates
            .first()
            .ok_or_else(|| AppError::LLMApi("Gemini returned no candidates".to_string()))?;

        let content = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = gemini_response
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: candidate
                .finish_reason
                .clone()
                .unwrap_or_else(|| "STOP".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_content_parses_candidates_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .match_header("x-goog-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "candidates": [{
                        "content": {"parts": [{"text": "Sales data "}, {"text": "for 2024."}]},
                        "finishReason": "STOP"
                    }],
                    "usageMetadata": {
                        "promptTokenCount": 12,
                        "candidatesTokenCount": 6,
                        "totalTokenCount": 18
                    }
                }"#,
            )
            .create_async()
            .await;

        let adapter = GeminiAdapter::with_base_url("test-key", &server.url());
        let request = LLMRequest::text("gemini-1.5-pro", "Summarize this dataset");
        let response = adapter.generate_content(&request).await.unwrap();

        assert_eq!(response.content, "Sales data for 2024.");
        assert_eq!(response.finish_reason, "STOP");
        assert_eq!(response.usage.total_tokens, 18);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_content_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .with_status(400)
            .with_body(r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let adapter = GeminiAdapter::with_base_url("bad-key", &server.url());
        let request = LLMRequest::text("gemini-1.5-pro", "hello");
        let err = adapter.generate_content(&request).await.unwrap_err();

        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_inline_data_request_carries_base64_payload() {
        let request = LLMRequest::with_inline_data("gemini-1.5-pro", "Extract text", "image/png", b"png-bytes");
        assert_eq!(request.parts.len(), 2);
        match &request.parts[1] {
            RequestPart::InlineData { media_type, base64 } => {
                assert_eq!(media_type, "image/png");
                assert!(!base64.is_empty());
            }
            _ => panic!("expected inline data part"),
        }
    }
}
