use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument};

use crate::{
    config::VertexConfig,
    error::{ApiError, Result},
    models::ai::{ExtractionOutput, TokenUsage},
    services::credentials::TokenProvider,
};

const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Forwards image + prompt pairs to Vertex AI `generateContent`
pub struct AIService {
    config: VertexConfig,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum RequestPart<'a> {
    InlineData(InlineData<'a>),
    Text(&'a str),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, alias = "usage_metadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default, alias = "prompt_token_count")]
    prompt_token_count: u64,
    #[serde(default, alias = "candidates_token_count")]
    candidates_token_count: u64,
    #[serde(default, alias = "thoughts_token_count")]
    thoughts_token_count: u64,
    #[serde(default, alias = "total_token_count")]
    total_token_count: u64,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            thoughts_tokens: usage.thoughts_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

impl AIService {
    pub fn new(
        config: &VertexConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> std::result::Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http_client,
            tokens,
        })
    }

    /// Extract text from an image with the configured Gemini model.
    ///
    /// A fresh access token is requested on every call. No retries.
    #[instrument(skip(self, image_base64, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    pub async fn extract(&self, image_base64: &str, prompt: &str) -> Result<ExtractionOutput> {
        if image_base64.is_empty() {
            return Err(ApiError::BadRequest("image_base64 required".to_string()));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::InlineData(InlineData {
                        mime_type: IMAGE_MIME_TYPE,
                        data: image_base64,
                    }),
                    RequestPart::Text(prompt),
                ],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
            },
        };

        let token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .post(self.config.generate_content_url())
            .bearer_auth(&token.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("Vertex AI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("Vertex AI returned {}: {}", status, error_text);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Transport(message),
                _ => ApiError::Upstream(message),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read Vertex AI response: {}", e)))?;
        let parsed: GenerateContentResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Upstream(format!("Failed to parse Vertex AI response: {}", e)))?;

        let usage: TokenUsage = parsed.usage_metadata.unwrap_or_default().into();
        info!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            thoughts_tokens = usage.thoughts_tokens,
            total_tokens = usage.total_tokens,
            "Vertex AI token usage"
        );

        let text = first_text(parsed.candidates)?;

        Ok(ExtractionOutput { text, usage })
    }
}

/// Text of the first part of the first candidate
fn first_text(candidates: Vec<Candidate>) -> Result<String> {
    let candidate = candidates
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Upstream("No candidates in response".to_string()))?;

    candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| ApiError::Upstream("No text in response".to_string()))
}
