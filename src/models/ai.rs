use serde::{Deserialize, Serialize};
use validator::Validate;

/// POST /extract request
#[derive(Debug, Deserialize, Validate)]
pub struct ExtractRequest {
    /// Base64-encoded JPEG bytes
    #[serde(default)]
    #[validate(
        required(message = "image_base64 required"),
        length(min = 1, message = "image_base64 required")
    )]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub prompt: String,
}

/// POST /extract response
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub text: String,
}

/// Token counts reported by the generation API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thoughts_tokens: u64,
    pub total_tokens: u64,
}

/// Text pulled from the first candidate, plus the usage it cost
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub text: String,
    pub usage: TokenUsage,
}
