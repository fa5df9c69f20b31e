//! Generation client port (the one external capability this core consumes).
//!
//! Transport is deliberately out of scope: implementations own HTTP/JSON (or
//! are in-process doubles in tests and the demo CLI); this module only fixes
//! the request/response shapes and the trait seam.

pub mod credentials;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::GeneratedAsset;
use crate::error::GenerateError;

pub use credentials::{ApiKey, CredentialPool, SelectionStrategy};

/// Model identifier understood by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One piece of request content, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    InlineImage { media_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn inline_image(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        ContentPart::InlineImage {
            media_type: media_type.into(),
            data,
        }
    }
}

/// Output-format hint for the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    Json,
    Image,
}

/// Sampling and steering knobs, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
}

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: ModelId,
    pub parts: Vec<ContentPart>,

    #[serde(default)]
    pub config: GenerationConfig,
}

impl GenerateRequest {
    pub fn new(model: ModelId) -> Self {
        Self {
            model,
            parts: Vec::new(),
            config: GenerationConfig::default(),
        }
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }
}

/// Port to the remote content-generation endpoint.
///
/// Implementations report transient upstream conditions through
/// [`GenerateError::Upstream`] messages (HTTP-status substrings, "timeout",
/// "overloaded") so the retry layer can classify them.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GeneratedAsset, GenerateError>;
}
