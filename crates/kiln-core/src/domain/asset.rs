//! Opaque assets flowing in and out of generation calls.

use serde::{Deserialize, Serialize};

/// An input asset attached to a job (typically a product photo).
///
/// Inputs are opaque to the core: they are handed to the generation client
/// verbatim and never inspected or mutated after the job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAsset {
    /// MIME type, e.g. "image/png".
    pub media_type: String,

    pub data: Vec<u8>,
}

impl InputAsset {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }
}

/// The payload of a generated asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum AssetPayload {
    /// Plain or structured text (ad copy, JSON scene plans).
    Text(String),

    /// Raw bytes (a rendered image).
    Binary(Vec<u8>),
}

impl AssetPayload {
    /// Text content, if this payload is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AssetPayload::Text(text) => Some(text),
            AssetPayload::Binary(_) => None,
        }
    }
}

/// A successfully generated asset plus its media type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAsset {
    /// MIME type of the payload, e.g. "text/plain" or "image/png".
    pub media_type: String,

    pub payload: AssetPayload,
}

impl GeneratedAsset {
    pub fn text(media_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            payload: AssetPayload::Text(text.into()),
        }
    }

    pub fn binary(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            payload: AssetPayload::Binary(data),
        }
    }
}
