//! JSON codec for envelopes
//!
//! Decoding distinguishes frames that are not JSON at all from frames that
//! parse but lack required envelope fields, so readers can log them apart.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Not valid JSON (or not UTF-8)
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Valid JSON that does not match the envelope shape
    #[error("Incomplete envelope: {0}")]
    Incomplete(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(String),
}

impl CodecError {
    fn from_decode(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => CodecError::Incomplete(err.to_string()),
            Category::Syntax | Category::Eof | Category::Io => {
                CodecError::Malformed(err.to_string())
            }
        }
    }
}

/// Encode an envelope as a JSON text frame
pub fn encode<T: Serialize>(envelope: &T) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode an envelope from a text frame
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, CodecError> {
    serde_json::from_str(frame).map_err(CodecError::from_decode)
}

/// Decode an envelope from a binary frame carrying UTF-8 JSON
pub fn decode_bytes<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(frame).map_err(CodecError::from_decode)
}
