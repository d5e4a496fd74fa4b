//! Decoding errors for polymorphic payloads.

use thiserror::Error;

/// Errors produced while decoding or accessing polymorphic wire data.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A message component carried an unrecognized `type` discriminator.
    #[error("unknown component type: {0}")]
    UnknownComponentType(u8),

    /// An interaction carried an unrecognized `type` discriminator.
    #[error("unknown interaction type: {0}")]
    UnknownInteractionType(u8),

    /// A typed accessor was called on the wrong variant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
