//! Model-level error types.

use thiserror::Error;

/// Result type for content item validation.
pub type InputResult<T> = Result<T, InputError>;

/// A content item that cannot be processed.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("content item has no id")]
    MissingId,

    #[error("content item {0} has an empty headline")]
    EmptyHeadline(String),

    #[error("malformed content item: {0}")]
    Malformed(String),
}

impl InputError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Result type for layout validation.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// A render spec that violates its own geometry.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("region {role} lies outside the {width}x{height} canvas")]
    OutOfCanvas {
        role: String,
        width: u32,
        height: u32,
    },

    #[error("text regions {0} and {1} overlap")]
    Overlap(String, String),

    #[error("missing required region: {0}")]
    MissingRegion(String),

    #[error("invalid style for region {role}: {reason}")]
    InvalidStyle { role: String, reason: String },
}
