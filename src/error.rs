//! Central error handling for style compilation and document mutation.
//!
//! Document errors are fatal to the apply call that raised them; mutation
//! errors are reported synchronously and leave the document untouched.
//! Expression and filter compile errors are not represented here — those
//! paths fail soft (logged, property falls back to its default).

/// Centralized error type for all style operations.
#[derive(thiserror::Error, Debug)]
pub enum StyleError {
    #[error("unsupported style version: {0} (expected 8)")]
    UnsupportedVersion(u32),

    #[error("layer '{layer}' references missing source '{source}'")]
    MissingSource { layer: String, source: String },

    #[error("layers span more than one source: {0}")]
    MixedSources(String),

    #[error("source '{source}' is not of the expected type '{expected}'")]
    SourceTypeMismatch {
        source: String,
        expected: &'static str,
    },

    #[error("duplicate layer id: {0}")]
    DuplicateLayerId(String),

    #[error("anchor layer not found: {0}")]
    AnchorNotFound(String),

    #[error("updated layer '{0}' must keep the same source")]
    SourceMismatch(String),

    #[error("cannot remove '{0}': it is the last layer of its rendering group")]
    LastLayerInGroup(String),

    #[error("no layer bound to source '{0}' for feature state")]
    FeatureStateTargetNotFound(String),

    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),

    #[error("invalid style: {0}")]
    Invalid(String),

    #[error("sprite error: {0}")]
    Sprite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StyleError {
    /// Convenience constructor for sprite failures.
    pub fn sprite<T: ToString>(msg: T) -> Self {
        StyleError::Sprite(msg.to_string())
    }
}

/// Result type alias for style operations.
pub type StyleResult<T> = Result<T, StyleError>;
