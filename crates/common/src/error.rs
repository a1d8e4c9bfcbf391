//! Error types shared across ReefShader crates.

use std::path::PathBuf;

/// Top-level error type for ReefShader operations.
#[derive(Debug, thiserror::Error)]
pub enum ReefError {
    /// Invalid or incomplete configuration. Raised before any frame is processed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A pipeline stage precondition was violated.
    #[error("Stage error: {message}")]
    Stage { message: String },

    /// Stabilization analysis or session setup failed.
    #[error("Stabilization session error: {message}")]
    Session { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReefError.
pub type ReefResult<T> = Result<T, ReefError>;

impl ReefError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::Stage {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error means the run must not start at all.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
