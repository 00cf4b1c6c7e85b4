//! Error types for the retrieval and answering pipeline.
//!
//! Library code returns [`RagError`]; the `policy-assistant` binary and the
//! config loader wrap everything in `anyhow` for reporting.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required setting or credential is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The corpus directory does not exist.
    #[error("Policy directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    /// The corpus directory holds no eligible files.
    #[error("No eligible policy files found in {}", .0.display())]
    EmptyCorpus(PathBuf),

    /// A corpus file could not be read or decoded.
    #[error("Corpus error ({}): {message}", .path.display())]
    Corpus {
        /// The offending file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The embedding provider failed or is misconfigured.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingProvider {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model call failed.
    #[error("Language model error ({provider}): {message}")]
    LanguageModel {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted index is missing, unreadable or inconsistent.
    #[error("Index state error: {0}")]
    IndexState(String),

    /// A caller passed an out-of-range argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The SQLite vector store failed.
    #[error("Vector store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Filesystem I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::EmbeddingProvider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn language_model(provider: &str, message: impl Into<String>) -> Self {
        RagError::LanguageModel {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
