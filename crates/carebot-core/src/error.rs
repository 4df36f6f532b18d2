//! Error taxonomy shared by every carebot component.

use thiserror::Error;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// One or more required environment variables are absent.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),

    /// A setting is present but cannot be used.
    #[error("invalid value for {key}: {message}")]
    InvalidConfiguration { key: String, message: String },

    /// The ingestion directory is missing, empty, or yielded no documents.
    #[error("no documents found in {0}")]
    NoDocumentsFound(String),

    /// The remote index was built for a different embedding width.
    #[error(
        "dimension mismatch on index '{index}': index has dimension {existing} \
         but the embedding model produces {expected}; enable recreation to rebuild it"
    )]
    DimensionMismatch {
        index: String,
        existing: usize,
        expected: usize,
    },

    /// Any failure reported by, or while talking to, a hosted service.
    #[error("{service} error: {message}")]
    RemoteService { service: String, message: String },

    /// User-supplied input that cannot be interpreted.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn remote(service: impl Into<String>, message: impl ToString) -> Self {
        Self::RemoteService {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
