//! Error types for the RAG pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur while loading, indexing, answering or evaluating.
#[derive(Error, Debug)]
pub enum RagError {
    /// The input file does not exist.
    #[error("File not found: '{0}'")]
    NotFound(PathBuf),

    /// The file extension is not in the loader's allow-list.
    #[error("Unsupported format: '{extension}'. Supported: {supported}")]
    UnsupportedFormat {
        extension: String,
        supported: String,
    },

    /// Reading or parsing a source document failed.
    #[error("Error loading file '{path}': {message}")]
    Load { path: PathBuf, message: String },

    /// Embedding or chat completion API failure.
    #[error("Service error: {0}")]
    Service(String),

    /// Writing or reading persisted state failed.
    #[error("Persistence error for path '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization of persisted state.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Create a persistence error with path context.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Create a load error with path context.
    pub fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::Service(format!("request timed out: {}", err))
        } else {
            RagError::Service(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Service(format!("malformed response: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RagError::NotFound(PathBuf::from("missing.pdf"));
        assert_eq!(err.to_string(), "File not found: 'missing.pdf'");

        let err = RagError::UnsupportedFormat {
            extension: ".docx".to_string(),
            supported: ".pdf, .txt".to_string(),
        };
        assert!(err.to_string().contains(".docx"));
        assert!(err.to_string().contains(".pdf, .txt"));
    }

    #[test]
    fn test_json_error_maps_to_service() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RagError = json_err.into();
        assert!(matches!(err, RagError::Service(_)));
    }
}
