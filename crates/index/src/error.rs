//! Failure taxonomy for ingestion and the collaborators behind it.

use thiserror::Error;

use ingest::{ChunkError, ReadError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported file format: {extension:?}. Supported: {supported}")]
    UnsupportedFormat { extension: String, supported: String },

    /// Parsing worked but segmentation produced nothing to index.
    #[error(
        "No text extracted from {filename}. File may be empty, corrupted, or image-only (OCR failed)."
    )]
    EmptyExtraction { filename: String },

    #[error("{operation} failed: {source}")]
    CollaboratorUnavailable {
        operation: String,
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn collaborator(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::CollaboratorUnavailable {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::NotFound(path) => Error::NotFound(path.display().to_string()),
            ReadError::UnsupportedFormat {
                extension,
                supported,
            } => Error::UnsupportedFormat {
                extension,
                supported,
            },
            err @ ReadError::Io { .. } => Error::collaborator("read document", err),
        }
    }
}

impl From<ChunkError> for Error {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::InvalidConfig(msg) => Error::InvalidConfig(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
