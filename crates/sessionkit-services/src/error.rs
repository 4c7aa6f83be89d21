//! Service error types

use std::path::PathBuf;

use sessionkit_core::{DecodeError, EncodeError, GenerationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: DecodeError,
    },
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Invalid song spec {path}: {message}")]
    SongSpec { path: PathBuf, message: String },
    #[error("Invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },
    #[error("Worker pool error: {0}")]
    Pool(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
