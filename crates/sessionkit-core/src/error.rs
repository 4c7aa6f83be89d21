//! Error types for sessionkit

use thiserror::Error;

use crate::ids::Id;
use crate::track::TrackKind;
use crate::validate::Finding;

/// Fatal failures while reading a project file
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Container error: {0}")]
    Container(String),
    #[error("Malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(String),
    #[error("Unexpected structure: {0}")]
    Structure(String),
    #[error("Invalid value {value:?} in <{element}>")]
    InvalidValue { element: String, value: String },
}

/// Failures while writing a project file
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected document mutations
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Track not found: {0}")]
    TrackNotFound(Id),
    #[error("Track {0:?} has no clip timeline")]
    NoClipTimeline(String),
    #[error("Invalid tempo: {0}")]
    InvalidTempo(f64),
    #[error("Invalid clip: {0}")]
    InvalidClip(String),
    #[error("Cannot add a {0} track")]
    UnsupportedTrackKind(TrackKind),
}

/// A generation run that could not produce a loadable document
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Template is not loadable: {} validation error(s)", .0.len())]
    InvalidTemplate(Vec<Finding>),
    #[error("Invalid song spec: {0}")]
    InvalidSpec(String),
    #[error("Missing required track: {0}")]
    MissingRequiredTrack(String),
    #[error("Track {0:?} has no clip timeline to embed into")]
    MissingClipPath(String),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Generated document failed validation: {} error(s)", .0.len())]
    Validation(Vec<Finding>),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
