//! sessionkit-services: File-level operations over the project engine

pub mod compare;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod generate;
pub mod scan;

pub use compare::compare;
pub use config::{Config, ScanConfig};
pub use diagnose::{Diagnosis, diagnose, read_document};
pub use error::{Result, ServiceError};
pub use generate::{generate, load_song_spec};
pub use scan::{CancellationToken, FileReport, FileStatus, ScanEvent, ScanFilters, ScanOutcome, scan};
