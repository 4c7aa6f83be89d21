//! Single-file diagnosis: health report plus structural validation

use std::path::{Path, PathBuf};

use serde::Serialize;
use sessionkit_core::{Document, HealthPolicy, HealthReport, ValidationReport, analyze_with, decode, validate};
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub path: PathBuf,
    pub health: HealthReport,
    pub validation: ValidationReport,
}

/// Read and decode a project file from disk
pub fn read_document(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path).map_err(|source| ServiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read project file");
    decode(&bytes).map_err(|source| ServiceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn diagnose(path: &Path, policy: &HealthPolicy) -> Result<Diagnosis> {
    let doc = read_document(path)?;
    let health = analyze_with(&doc, policy);
    let validation = validate(&doc);
    info!(
        path = %path.display(),
        score = health.score,
        grade = %health.grade,
        errors = validation.errors().count(),
        "Diagnosed project"
    );
    Ok(Diagnosis {
        path: path.to_path_buf(),
        health,
        validation,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    use sessionkit_core::{BuiltinDevice, ClipDraft, Device, Document, DraftNote, TrackKind, encode};

    /// A small two-track project with a playable bass clip
    pub fn project() -> Document {
        let mut doc = Document::empty();
        doc.set_tempo(124.0).unwrap();
        let bass = doc.add_track(TrackKind::Midi, "Bass").unwrap();
        let synth = Device::new(doc.allocate_id(), BuiltinDevice::Operator);
        doc.track_mut(bass).unwrap().devices.push(synth);
        let notes = (0..4).map(|i| DraftNote {
            pitch: 36,
            time: i as f64,
            duration: 0.5,
            velocity: 90 + i as u8 * 5,
        });
        doc.insert_clip(bass, ClipDraft::new("Riff", 0.0, 4.0).with_notes(notes))
            .unwrap();
        doc.add_track(TrackKind::Audio, "Vox").unwrap();
        doc
    }

    pub fn write(dir: &Path, name: &str, doc: &Document) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, encode(doc).unwrap()).unwrap();
        path
    }
}
