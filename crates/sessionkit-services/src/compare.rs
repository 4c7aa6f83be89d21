//! Two-file comparison

use std::path::Path;

use sessionkit_core::{DiffReport, HealthPolicy, diff_with};
use tracing::info;

use crate::diagnose::read_document;
use crate::error::Result;

/// Diff `old` against `new`, scoring both with `policy`
pub fn compare(old: &Path, new: &Path, policy: &HealthPolicy) -> Result<DiffReport> {
    let before = read_document(old)?;
    let after = read_document(new)?;
    let report = diff_with(&before, &after, policy);
    info!(
        old = %old.display(),
        new = %new.display(),
        changed_tracks = report.tracks_changed.len(),
        health_delta = report.health_delta,
        "Compared projects"
    );
    Ok(report)
}
