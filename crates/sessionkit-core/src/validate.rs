//! Structural validation: the invariants a host application relies on to load a project

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::document::Document;

/// How bad a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The host application would refuse or corrupt the file
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    DuplicateId,
    UnresolvedReference,
    IncompatibleReference,
    SendReturnParity,
    NextIdBound,
    OrphanedClipPath,
    DuplicateTrackName,
}

impl FindingKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::OrphanedClipPath | Self::DuplicateTrackName => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A single violated invariant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub message: String,
    /// Name of the track the finding is about, when there is one
    pub track: Option<String>,
}

impl Finding {
    fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            track: None,
        }
    }

    fn on_track(mut self, name: &str) -> Self {
        self.track = Some(name.to_string());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// No error-severity findings
    pub fn is_loadable(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }
}

/// Check every structural invariant. Never fails; problems become findings.
pub fn validate(doc: &Document) -> ValidationReport {
    let mut findings = Vec::new();
    let index = doc.id_index();

    for (id, nodes) in index.duplicates() {
        let owners: Vec<&str> = nodes.iter().map(|n| n.owner.as_str()).collect();
        findings.push(Finding::new(
            FindingKind::DuplicateId,
            format!("ID {id} is used {} times: {}", nodes.len(), owners.join(", ")),
        ));
    }

    for reference in index.references() {
        match index.get(reference.target) {
            None => findings.push(Finding::new(
                FindingKind::UnresolvedReference,
                format!("{} points at missing ID {}", reference.owner, reference.target),
            )),
            Some(node) if !reference.expected.accepts(&node.kind) => findings.push(Finding::new(
                FindingKind::IncompatibleReference,
                format!(
                    "{} points at {} which is not a return track",
                    reference.owner, node.owner
                ),
            )),
            Some(_) => {}
        }
    }

    let returns = doc.return_tracks().count();
    for track in doc.tracks().iter().filter(|t| t.kind.has_sends()) {
        let sends = track.mixer.sends.len();
        if sends != returns {
            findings.push(
                Finding::new(
                    FindingKind::SendReturnParity,
                    format!(
                        "Track {:?} has {sends} send(s) but the project has {returns} return track(s)",
                        track.name
                    ),
                )
                .on_track(&track.name),
            );
        }
    }

    if let Some(max) = index.max_id() {
        if doc.next_id() <= max.0 {
            findings.push(Finding::new(
                FindingKind::NextIdBound,
                format!("NextPointeeId {} is not above the highest used ID {max}", doc.next_id()),
            ));
        }
    }

    for track in doc.tracks() {
        if track.kind.has_clips() && track.clip_timeline.is_none() {
            findings.push(
                Finding::new(
                    FindingKind::OrphanedClipPath,
                    format!("{} track {:?} has no arrangement clip path", track.kind, track.name),
                )
                .on_track(&track.name),
            );
        }
    }

    let mut by_name: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for track in doc.tracks() {
        by_name
            .entry(track.name.to_lowercase())
            .or_default()
            .push(track.name.as_str());
    }
    for tracks in by_name.values().filter(|t| t.len() > 1) {
        let name = tracks[0];
        findings.push(
            Finding::new(
                FindingKind::DuplicateTrackName,
                format!("{} tracks are named {name:?}; lookups by name use the first", tracks.len()),
            )
            .on_track(name),
        );
    }

    tracing::debug!(
        findings = findings.len(),
        ids = index.len(),
        references = index.references().len(),
        "Validated project"
    );
    ValidationReport { findings }
}
