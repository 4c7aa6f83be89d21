//! Structural comparison of two versions of a project

use std::collections::HashMap;

use serde::Serialize;

use crate::clip::Clip;
use crate::device::{Device, ParamValue};
use crate::document::Document;
use crate::health::{self, HealthPolicy};
use crate::track::{Track, TrackKind};

/// Score changes within this many points count as noise
pub const HEALTH_DEADBAND: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackRef {
    pub kind: TrackKind,
    pub name: String,
}

impl TrackRef {
    fn of(track: &Track) -> Self {
        Self {
            kind: track.kind,
            name: track.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum DeviceChange {
    Added {
        device: String,
        position: usize,
    },
    Removed {
        device: String,
        position: usize,
    },
    Reordered {
        device: String,
        from: usize,
        to: usize,
    },
    Toggled {
        device: String,
        enabled: bool,
    },
    ParameterChanged {
        device: String,
        parameter: String,
        old: Option<ParamValue>,
        new: Option<ParamValue>,
    },
}

/// Clip-level summary; individual notes are not compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipSummary {
    pub old_clips: usize,
    pub new_clips: usize,
    pub old_notes: usize,
    pub new_notes: usize,
    /// Clips in the new version with no identical clip in the old one
    pub added: usize,
    /// Clips in the old version with no identical clip in the new one
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixerChange {
    pub parameter: String,
    pub old: ParamValue,
    pub new: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDiff {
    pub kind: TrackKind,
    pub name: String,
    pub devices: Vec<DeviceChange>,
    pub mixer: Vec<MixerChange>,
    pub clips: Option<ClipSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Improvement,
    Regression,
    Neutral,
}

impl Verdict {
    pub fn from_delta(delta: i32) -> Self {
        if delta > HEALTH_DEADBAND {
            Self::Improvement
        } else if delta < -HEALTH_DEADBAND {
            Self::Regression
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempoChange {
    pub old: Option<f64>,
    pub new: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    pub tracks_added: Vec<TrackRef>,
    pub tracks_removed: Vec<TrackRef>,
    pub tracks_changed: Vec<TrackDiff>,
    pub tempo: Option<TempoChange>,
    pub locators_added: Vec<String>,
    pub locators_removed: Vec<String>,
    pub old_score: u32,
    pub new_score: u32,
    pub health_delta: i32,
    pub verdict: Verdict,
}

impl DiffReport {
    /// True when no structural change was found
    pub fn is_empty(&self) -> bool {
        self.tracks_added.is_empty()
            && self.tracks_removed.is_empty()
            && self.tracks_changed.is_empty()
            && self.tempo.is_none()
            && self.locators_added.is_empty()
            && self.locators_removed.is_empty()
    }

    /// Total number of device-level changes across all tracks
    pub fn device_change_count(&self) -> usize {
        self.tracks_changed.iter().map(|t| t.devices.len()).sum()
    }
}

pub fn diff(old: &Document, new: &Document) -> DiffReport {
    diff_with(old, new, &HealthPolicy::default())
}

pub fn diff_with(old: &Document, new: &Document, policy: &HealthPolicy) -> DiffReport {
    let (pairs, removed, added) = match_tracks(old, new);

    let tracks_changed = pairs
        .into_iter()
        .filter_map(|(a, b)| {
            let change = TrackDiff {
                kind: b.kind,
                name: b.name.clone(),
                devices: diff_devices(&a.devices, &b.devices),
                mixer: diff_mixer(a, b),
                clips: diff_clips(a.clips(), b.clips()),
            };
            let changed = !change.devices.is_empty() || !change.mixer.is_empty() || change.clips.is_some();
            changed.then_some(change)
        })
        .collect();

    let tempo = (old.tempo() != new.tempo()).then(|| TempoChange {
        old: old.tempo(),
        new: new.tempo(),
    });

    let old_names: Vec<&str> = old.locators().iter().map(|l| l.name.as_str()).collect();
    let new_names: Vec<&str> = new.locators().iter().map(|l| l.name.as_str()).collect();

    let old_score = health::analyze_with(old, policy).score;
    let new_score = health::analyze_with(new, policy).score;
    let health_delta = new_score as i32 - old_score as i32;

    let report = DiffReport {
        tracks_added: added.into_iter().map(TrackRef::of).collect(),
        tracks_removed: removed.into_iter().map(TrackRef::of).collect(),
        tracks_changed,
        tempo,
        locators_added: multiset_minus(&new_names, &old_names),
        locators_removed: multiset_minus(&old_names, &new_names),
        old_score,
        new_score,
        health_delta,
        verdict: Verdict::from_delta(health_delta),
    };
    tracing::debug!(
        added = report.tracks_added.len(),
        removed = report.tracks_removed.len(),
        changed = report.tracks_changed.len(),
        health_delta,
        "Diffed projects"
    );
    report
}

type TrackMatch<'a> = (Vec<(&'a Track, &'a Track)>, Vec<&'a Track>, Vec<&'a Track>);

/// Pair tracks by kind and case-insensitive name; the k-th duplicate pairs with the k-th
fn match_tracks<'a>(old: &'a Document, new: &'a Document) -> TrackMatch<'a> {
    let mut pending: HashMap<(TrackKind, String), Vec<(usize, &'a Track)>> = HashMap::new();
    for (i, track) in old.all_tracks().enumerate() {
        pending
            .entry((track.kind, track.name.to_lowercase()))
            .or_default()
            .push((i, track));
    }
    // Reverse so `pop` yields old tracks in document order
    for tracks in pending.values_mut() {
        tracks.reverse();
    }

    let mut pairs = Vec::new();
    let mut added = Vec::new();
    for track in new.all_tracks() {
        let key = (track.kind, track.name.to_lowercase());
        match pending.get_mut(&key).and_then(Vec::pop) {
            Some((_, old_track)) => pairs.push((old_track, track)),
            None => added.push(track),
        }
    }

    // Leftovers by position, so tracks sharing an id are still told apart
    let mut leftover: Vec<(usize, &'a Track)> = pending.into_values().flatten().collect();
    leftover.sort_by_key(|(i, _)| *i);
    let removed = leftover.into_iter().map(|(_, track)| track).collect();
    (pairs, removed, added)
}

/// Devices keyed by label plus occurrence, e.g. the second "Compressor"
fn occurrence_keys(devices: &[Device]) -> Vec<(String, usize)> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    devices
        .iter()
        .map(|d| {
            let label = d.label();
            let count = seen.entry(label.clone()).or_default();
            *count += 1;
            (label, *count)
        })
        .collect()
}

fn diff_devices(old: &[Device], new: &[Device]) -> Vec<DeviceChange> {
    let old_keys = occurrence_keys(old);
    let new_keys = occurrence_keys(new);
    let mut changes = Vec::new();

    for (pos, key) in old_keys.iter().enumerate() {
        if !new_keys.contains(key) {
            changes.push(DeviceChange::Removed {
                device: key.0.clone(),
                position: pos,
            });
        }
    }
    for (pos, key) in new_keys.iter().enumerate() {
        if !old_keys.contains(key) {
            changes.push(DeviceChange::Added {
                device: key.0.clone(),
                position: pos,
            });
        }
    }

    // Matched devices as (old position, new position), in old chain order
    let matched: Vec<(usize, usize)> = old_keys
        .iter()
        .enumerate()
        .filter_map(|(i, key)| new_keys.iter().position(|k| k == key).map(|j| (i, j)))
        .collect();
    let mut by_new: Vec<usize> = matched.iter().map(|&(_, j)| j).collect();
    by_new.sort_unstable();

    for (rank, &(i, j)) in matched.iter().enumerate() {
        let (a, b) = (&old[i], &new[j]);
        let label = old_keys[i].0.clone();
        if by_new[rank] != j {
            changes.push(DeviceChange::Reordered {
                device: label.clone(),
                from: i,
                to: j,
            });
        }
        if a.enabled != b.enabled {
            changes.push(DeviceChange::Toggled {
                device: label.clone(),
                enabled: b.enabled,
            });
        }
        for param in &a.parameters {
            let new_value = b.parameter(&param.name).map(|p| p.value);
            if new_value != Some(param.value) {
                changes.push(DeviceChange::ParameterChanged {
                    device: label.clone(),
                    parameter: param.name.clone(),
                    old: Some(param.value),
                    new: new_value,
                });
            }
        }
        for param in b.parameters.iter().filter(|p| a.parameter(&p.name).is_none()) {
            changes.push(DeviceChange::ParameterChanged {
                device: label.clone(),
                parameter: param.name.clone(),
                old: None,
                new: Some(param.value),
            });
        }
    }
    changes
}

fn diff_mixer(old: &Track, new: &Track) -> Vec<MixerChange> {
    [
        ("volume", &old.mixer.volume, &new.mixer.volume),
        ("pan", &old.mixer.pan, &new.mixer.pan),
    ]
    .into_iter()
    .filter(|(_, a, b)| a.value != b.value)
    .map(|(name, a, b)| MixerChange {
        parameter: name.to_string(),
        old: a.value,
        new: b.value,
    })
    .collect()
}

fn same_clip(a: &Clip, b: &Clip) -> bool {
    a.kind == b.kind
        && a.start == b.start
        && a.end == b.end
        && a.name == b.name
        && a.fingerprint() == b.fingerprint()
}

fn diff_clips(old: &[Clip], new: &[Clip]) -> Option<ClipSummary> {
    let mut unmatched: Vec<&Clip> = old.iter().collect();
    let mut added = 0;
    for clip in new {
        match unmatched.iter().position(|c| same_clip(c, clip)) {
            Some(pos) => {
                unmatched.remove(pos);
            }
            None => added += 1,
        }
    }
    let summary = ClipSummary {
        old_clips: old.len(),
        new_clips: new.len(),
        old_notes: old.iter().map(Clip::note_count).sum(),
        new_notes: new.iter().map(Clip::note_count).sum(),
        added,
        removed: unmatched.len(),
    };
    (summary.added > 0 || summary.removed > 0).then_some(summary)
}

/// Elements of `a` not matched one-for-one in `b`, in `a` order
fn multiset_minus(a: &[&str], b: &[&str]) -> Vec<String> {
    let mut remaining: Vec<&str> = b.to_vec();
    a.iter()
        .filter(|name| match remaining.iter().position(|r| r == *name) {
            Some(pos) => {
                remaining.remove(pos);
                false
            }
            None => true,
        })
        .map(|name| name.to_string())
        .collect()
}
