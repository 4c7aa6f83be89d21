//! Rules over arrangement clips, their notes, and track content

use super::{HealthPolicy, Issue, IssueSeverity, Rule};
use crate::clip::{Clip, ClipKind};
use crate::document::Document;
use crate::track::{Track, TrackKind};

/// Notes closer than this are treated as touching, not overlapping
const NOTE_EPSILON: f64 = 1e-6;

fn clip_tracks(doc: &Document) -> impl Iterator<Item = &Track> {
    doc.tracks().iter().filter(|t| t.kind.has_clips())
}

fn midi_clips(track: &Track) -> impl Iterator<Item = &Clip> {
    track.clips().iter().filter(|c| c.kind == ClipKind::Midi)
}

pub(super) fn empty_clips(doc: &Document, _policy: &HealthPolicy) -> Vec<Issue> {
    clip_tracks(doc)
        .flat_map(|track| {
            midi_clips(track).filter(|c| c.is_silent()).map(move |clip| {
                Issue::on_track(
                    Rule::EmptyClip,
                    IssueSeverity::Warning,
                    track,
                    format!("Clip {:?} at beat {} has no notes", clip.name, clip.start),
                    "Delete the clip or write notes into it",
                )
            })
        })
        .collect()
}

pub(super) fn short_clips(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let min = policy.thresholds.short_clip_beats;
    clip_tracks(doc)
        .flat_map(|track| {
            track.clips().iter().filter(move |c| c.length() < min).map(move |clip| {
                Issue::on_track(
                    Rule::ShortClip,
                    IssueSeverity::Info,
                    track,
                    format!(
                        "Clip {:?} at beat {} is only {} beat(s) long",
                        clip.name,
                        clip.start,
                        clip.length()
                    ),
                    "Extend or consolidate the clip",
                )
            })
        })
        .collect()
}

pub(super) fn duplicate_clips(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let window = policy.thresholds.duplicate_window_beats;
    let mut issues = Vec::new();
    for track in clip_tracks(doc) {
        let clips: Vec<(&Clip, Vec<(u8, i64, i64, i64)>)> = midi_clips(track)
            .map(|c| (c, c.fingerprint()))
            .filter(|(_, print)| !print.is_empty())
            .collect();
        for (i, (a, print_a)) in clips.iter().enumerate() {
            for (b, print_b) in &clips[i + 1..] {
                if (a.start - b.start).abs() <= window && print_a == print_b {
                    issues.push(Issue::on_track(
                        Rule::DuplicateClip,
                        IssueSeverity::Warning,
                        track,
                        format!(
                            "Clips {:?} and {:?} near beat {} play identical notes",
                            a.name, b.name, a.start
                        ),
                        "Delete one of the stacked copies",
                    ));
                }
            }
        }
    }
    issues
}

pub(super) fn overlapping_notes(doc: &Document, _policy: &HealthPolicy) -> Vec<Issue> {
    let mut issues = Vec::new();
    for track in clip_tracks(doc) {
        for clip in midi_clips(track) {
            let overlaps: usize = clip
                .key_tracks
                .iter()
                .map(|key| {
                    let mut notes: Vec<_> = key.notes.iter().filter(|n| n.enabled).collect();
                    notes.sort_by(|a, b| a.time.total_cmp(&b.time));
                    notes
                        .windows(2)
                        .filter(|pair| pair[1].time < pair[0].end() - NOTE_EPSILON)
                        .count()
                })
                .sum();
            if overlaps > 0 {
                issues.push(Issue::on_track(
                    Rule::OverlappingNotes,
                    IssueSeverity::Info,
                    track,
                    format!("Clip {:?} has {overlaps} overlapping note(s) on the same pitch", clip.name),
                    "Trim or legato the overlapping notes",
                ));
            }
        }
    }
    issues
}

pub(super) fn flat_velocity(doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
    let min_notes = policy.thresholds.flat_velocity_min_notes;
    let mut issues = Vec::new();
    for track in clip_tracks(doc) {
        for clip in midi_clips(track) {
            let velocities: Vec<f64> = clip.enabled_notes().map(|(_, n)| n.velocity).collect();
            let Some(&first) = velocities.first() else {
                continue;
            };
            if velocities.len() >= min_notes && velocities.iter().all(|&v| v == first) {
                issues.push(Issue::on_track(
                    Rule::FlatVelocity,
                    IssueSeverity::Info,
                    track,
                    format!(
                        "All {} notes in clip {:?} have velocity {first}",
                        velocities.len(),
                        clip.name
                    ),
                    "Vary velocities to add dynamics",
                ));
            }
        }
    }
    issues
}

pub(super) fn missing_instrument(doc: &Document, _policy: &HealthPolicy) -> Vec<Issue> {
    doc.tracks()
        .iter()
        .filter(|t| t.kind == TrackKind::Midi && !t.clips().is_empty() && t.devices.is_empty())
        .map(|track| {
            Issue::on_track(
                Rule::MissingInstrument,
                IssueSeverity::Critical,
                track,
                format!("MIDI track with {} clip(s) has no instrument", track.clips().len()),
                "Load an instrument on the track",
            )
        })
        .collect()
}

pub(super) fn empty_tracks(doc: &Document, _policy: &HealthPolicy) -> Vec<Issue> {
    clip_tracks(doc)
        .filter(|t| t.clips().is_empty() && t.devices.is_empty())
        .map(|track| {
            Issue::on_track(
                Rule::EmptyTrack,
                IssueSeverity::Info,
                track,
                format!("{} track has no clips and no devices", track.kind),
                "Delete the track",
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipDraft, DraftNote};
    use crate::device::{BuiltinDevice, Device};
    use crate::ids::Id;

    fn note(pitch: u8, time: f64, duration: f64, velocity: u8) -> DraftNote {
        DraftNote { pitch, time, duration, velocity }
    }

    fn midi_track(doc: &mut Document, name: &str) -> Id {
        let id = doc.add_track(TrackKind::Midi, name).unwrap();
        let synth = Device::new(doc.allocate_id(), BuiltinDevice::Wavetable);
        doc.track_mut(id).unwrap().devices.push(synth);
        id
    }

    #[test]
    fn test_empty_and_short_clips() {
        let policy = HealthPolicy::default();
        let mut doc = Document::empty();
        let id = midi_track(&mut doc, "Keys");
        doc.insert_clip(id, ClipDraft::new("Blank", 0.0, 4.0)).unwrap();
        doc.insert_clip(id, ClipDraft::new("Blip", 8.0, 8.5).with_notes([note(60, 0.0, 0.25, 90)]))
            .unwrap();

        let empty = empty_clips(&doc, &policy);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].description, "Clip \"Blank\" at beat 0 has no notes");

        let short = short_clips(&doc, &policy);
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].description, "Clip \"Blip\" at beat 8 is only 0.5 beat(s) long");
    }

    #[test]
    fn test_duplicate_clips_within_window() {
        let policy = HealthPolicy::default();
        let mut doc = Document::empty();
        let id = midi_track(&mut doc, "Keys");
        let notes = [note(60, 0.0, 1.0, 100), note(64, 1.0, 1.0, 100)];
        doc.insert_clip(id, ClipDraft::new("A", 16.0, 20.0).with_notes(notes)).unwrap();
        doc.insert_clip(id, ClipDraft::new("B", 16.25, 20.0).with_notes(notes)).unwrap();
        doc.insert_clip(id, ClipDraft::new("C", 32.0, 36.0).with_notes(notes)).unwrap();
        let issues = duplicate_clips(&doc, &policy);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].description.contains("\"A\" and \"B\""));
    }

    #[test]
    fn test_overlapping_notes_same_pitch_only() {
        let policy = HealthPolicy::default();
        let mut doc = Document::empty();
        let id = midi_track(&mut doc, "Keys");
        let notes = [
            note(60, 0.0, 2.0, 100),
            note(60, 1.0, 1.0, 100),
            note(64, 0.5, 2.0, 100),
            note(60, 2.0, 1.0, 100),
        ];
        doc.insert_clip(id, ClipDraft::new("Pad", 0.0, 4.0).with_notes(notes)).unwrap();
        let issues = overlapping_notes(&doc, &policy);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].description.contains("1 overlapping"));
    }

    #[test]
    fn test_flat_velocity_needs_enough_notes() {
        let policy = HealthPolicy::default();
        let mut doc = Document::empty();
        let id = midi_track(&mut doc, "Hats");
        let eight = (0..8).map(|i| note(42, f64::from(i) * 0.5, 0.25, 100));
        doc.insert_clip(id, ClipDraft::new("Hats", 0.0, 4.0).with_notes(eight)).unwrap();
        let seven = (0..7).map(|i| note(42, f64::from(i) * 0.5, 0.25, 100));
        doc.insert_clip(id, ClipDraft::new("Short Hats", 8.0, 12.0).with_notes(seven)).unwrap();

        let issues = flat_velocity(&doc, &policy);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].description, "All 8 notes in clip \"Hats\" have velocity 100");
    }

    #[test]
    fn test_track_level_rules() {
        let policy = HealthPolicy::default();
        let mut doc = Document::empty();
        let bare = doc.add_track(TrackKind::Midi, "Bare").unwrap();
        doc.insert_clip(bare, ClipDraft::new("Riff", 0.0, 4.0).with_notes([note(40, 0.0, 1.0, 90)]))
            .unwrap();
        doc.add_track(TrackKind::Audio, "Unused").unwrap();
        doc.add_track(TrackKind::Return, "A-Reverb").unwrap();

        let missing = missing_instrument(&doc, &policy);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].affected_track.as_deref(), Some("Bare"));
        assert_eq!(missing[0].severity, IssueSeverity::Critical);

        let empty = empty_tracks(&doc, &policy);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].affected_track.as_deref(), Some("Unused"));
    }
}
