//! Arrangement clips and their MIDI content

use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::xml::Element;

/// Ticks per beat used when comparing note content
const FINGERPRINT_PPQ: f64 = 960.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Midi,
    Audio,
}

impl ClipKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Midi => "MidiClip",
            Self::Audio => "AudioClip",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "MidiClip" => Some(Self::Midi),
            "AudioClip" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// A single note inside a key track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    /// Position in beats relative to the clip start
    pub time: f64,
    /// Duration in beats
    pub duration: f64,
    /// Velocity (0-127)
    pub velocity: f64,
    pub enabled: bool,
    /// Attributes the model does not interpret (note IDs, off-velocity, ...)
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
}

impl NoteEvent {
    pub fn new(time: f64, duration: f64, velocity: f64) -> Self {
        Self {
            time,
            duration,
            velocity,
            enabled: true,
            extra_attrs: Vec::new(),
        }
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// All notes of one pitch in a clip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyTrack {
    pub id: Id,
    /// MIDI note number (0-127, 60 = middle C)
    pub pitch: u8,
    /// Notes sorted by time
    pub notes: Vec<NoteEvent>,
    /// Attributes of the `Notes` wrapper
    #[serde(skip)]
    pub notes_attrs: Vec<(String, String)>,
    /// Unmodeled children of the `Notes` wrapper
    #[serde(skip)]
    pub notes_extra: Vec<Element>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl KeyTrack {
    pub fn new(id: Id, pitch: u8) -> Self {
        Self {
            id,
            pitch,
            notes: Vec::new(),
            notes_attrs: Vec::new(),
            notes_extra: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Add a note, keeping notes sorted by time
    pub fn add_note(&mut self, note: NoteEvent) {
        let idx = self
            .notes
            .iter()
            .position(|n| n.time > note.time)
            .unwrap_or(self.notes.len());
        self.notes.insert(idx, note);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopRegion {
    pub id: Option<Id>,
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSignature {
    pub id: Option<Id>,
    pub numerator: u8,
    pub denominator: u8,
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl TimeSignature {
    pub fn new(id: Option<Id>, numerator: u8, denominator: u8) -> Self {
        Self {
            id,
            numerator,
            denominator,
            extra_attrs: Vec::new(),
            extra: Vec::new(),
        }
    }
}

/// A time-bounded region on a track's arrangement timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    pub id: Id,
    pub kind: ClipKind,
    /// Arrangement start in beats
    pub start: f64,
    /// The `Time` attribute; equals `start` unless the file says otherwise
    pub time: f64,
    /// Arrangement end in beats
    pub end: f64,
    pub name: String,
    pub color: Option<i32>,
    #[serde(rename = "loop")]
    pub loop_region: Option<LoopRegion>,
    pub time_signature: Option<TimeSignature>,
    /// One per pitch (MIDI clips only)
    pub key_tracks: Vec<KeyTrack>,
    /// Attributes of the `Notes` wrapper
    #[serde(skip)]
    pub notes_attrs: Vec<(String, String)>,
    /// Attributes of the `KeyTracks` wrapper
    #[serde(skip)]
    pub key_tracks_attrs: Vec<(String, String)>,
    /// Unmodeled children of `Notes`
    #[serde(skip)]
    pub notes_extra: Vec<Element>,
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Clip {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn note_count(&self) -> usize {
        self.key_tracks.iter().map(|k| k.notes.len()).sum()
    }

    /// Enabled notes with their pitch
    pub fn enabled_notes(&self) -> impl Iterator<Item = (u8, &NoteEvent)> {
        self.key_tracks
            .iter()
            .flat_map(|k| k.notes.iter().map(move |n| (k.pitch, n)))
            .filter(|(_, n)| n.enabled)
    }

    /// True for MIDI clips that would play nothing
    pub fn is_silent(&self) -> bool {
        self.kind == ClipKind::Midi && self.enabled_notes().next().is_none()
    }

    /// Sorted, tick-quantized view of the enabled notes, for content comparison
    pub fn fingerprint(&self) -> Vec<(u8, i64, i64, i64)> {
        let ticks = |beats: f64| (beats * FINGERPRINT_PPQ).round() as i64;
        let mut keys: Vec<_> = self
            .enabled_notes()
            .map(|(pitch, n)| (pitch, ticks(n.time), ticks(n.duration), n.velocity.round() as i64))
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// A note in a clip about to be inserted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DraftNote {
    pub pitch: u8,
    /// Beats relative to the clip start
    pub time: f64,
    pub duration: f64,
    pub velocity: u8,
}

/// Everything needed to insert a MIDI clip; IDs are assigned on insertion
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDraft {
    pub name: String,
    pub start: f64,
    pub end: f64,
    pub color: Option<i32>,
    pub looped: bool,
    pub time_signature: (u8, u8),
    pub notes: Vec<DraftNote>,
}

impl ClipDraft {
    pub fn new(name: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            color: None,
            looped: true,
            time_signature: (4, 4),
            notes: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = DraftNote>) -> Self {
        self.notes.extend(notes);
        self
    }

    /// Distinct pitches in ascending order
    pub fn pitches(&self) -> Vec<u8> {
        let mut pitches: Vec<u8> = self.notes.iter().map(|n| n.pitch).collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    pub fn check(&self) -> Result<(), String> {
        if !self.start.is_finite() || !self.end.is_finite() || self.start < 0.0 {
            return Err(format!("clip {:?} has invalid bounds", self.name));
        }
        if self.end <= self.start {
            return Err(format!(
                "clip {:?} ends at {} before it starts at {}",
                self.name, self.end, self.start
            ));
        }
        let length = self.end - self.start;
        for note in &self.notes {
            if note.pitch > 127 {
                return Err(format!("pitch {} out of range", note.pitch));
            }
            if note.velocity == 0 || note.velocity > 127 {
                return Err(format!("velocity {} out of range", note.velocity));
            }
            let placed = note.time >= 0.0 && note.time < length;
            if !placed || !note.duration.is_finite() || note.duration <= 0.0 {
                return Err(format!(
                    "note at {} (duration {}) outside clip {:?} of length {}",
                    note.time, note.duration, self.name, length
                ));
            }
        }
        Ok(())
    }
}
