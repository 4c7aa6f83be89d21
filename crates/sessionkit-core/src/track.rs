//! Track representation

use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::device::{Device, ParamValue, Parameter};
use crate::ids::Id;
use crate::xml::Element;

/// Element names leading from a track's outer `DeviceChain` to its arrangement clips
pub const CLIP_PATH: [&str; 4] = ["MainSequencer", "ClipTimeable", "ArrangerAutomation", "Events"];

/// Track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Midi,
    Audio,
    Return,
    Group,
    Master,
}

impl TrackKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Midi => "MidiTrack",
            Self::Audio => "AudioTrack",
            Self::Return => "ReturnTrack",
            Self::Group => "GroupTrack",
            Self::Master => "MasterTrack",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "MidiTrack" => Some(Self::Midi),
            "AudioTrack" => Some(Self::Audio),
            "ReturnTrack" => Some(Self::Return),
            "GroupTrack" => Some(Self::Group),
            "MasterTrack" => Some(Self::Master),
            _ => None,
        }
    }

    /// Tracks that own arrangement clips
    pub fn has_clips(self) -> bool {
        matches!(self, Self::Midi | Self::Audio)
    }

    /// Tracks that must carry one send per return track
    pub fn has_sends(self) -> bool {
        !matches!(self, Self::Return | Self::Master)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Midi => "MIDI",
            Self::Audio => "Audio",
            Self::Return => "Return",
            Self::Group => "Group",
            Self::Master => "Master",
        };
        f.write_str(label)
    }
}

/// A send from a track to a return track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixerSend {
    /// `PointeeId` of the return track
    pub return_track: Id,
    pub level: Parameter,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl MixerSend {
    pub fn new(return_track: Id, level: f64) -> Self {
        Self {
            return_track,
            level: Parameter::new("Send", ParamValue::Number(level)),
            extra: Vec::new(),
        }
    }
}

/// Volume, pan, sends and (on the master track) tempo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mixer {
    pub volume: Parameter,
    pub pan: Parameter,
    pub sends: Vec<MixerSend>,
    pub tempo: Option<Parameter>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            volume: Parameter::new("Volume", ParamValue::Number(1.0)),
            pan: Parameter::new("Pan", ParamValue::Number(0.0)),
            sends: Vec::new(),
            tempo: None,
            extra: Vec::new(),
        }
    }
}

/// Arrangement clips at the fixed `MainSequencer` path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipTimeline {
    pub clips: Vec<Clip>,
    /// The elements along `CLIP_PATH` minus the next path step (and minus
    /// the clips, for `Events`)
    #[serde(skip)]
    pub shells: [Element; 4],
}

impl Default for ClipTimeline {
    fn default() -> Self {
        Self {
            clips: Vec::new(),
            shells: CLIP_PATH.map(Element::new),
        }
    }
}

/// A track in the project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: Id,
    pub kind: TrackKind,
    /// Effective (displayed) name
    pub name: String,
    pub user_name: Option<String>,
    pub color: Option<i32>,
    pub devices: Vec<Device>,
    pub mixer: Mixer,
    /// `None` when the track lacks the clip path (Midi/Audio) or has none (Return/Master)
    #[serde(skip)]
    pub clip_timeline: Option<ClipTimeline>,
    /// Attributes of the `Name` wrapper
    #[serde(skip)]
    pub name_attrs: Vec<(String, String)>,
    #[serde(skip)]
    pub name_extra: Vec<Element>,
    /// Unmodeled children of the outer `DeviceChain`
    #[serde(skip)]
    pub chain_extra: Vec<Element>,
    /// Unmodeled children of the inner `DeviceChain`
    #[serde(skip)]
    pub devices_extra: Vec<Element>,
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Track {
    pub fn new(id: Id, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            user_name: None,
            color: None,
            devices: Vec::new(),
            mixer: Mixer::default(),
            clip_timeline: kind.has_clips().then(ClipTimeline::default),
            name_attrs: Vec::new(),
            name_extra: Vec::new(),
            chain_extra: Vec::new(),
            devices_extra: Vec::new(),
            extra_attrs: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn clips(&self) -> &[Clip] {
        self.clip_timeline
            .as_ref()
            .map(|t| t.clips.as_slice())
            .unwrap_or(&[])
    }

    pub fn note_count(&self) -> usize {
        self.clips().iter().map(Clip::note_count).sum()
    }

    pub fn disabled_device_count(&self) -> usize {
        self.devices.iter().filter(|d| !d.enabled).count()
    }

    /// Case-insensitive name comparison
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_clip_timeline_by_kind() {
        assert!(Track::new(Id(1), TrackKind::Midi, "a").clip_timeline.is_some());
        assert!(Track::new(Id(2), TrackKind::Return, "b").clip_timeline.is_none());
    }

    #[test]
    fn test_send_rules_by_kind() {
        assert!(TrackKind::Midi.has_sends());
        assert!(TrackKind::Group.has_sends());
        assert!(!TrackKind::Return.has_sends());
        assert!(!TrackKind::Master.has_sends());
    }

    #[test]
    fn test_name_matches_ignores_case() {
        let track = Track::new(Id(1), TrackKind::Midi, "Lead Synth");
        assert!(track.name_matches("lead synth"));
        assert!(!track.name_matches("lead"));
    }
}
