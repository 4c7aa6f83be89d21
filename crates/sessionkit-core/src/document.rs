//! The project document: tracks, master, locators and the ID space

use serde::Serialize;

use crate::clip::{Clip, ClipDraft, ClipKind, KeyTrack, LoopRegion, NoteEvent, TimeSignature};
use crate::device::{ParamValue, Parameter};
use crate::error::ModelError;
use crate::ids::{Id, IdAllocator, IdIndex, NodeKind, RefKind};
use crate::locator::Locator;
use crate::track::{MixerSend, Track, TrackKind};
use crate::xml::Element;

/// Format major versions this engine understands
pub const SUPPORTED_MAJOR_VERSIONS: &[&str] = &["5"];

/// Accepted tempo range in BPM
pub const TEMPO_RANGE: std::ops::RangeInclusive<f64> = 20.0..=999.0;

/// Root attributes identifying the file format revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatVersion {
    pub major: String,
    pub minor: String,
    pub creator: Option<String>,
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self {
            major: "5".into(),
            minor: "11.0_11300".into(),
            creator: Some(format!("sessionkit {}", env!("CARGO_PKG_VERSION"))),
            extra_attrs: Vec::new(),
        }
    }
}

/// A parsed or generated project
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub(crate) version: FormatVersion,
    pub(crate) ids: IdAllocator,
    pub(crate) tracks: Vec<Track>,
    pub(crate) master: Track,
    pub(crate) locators: Vec<Locator>,
    /// Attributes of the `LiveSet` element
    pub(crate) live_set_attrs: Vec<(String, String)>,
    /// Attributes of the inner `Locators` list
    pub(crate) locator_list_attrs: Vec<(String, String)>,
    /// Unmodeled children of `Locators`
    pub(crate) locators_extra: Vec<Element>,
    /// Unmodeled children of `LiveSet`
    pub(crate) extra: Vec<Element>,
    /// Unmodeled children of the root element
    pub(crate) root_extra: Vec<Element>,
}

impl Document {
    /// An empty project holding only a master track at 120 BPM
    pub fn empty() -> Self {
        let mut ids = IdAllocator::new(1);
        let mut master = Track::new(ids.allocate(), TrackKind::Master, "Master");
        master.mixer.tempo = Some(Parameter::new("Tempo", ParamValue::Number(120.0)));
        Self {
            version: FormatVersion::default(),
            ids,
            tracks: Vec::new(),
            master,
            locators: Vec::new(),
            live_set_attrs: Vec::new(),
            locator_list_attrs: Vec::new(),
            locators_extra: Vec::new(),
            extra: Vec::new(),
            root_extra: Vec::new(),
        }
    }

    pub fn version(&self) -> &FormatVersion {
        &self.version
    }

    /// The value the next allocated ID will take
    pub fn next_id(&self) -> u64 {
        self.ids.peek()
    }

    /// The only way new IDs come into existence
    pub fn allocate_id(&mut self) -> Id {
        self.ids.allocate()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn master(&self) -> &Track {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut Track {
        &mut self.master
    }

    pub fn locators(&self) -> &[Locator] {
        &self.locators
    }

    /// Regular tracks followed by the master track
    pub fn all_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().chain(std::iter::once(&self.master))
    }

    pub fn return_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Return)
    }

    pub fn track(&self, id: Id) -> Option<&Track> {
        self.all_tracks().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: Id) -> Option<&mut Track> {
        if self.master.id == id {
            return Some(&mut self.master);
        }
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    /// Case-insensitive exact name lookup; the first match wins
    pub fn find_track_by_name(&self, name: &str, kind: Option<TrackKind>) -> Option<&Track> {
        self.all_tracks()
            .filter(|t| kind.is_none_or(|k| t.kind == k))
            .find(|t| t.name_matches(name))
    }

    pub fn tempo(&self) -> Option<f64> {
        self.master.mixer.tempo.as_ref().map(|p| p.value.as_f64())
    }

    /// Add a track, keeping one send per return track on every track that needs them
    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> Result<Id, ModelError> {
        if kind == TrackKind::Master {
            return Err(ModelError::UnsupportedTrackKind(kind));
        }
        let id = self.allocate_id();
        let mut track = Track::new(id, kind, name);

        if kind == TrackKind::Return {
            for other in self.tracks.iter_mut().filter(|t| t.kind.has_sends()) {
                other.mixer.sends.push(MixerSend::new(id, 0.0));
            }
            self.tracks.push(track);
            return Ok(id);
        }

        let returns: Vec<Id> = self.return_tracks().map(|t| t.id).collect();
        track.mixer.sends = returns.into_iter().map(|r| MixerSend::new(r, 0.0)).collect();
        // Return tracks stay at the end of the list
        let pos = self
            .tracks
            .iter()
            .position(|t| t.kind == TrackKind::Return)
            .unwrap_or(self.tracks.len());
        self.tracks.insert(pos, track);
        Ok(id)
    }

    pub fn rename_track(&mut self, id: Id, name: impl Into<String>) -> Result<(), ModelError> {
        let track = self.track_mut(id).ok_or(ModelError::TrackNotFound(id))?;
        let name = name.into();
        if track.user_name.is_some() {
            track.user_name = Some(name.clone());
        }
        track.name = name;
        Ok(())
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), ModelError> {
        if !TEMPO_RANGE.contains(&bpm) {
            return Err(ModelError::InvalidTempo(bpm));
        }
        match &mut self.master.mixer.tempo {
            Some(tempo) => tempo.value = ParamValue::Number(bpm),
            None => {
                self.master.mixer.tempo = Some(Parameter::new("Tempo", ParamValue::Number(bpm)));
            }
        }
        Ok(())
    }

    /// Remove every arrangement clip from a track, returning how many were removed
    pub fn clear_clips(&mut self, track_id: Id) -> Result<usize, ModelError> {
        let track = self.track_mut(track_id).ok_or(ModelError::TrackNotFound(track_id))?;
        let name = track.name.clone();
        let timeline = track
            .clip_timeline
            .as_mut()
            .ok_or(ModelError::NoClipTimeline(name))?;
        let removed = timeline.clips.len();
        timeline.clips.clear();
        Ok(removed)
    }

    /// Insert a MIDI clip on a track's arrangement timeline.
    ///
    /// Allocates IDs for the clip, its loop region, its time signature and one
    /// key track per distinct pitch.
    pub fn insert_clip(&mut self, track_id: Id, draft: ClipDraft) -> Result<Id, ModelError> {
        draft.check().map_err(ModelError::InvalidClip)?;

        let idx = self
            .tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(ModelError::TrackNotFound(track_id))?;
        let track = &self.tracks[idx];
        if track.kind != TrackKind::Midi || track.clip_timeline.is_none() {
            return Err(ModelError::NoClipTimeline(track.name.clone()));
        }
        let color = draft.color.or(track.color);

        let clip_id = self.allocate_id();
        let loop_region = LoopRegion {
            id: Some(self.allocate_id()),
            start: 0.0,
            end: draft.end - draft.start,
            enabled: draft.looped,
            extra: Vec::new(),
        };
        let (numerator, denominator) = draft.time_signature;
        let time_signature = TimeSignature::new(Some(self.allocate_id()), numerator, denominator);
        let mut key_tracks: Vec<KeyTrack> = draft
            .pitches()
            .into_iter()
            .map(|pitch| KeyTrack::new(self.allocate_id(), pitch))
            .collect();
        for note in &draft.notes {
            if let Some(key) = key_tracks.iter_mut().find(|k| k.pitch == note.pitch) {
                key.add_note(NoteEvent::new(note.time, note.duration, f64::from(note.velocity)));
            }
        }

        let clip = Clip {
            id: clip_id,
            kind: ClipKind::Midi,
            start: draft.start,
            time: draft.start,
            end: draft.end,
            name: draft.name,
            color,
            loop_region: Some(loop_region),
            time_signature: Some(time_signature),
            key_tracks,
            notes_attrs: Vec::new(),
            key_tracks_attrs: Vec::new(),
            notes_extra: Vec::new(),
            extra_attrs: Vec::new(),
            extra: Vec::new(),
        };

        let track = &mut self.tracks[idx];
        let Some(timeline) = track.clip_timeline.as_mut() else {
            return Err(ModelError::NoClipTimeline(track.name.clone()));
        };
        let pos = timeline
            .clips
            .iter()
            .position(|c| c.start > clip.start)
            .unwrap_or(timeline.clips.len());
        timeline.clips.insert(pos, clip);
        Ok(clip_id)
    }

    /// Add a locator, keeping locators ordered by time
    pub fn add_locator(&mut self, time: f64, name: impl Into<String>) -> Id {
        let id = self.allocate_id();
        let pos = self
            .locators
            .iter()
            .position(|l| l.time > time)
            .unwrap_or(self.locators.len());
        self.locators.insert(pos, Locator::new(id, time, name));
        id
    }

    pub fn clear_locators(&mut self) {
        self.locators.clear();
    }

    /// Build the cross-reference index over every modeled and opaque element
    pub fn id_index(&self) -> IdIndex {
        let mut index = IdIndex::new();

        for track in self.all_tracks() {
            index_track(&mut index, track);
        }
        for locator in &self.locators {
            let owner = format!("locator {:?}", locator.name);
            index.insert(locator.id, NodeKind::Locator, owner.as_str());
            scan_all(&mut index, &locator.extra, &owner);
        }
        scan_all(&mut index, &self.locators_extra, "locators");
        scan_all(&mut index, &self.extra, "live set");
        scan_all(&mut index, &self.root_extra, "root");
        index
    }

    /// Highest ID in use anywhere in the document
    pub fn max_used_id(&self) -> Option<Id> {
        self.id_index().max_id()
    }
}

fn scan_all(index: &mut IdIndex, elements: &[Element], owner: &str) {
    for element in elements {
        index.scan_opaque(element, owner);
    }
}

fn scan_param(index: &mut IdIndex, param: &Parameter, owner: &str) {
    scan_all(index, &param.extra, &format!("{owner} > {}", param.name));
}

fn index_track(index: &mut IdIndex, track: &Track) {
    let owner = format!("track {:?}", track.name);
    index.insert(track.id, NodeKind::Track(track.kind), owner.as_str());
    scan_all(index, &track.name_extra, &owner);
    scan_all(index, &track.chain_extra, &owner);
    scan_all(index, &track.devices_extra, &owner);
    scan_all(index, &track.extra, &owner);

    let mixer = &track.mixer;
    scan_param(index, &mixer.volume, &owner);
    scan_param(index, &mixer.pan, &owner);
    if let Some(tempo) = &mixer.tempo {
        scan_param(index, tempo, &owner);
    }
    scan_all(index, &mixer.extra, &owner);
    for (i, send) in mixer.sends.iter().enumerate() {
        let send_owner = format!("{owner} > send #{}", i + 1);
        index.reference(send.return_track, RefKind::ReturnTrack, send_owner.as_str());
        scan_param(index, &send.level, &send_owner);
        scan_all(index, &send.extra, &send_owner);
    }

    for (i, device) in track.devices.iter().enumerate() {
        let dev_owner = format!("{owner} > device #{} ({})", i + 1, device.label());
        index.insert(device.id, NodeKind::Device, dev_owner.as_str());
        scan_all(index, &device.enabled_extra, &dev_owner);
        for param in &device.parameters {
            scan_param(index, param, &dev_owner);
        }
        scan_all(index, &device.extra, &dev_owner);
    }

    let Some(timeline) = &track.clip_timeline else {
        return;
    };
    for shell in &timeline.shells {
        index.scan_opaque(shell, &owner);
    }
    for clip in &timeline.clips {
        let clip_owner = format!("{owner} > clip {:?}", clip.name);
        index.insert(clip.id, NodeKind::Clip, clip_owner.as_str());
        if let Some(region) = &clip.loop_region {
            if let Some(id) = region.id {
                index.insert(id, NodeKind::Loop, format!("{clip_owner} > loop"));
            }
            scan_all(index, &region.extra, &clip_owner);
        }
        if let Some(ts) = &clip.time_signature {
            if let Some(id) = ts.id {
                index.insert(id, NodeKind::TimeSignature, format!("{clip_owner} > time signature"));
            }
            scan_all(index, &ts.extra, &clip_owner);
        }
        for key in &clip.key_tracks {
            index.insert(key.id, NodeKind::KeyTrack, format!("{clip_owner} > key {}", key.pitch));
            scan_all(index, &key.notes_extra, &clip_owner);
            scan_all(index, &key.extra, &clip_owner);
        }
        scan_all(index, &clip.notes_extra, &clip_owner);
        scan_all(index, &clip.extra, &clip_owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::DraftNote;

    fn project() -> (Document, Id) {
        let mut doc = Document::empty();
        let bass = doc.add_track(TrackKind::Midi, "Bass").unwrap();
        doc.add_track(TrackKind::Return, "A-Reverb").unwrap();
        doc.add_track(TrackKind::Return, "B-Delay").unwrap();
        (doc, bass)
    }

    #[test]
    fn test_add_track_keeps_send_parity() {
        let (mut doc, bass) = project();
        let lead = doc.add_track(TrackKind::Midi, "Lead").unwrap();
        assert_eq!(doc.track(bass).unwrap().mixer.sends.len(), 2);
        assert_eq!(doc.track(lead).unwrap().mixer.sends.len(), 2);
        // Returns stay last
        assert_eq!(doc.tracks().last().unwrap().kind, TrackKind::Return);
        assert_eq!(doc.tracks()[1].id, lead);
    }

    #[test]
    fn test_add_master_is_rejected() {
        let (mut doc, _) = project();
        assert_eq!(
            doc.add_track(TrackKind::Master, "M"),
            Err(ModelError::UnsupportedTrackKind(TrackKind::Master))
        );
    }

    #[test]
    fn test_find_track_by_name_is_case_insensitive() {
        let (doc, bass) = project();
        assert_eq!(doc.find_track_by_name("BASS", None).map(|t| t.id), Some(bass));
        assert!(doc.find_track_by_name("bass", Some(TrackKind::Audio)).is_none());
        assert!(doc.find_track_by_name("Bas", None).is_none());
    }

    #[test]
    fn test_find_track_first_match_wins() {
        let (mut doc, bass) = project();
        doc.add_track(TrackKind::Midi, "bass").unwrap();
        assert_eq!(doc.find_track_by_name("Bass", Some(TrackKind::Midi)).map(|t| t.id), Some(bass));
    }

    #[test]
    fn test_insert_clip_allocates_ids() {
        let (mut doc, bass) = project();
        let before = doc.next_id();
        let notes = [
            DraftNote { pitch: 36, time: 0.0, duration: 1.0, velocity: 100 },
            DraftNote { pitch: 36, time: 2.0, duration: 1.0, velocity: 90 },
            DraftNote { pitch: 43, time: 1.0, duration: 1.0, velocity: 80 },
        ];
        let clip_id = doc
            .insert_clip(bass, ClipDraft::new("Verse", 64.0, 80.0).with_notes(notes))
            .unwrap();
        // clip + loop + time signature + two pitches
        assert_eq!(doc.next_id(), before + 5);
        assert_eq!(clip_id, Id(before));

        let clip = &doc.track(bass).unwrap().clips()[0];
        assert_eq!((clip.start, clip.end), (64.0, 80.0));
        assert_eq!(clip.key_tracks.len(), 2);
        assert_eq!(clip.note_count(), 3);
        assert!(doc.id_index().duplicates().is_empty());
    }

    #[test]
    fn test_insert_clip_rejects_non_midi_track() {
        let (mut doc, _) = project();
        let ret = doc.return_tracks().next().unwrap().id;
        let err = doc.insert_clip(ret, ClipDraft::new("x", 0.0, 4.0)).unwrap_err();
        assert!(matches!(err, ModelError::NoClipTimeline(_)));
        assert_eq!(
            doc.insert_clip(Id(999), ClipDraft::new("x", 0.0, 4.0)),
            Err(ModelError::TrackNotFound(Id(999)))
        );
    }

    #[test]
    fn test_set_tempo_bounds() {
        let (mut doc, _) = project();
        doc.set_tempo(128.0).unwrap();
        assert_eq!(doc.tempo(), Some(128.0));
        assert_eq!(doc.set_tempo(0.0), Err(ModelError::InvalidTempo(0.0)));
        assert_eq!(doc.tempo(), Some(128.0));
    }

    #[test]
    fn test_locators_stay_sorted() {
        let (mut doc, _) = project();
        doc.add_locator(32.0, "Chorus");
        doc.add_locator(0.0, "Intro");
        doc.add_locator(16.0, "Verse");
        let names: Vec<&str> = doc.locators().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Intro", "Verse", "Chorus"]);
        doc.clear_locators();
        assert!(doc.locators().is_empty());
    }

    #[test]
    fn test_rename_track_updates_user_name() {
        let (mut doc, bass) = project();
        doc.track_mut(bass).unwrap().user_name = Some("Bass".into());
        doc.rename_track(bass, "Sub Bass").unwrap();
        let track = doc.track(bass).unwrap();
        assert_eq!(track.name, "Sub Bass");
        assert_eq!(track.user_name.as_deref(), Some("Sub Bass"));
    }

    #[test]
    fn test_id_index_tracks_send_references() {
        let (doc, _) = project();
        let index = doc.id_index();
        // master + bass + two returns
        assert_eq!(index.len(), 4);
        assert_eq!(index.references().len(), 2);
        assert!(index.max_id().unwrap().0 < doc.next_id());
    }
}
