//! Song generation: a staged run that turns a template project and a `SongSpec`
//! into a new, loadable project.
//!
//! Every stage either advances the run or fails it with a typed error. A failed
//! run drops its working document; nothing partial is ever returned.

mod spec;

use std::collections::HashMap;

use tracing::{debug, info};

pub use spec::{Meter, PartSpec, RoleSpec, SectionSpec, SongSpec};

use crate::clip::ClipDraft;
use crate::document::Document;
use crate::error::GenerationError;
use crate::ids::Id;
use crate::track::TrackKind;
use crate::validate::validate;

/// Stages of a generation run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadTemplate,
    AllocateTrackMapping,
    EmbedClips,
    SetTempo,
    WriteLocators,
    Validate,
    Done,
}

impl Stage {
    fn next(self) -> Self {
        match self {
            Self::LoadTemplate => Self::AllocateTrackMapping,
            Self::AllocateTrackMapping => Self::EmbedClips,
            Self::EmbedClips => Self::SetTempo,
            Self::SetTempo => Self::WriteLocators,
            Self::WriteLocators => Self::Validate,
            Self::Validate | Self::Done => Self::Done,
        }
    }
}

/// A single generation run
pub struct Generation<'a> {
    spec: &'a SongSpec,
    template: &'a Document,
    stage: Stage,
    /// Working copy of the template
    doc: Document,
    /// Role name to mapped track
    mapping: HashMap<&'a str, Id>,
    section_starts: Vec<f64>,
}

impl<'a> Generation<'a> {
    pub fn new(spec: &'a SongSpec, template: &'a Document) -> Self {
        Self {
            spec,
            template,
            stage: Stage::LoadTemplate,
            doc: template.clone(),
            mapping: HashMap::new(),
            section_starts: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the current stage and move to the next one
    pub fn advance(&mut self) -> Result<Stage, GenerationError> {
        debug!(stage = ?self.stage, song = %self.spec.name, "Running generation stage");
        match self.stage {
            Stage::LoadTemplate => self.load_template()?,
            Stage::AllocateTrackMapping => self.allocate_track_mapping()?,
            Stage::EmbedClips => self.embed_clips()?,
            Stage::SetTempo => self.doc.set_tempo(self.spec.tempo)?,
            Stage::WriteLocators => self.write_locators(),
            Stage::Validate => self.validate()?,
            Stage::Done => {}
        }
        self.stage = self.stage.next();
        Ok(self.stage)
    }

    /// Run every remaining stage and hand over the finished document
    pub fn run(mut self) -> Result<Document, GenerationError> {
        while self.stage != Stage::Done {
            self.advance()?;
        }
        info!(
            song = %self.spec.name,
            tracks = self.mapping.len(),
            sections = self.spec.sections.len(),
            next_id = self.doc.next_id(),
            "Generated project"
        );
        Ok(self.doc)
    }

    fn load_template(&mut self) -> Result<(), GenerationError> {
        self.spec.check().map_err(GenerationError::InvalidSpec)?;
        let report = validate(self.template);
        if !report.is_loadable() {
            return Err(GenerationError::InvalidTemplate(report.errors().cloned().collect()));
        }
        Ok(())
    }

    fn allocate_track_mapping(&mut self) -> Result<(), GenerationError> {
        let spec = self.spec;
        for role in &spec.roles {
            let name = role.track_name();
            let Some(track) = self.doc.find_track_by_name(name, Some(TrackKind::Midi)) else {
                let other = self.doc.find_track_by_name(name, None);
                match (other, role.required) {
                    (Some(other), true) => {
                        return Err(GenerationError::InvalidSpec(format!(
                            "role {:?} maps to {} track {:?}, not a MIDI track",
                            role.role, other.kind, other.name
                        )));
                    }
                    (None, true) => return Err(GenerationError::MissingRequiredTrack(name.to_string())),
                    (Some(other), false) => {
                        info!(role = %role.role, track = %name, kind = %other.kind, "Skipping optional role on a non-MIDI track");
                    }
                    (None, false) => {
                        info!(role = %role.role, track = %name, "Skipping optional role with no track");
                    }
                }
                continue;
            };
            if track.clip_timeline.is_none() {
                return Err(GenerationError::MissingClipPath(track.name.clone()));
            }
            let id = track.id;
            if let Some((taken, _)) = self.mapping.iter().find(|(_, mapped)| **mapped == id) {
                return Err(GenerationError::InvalidSpec(format!(
                    "roles {taken:?} and {:?} map to the same track",
                    role.role
                )));
            }

            if let Some(rename) = &role.rename {
                self.doc.rename_track(id, rename.as_str())?;
            }
            let cleared = self.doc.clear_clips(id)?;
            debug!(role = %role.role, track = %id, cleared, "Mapped role");
            self.mapping.insert(role.role.as_str(), id);
        }
        Ok(())
    }

    fn embed_clips(&mut self) -> Result<(), GenerationError> {
        let spec = self.spec;
        let meter = spec.time_signature.unwrap_or_default();
        self.section_starts = spec.section_starts();

        for (section, &start) in spec.sections.iter().zip(&self.section_starts) {
            for part in &section.parts {
                let Some(&track) = self.mapping.get(part.role.as_str()) else {
                    debug!(role = %part.role, section = %section.name, "No track for part");
                    continue;
                };
                let length = part.length_beats.unwrap_or(section.length_beats);
                let name = part
                    .clip_name
                    .clone()
                    .unwrap_or_else(|| format!("{} {}", section.name, part.role));
                let mut draft = ClipDraft::new(name, start, start + length)
                    .with_notes(part.notes.iter().copied());
                draft.time_signature = (meter.numerator, meter.denominator);
                let clip = self.doc.insert_clip(track, draft)?;
                debug!(clip = %clip, track = %track, start, length, "Embedded clip");
            }
        }
        Ok(())
    }

    fn write_locators(&mut self) {
        self.doc.clear_locators();
        for (section, &start) in self.spec.sections.iter().zip(&self.section_starts) {
            self.doc.add_locator(start, section.name.as_str());
        }
    }

    fn validate(&self) -> Result<(), GenerationError> {
        let report = validate(&self.doc);
        if !report.is_loadable() {
            return Err(GenerationError::Validation(report.errors().cloned().collect()));
        }
        Ok(())
    }
}

/// Generate a new project from a song spec and a template.
pub fn generate(spec: &SongSpec, template: &Document) -> Result<Document, GenerationError> {
    Generation::new(spec, template).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::DraftNote;
    use crate::device::{BuiltinDevice, Device};

    fn template() -> Document {
        let mut doc = Document::empty();
        for name in ["Drums", "Bass", "Chords"] {
            let id = doc.add_track(TrackKind::Midi, name).unwrap();
            let synth = Device::new(doc.allocate_id(), BuiltinDevice::Operator);
            doc.track_mut(id).unwrap().devices.push(synth);
        }
        doc.add_track(TrackKind::Audio, "Vox").unwrap();
        doc.add_track(TrackKind::Return, "A-Reverb").unwrap();
        doc.add_locator(0.0, "Start");
        doc
    }

    fn role(name: &str) -> RoleSpec {
        RoleSpec {
            role: name.into(),
            track: None,
            required: true,
            rename: None,
        }
    }

    fn part(role: &str, notes: Vec<DraftNote>) -> PartSpec {
        PartSpec {
            role: role.into(),
            length_beats: None,
            clip_name: None,
            notes,
        }
    }

    fn song() -> SongSpec {
        let kick = DraftNote { pitch: 36, time: 0.0, duration: 0.5, velocity: 110 };
        SongSpec {
            name: "Test".into(),
            tempo: 128.0,
            time_signature: None,
            roles: vec![role("Drums"), role("Bass")],
            sections: vec![
                SectionSpec {
                    name: "Intro".into(),
                    start_beat: None,
                    length_beats: 64.0,
                    parts: vec![part("Drums", vec![kick])],
                },
                SectionSpec {
                    name: "Verse".into(),
                    start_beat: None,
                    length_beats: 16.0,
                    parts: vec![part("Drums", vec![kick]), part("Bass", vec![kick])],
                },
            ],
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let spec = song();
        let template = template();
        let mut run = Generation::new(&spec, &template);
        let mut seen = vec![run.stage()];
        while run.stage() != Stage::Done {
            seen.push(run.advance().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Stage::LoadTemplate,
                Stage::AllocateTrackMapping,
                Stage::EmbedClips,
                Stage::SetTempo,
                Stage::WriteLocators,
                Stage::Validate,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn test_clip_lands_at_section_start() {
        let doc = generate(&song(), &template()).unwrap();
        let bass = doc.find_track_by_name("Bass", None).unwrap();
        assert_eq!(bass.clips().len(), 1);
        let clip = &bass.clips()[0];
        assert_eq!((clip.start, clip.end), (64.0, 80.0));
        assert_eq!(clip.name, "Verse Bass");

        let drums = doc.find_track_by_name("Drums", None).unwrap();
        let starts: Vec<f64> = drums.clips().iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0.0, 64.0]);
    }

    #[test]
    fn test_tempo_and_locators() {
        let doc = generate(&song(), &template()).unwrap();
        assert_eq!(doc.tempo(), Some(128.0));
        let locators: Vec<(f64, &str)> = doc.locators().iter().map(|l| (l.time, l.name.as_str())).collect();
        assert_eq!(locators, vec![(0.0, "Intro"), (64.0, "Verse")]);
    }

    #[test]
    fn test_missing_required_track() {
        let mut spec = song();
        spec.roles.push(role("Lead"));
        let err = generate(&spec, &template()).unwrap_err();
        assert!(matches!(err, GenerationError::MissingRequiredTrack(name) if name == "Lead"));
    }

    #[test]
    fn test_optional_role_is_skipped() {
        let mut spec = song();
        spec.roles.push(RoleSpec {
            required: false,
            ..role("Lead")
        });
        spec.sections[0].parts.push(part("Lead", Vec::new()));
        let doc = generate(&spec, &template()).unwrap();
        assert!(doc.find_track_by_name("Lead", None).is_none());
    }

    #[test]
    fn test_existing_clips_are_replaced() {
        let mut template = template();
        let bass = template.find_track_by_name("Bass", None).unwrap().id;
        template.insert_clip(bass, ClipDraft::new("Old", 0.0, 4.0)).unwrap();

        let doc = generate(&song(), &template).unwrap();
        let names: Vec<&str> = doc.track(bass).unwrap().clips().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Verse Bass"]);
    }

    #[test]
    fn test_role_mapped_to_audio_track_is_rejected() {
        let mut spec = song();
        spec.roles[1].track = Some("Vox".into());
        let err = generate(&spec, &template()).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidSpec(_)));
    }

    #[test]
    fn test_optional_role_on_audio_track_is_skipped() {
        let mut spec = song();
        spec.roles.push(RoleSpec {
            track: Some("Vox".into()),
            required: false,
            ..role("Vocal Chops")
        });
        spec.sections[1].parts.push(part("Vocal Chops", Vec::new()));
        let doc = generate(&spec, &template()).unwrap();
        let vox = doc.find_track_by_name("Vox", None).unwrap();
        assert_eq!(vox.kind, TrackKind::Audio);
        assert!(vox.clips().is_empty());
        assert_eq!(doc.find_track_by_name("Bass", None).unwrap().clips().len(), 1);
    }

    #[test]
    fn test_rename_and_explicit_clip_name() {
        let mut spec = song();
        spec.roles[1].rename = Some("Sub Bass".into());
        spec.sections[1].parts[1].clip_name = Some("Walk".into());
        spec.sections[1].parts[1].length_beats = Some(8.0);
        let doc = generate(&spec, &template()).unwrap();
        let bass = doc.find_track_by_name("Sub Bass", None).unwrap();
        assert_eq!(bass.clips()[0].name, "Walk");
        assert_eq!(bass.clips()[0].end, 72.0);
    }

    #[test]
    fn test_invalid_tempo_fails_whole_run() {
        let mut spec = song();
        spec.tempo = 5000.0;
        let err = generate(&spec, &template()).unwrap_err();
        assert!(matches!(err, GenerationError::Model(_)));
    }

    #[test]
    fn test_broken_template_is_rejected() {
        let mut template = template();
        let bass = template.find_track_by_name("Bass", None).unwrap().id;
        template.track_mut(bass).unwrap().mixer.sends.clear();
        let err = generate(&song(), &template).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidTemplate(findings) if findings.len() == 1));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let doc = generate(&song(), &template()).unwrap();
        let index = doc.id_index();
        assert!(index.duplicates().is_empty());
        assert!(index.max_id().unwrap().0 < doc.next_id());
        assert!(validate(&doc).is_loadable());
    }
}
