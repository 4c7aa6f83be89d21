//! Declarative song description consumed by the generator

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::clip::DraftNote;

fn yes() -> bool {
    true
}

/// Clip meter; 4/4 unless stated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

/// A musical role (kick, bass, chords, ...) and the template track that plays it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: String,
    /// Template track name; defaults to the role name
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default = "yes")]
    pub required: bool,
    /// New name for the mapped track
    #[serde(default)]
    pub rename: Option<String>,
}

impl RoleSpec {
    pub fn track_name(&self) -> &str {
        self.track.as_deref().unwrap_or(&self.role)
    }
}

/// One role's clip within a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    pub role: String,
    /// Defaults to the section length
    #[serde(default)]
    pub length_beats: Option<f64>,
    #[serde(default)]
    pub clip_name: Option<String>,
    #[serde(default)]
    pub notes: Vec<DraftNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    /// Defaults to the end of the previous section
    #[serde(default)]
    pub start_beat: Option<f64>,
    pub length_beats: f64,
    #[serde(default)]
    pub parts: Vec<PartSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSpec {
    pub name: String,
    pub tempo: f64,
    #[serde(default)]
    pub time_signature: Option<Meter>,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub sections: Vec<SectionSpec>,
}

impl SongSpec {
    pub fn role(&self, role: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.role == role)
    }

    /// Start beat of every section, in order
    pub fn section_starts(&self) -> Vec<f64> {
        let mut cursor = 0.0;
        self.sections
            .iter()
            .map(|section| {
                let start = section.start_beat.unwrap_or(cursor);
                cursor = start + section.length_beats;
                start
            })
            .collect()
    }

    /// Internal consistency, independent of any template
    pub fn check(&self) -> Result<(), String> {
        let mut roles = HashSet::new();
        for role in &self.roles {
            if role.role.trim().is_empty() {
                return Err("role with an empty name".into());
            }
            if !roles.insert(role.role.as_str()) {
                return Err(format!("role {:?} is declared twice", role.role));
            }
        }
        if let Some(meter) = self.time_signature {
            if meter.numerator == 0 || !meter.denominator.is_power_of_two() {
                return Err(format!(
                    "time signature {}/{} is not a valid meter",
                    meter.numerator, meter.denominator
                ));
            }
        }
        if self.sections.is_empty() {
            return Err("song has no sections".into());
        }
        for section in &self.sections {
            if !(section.length_beats.is_finite() && section.length_beats > 0.0) {
                return Err(format!("section {:?} has length {}", section.name, section.length_beats));
            }
            if section.start_beat.is_some_and(|s| !s.is_finite() || s < 0.0) {
                return Err(format!("section {:?} has a negative start", section.name));
            }
            for part in &section.parts {
                if !roles.contains(part.role.as_str()) {
                    return Err(format!(
                        "section {:?} uses undeclared role {:?}",
                        section.name, part.role
                    ));
                }
                if part.length_beats.is_some_and(|l| !l.is_finite() || l <= 0.0) {
                    return Err(format!(
                        "part {:?} in section {:?} has a non-positive length",
                        part.role, section.name
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONG: &str = r#"
        name = "Night Drive"
        tempo = 122.0

        [[roles]]
        role = "bass"

        [[roles]]
        role = "lead"
        track = "Synth Lead"
        required = false

        [[sections]]
        name = "Intro"
        length_beats = 16.0

        [[sections.parts]]
        role = "bass"
        notes = [{ pitch = 36, time = 0.0, duration = 1.0, velocity = 100 }]

        [[sections]]
        name = "Drop"
        start_beat = 64.0
        length_beats = 32.0

        [[sections]]
        name = "Outro"
        length_beats = 8.0
    "#;

    #[test]
    fn test_parse_toml_song() {
        let spec: SongSpec = toml::from_str(SONG).unwrap();
        assert_eq!(spec.name, "Night Drive");
        assert!(spec.role("bass").unwrap().required);
        assert_eq!(spec.role("lead").unwrap().track_name(), "Synth Lead");
        assert_eq!(spec.role("bass").unwrap().track_name(), "bass");
        assert_eq!(spec.sections[0].parts[0].notes[0].pitch, 36);
        assert!(spec.check().is_ok());
    }

    #[test]
    fn test_section_starts_follow_previous() {
        let spec: SongSpec = toml::from_str(SONG).unwrap();
        assert_eq!(spec.section_starts(), vec![0.0, 64.0, 96.0]);
    }

    #[test]
    fn test_parse_json_song() {
        let spec: SongSpec = serde_json::from_str(
            r#"{"name":"x","tempo":90,"time_signature":{"numerator":3,"denominator":4},
                "roles":[{"role":"keys"}],
                "sections":[{"name":"A","length_beats":12,"parts":[{"role":"keys","length_beats":6}]}]}"#,
        )
        .unwrap();
        assert_eq!(spec.time_signature, Some(Meter { numerator: 3, denominator: 4 }));
        assert_eq!(spec.sections[0].parts[0].length_beats, Some(6.0));
    }

    #[test]
    fn test_check_rejects_inconsistent_specs() {
        let mut spec: SongSpec = toml::from_str(SONG).unwrap();
        spec.sections[1].parts.push(PartSpec {
            role: "drums".into(),
            length_beats: None,
            clip_name: None,
            notes: Vec::new(),
        });
        assert!(spec.check().unwrap_err().contains("undeclared role"));

        let mut spec: SongSpec = toml::from_str(SONG).unwrap();
        spec.sections[0].length_beats = 0.0;
        assert!(spec.check().is_err());

        let mut spec: SongSpec = toml::from_str(SONG).unwrap();
        spec.roles.push(spec.roles[0].clone());
        assert!(spec.check().unwrap_err().contains("declared twice"));
    }

    #[test]
    fn test_check_rejects_impossible_meters() {
        let mut spec: SongSpec = toml::from_str(SONG).unwrap();
        for (numerator, denominator) in [(4, 0), (3, 3), (0, 4), (7, 12)] {
            spec.time_signature = Some(Meter { numerator, denominator });
            assert!(spec.check().unwrap_err().contains("not a valid meter"), "{numerator}/{denominator}");
        }
        for (numerator, denominator) in [(7, 8), (3, 4), (5, 16), (1, 1)] {
            spec.time_signature = Some(Meter { numerator, denominator });
            assert!(spec.check().is_ok(), "{numerator}/{denominator}");
        }
    }
}
