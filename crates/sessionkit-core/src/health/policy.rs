//! Versioned scoring policy: which rules run, what they weigh, where the grade bands sit

use serde::{Deserialize, Serialize};

use super::{Category, Grade, Issue, IssueSeverity, clip_rules, device_rules};
use crate::device::BuiltinDevice;
use crate::document::Document;

/// A health rule. Each variant is a pure function of the document and the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    DisabledDeviceClutter,
    LimiterNotLast,
    CompressorStack,
    ExtremeParameter,
    EmptyClip,
    ShortClip,
    DuplicateClip,
    OverlappingNotes,
    FlatVelocity,
    MissingInstrument,
    EmptyTrack,
}

impl Rule {
    pub const ALL: [Rule; 11] = [
        Rule::DisabledDeviceClutter,
        Rule::LimiterNotLast,
        Rule::CompressorStack,
        Rule::ExtremeParameter,
        Rule::EmptyClip,
        Rule::ShortClip,
        Rule::DuplicateClip,
        Rule::OverlappingNotes,
        Rule::FlatVelocity,
        Rule::MissingInstrument,
        Rule::EmptyTrack,
    ];

    pub fn category(self) -> Category {
        match self {
            Self::DisabledDeviceClutter | Self::LimiterNotLast | Self::CompressorStack => {
                Category::DeviceChain
            }
            Self::ExtremeParameter => Category::Parameters,
            Self::EmptyClip
            | Self::ShortClip
            | Self::DuplicateClip
            | Self::OverlappingNotes
            | Self::FlatVelocity => Category::Clips,
            Self::MissingInstrument | Self::EmptyTrack => Category::Tracks,
        }
    }

    pub fn check(self, doc: &Document, policy: &HealthPolicy) -> Vec<Issue> {
        match self {
            Self::DisabledDeviceClutter => device_rules::disabled_clutter(doc, policy),
            Self::LimiterNotLast => device_rules::limiter_not_last(doc, policy),
            Self::CompressorStack => device_rules::compressor_stack(doc, policy),
            Self::ExtremeParameter => device_rules::extreme_parameters(doc, policy),
            Self::EmptyClip => clip_rules::empty_clips(doc, policy),
            Self::ShortClip => clip_rules::short_clips(doc, policy),
            Self::DuplicateClip => clip_rules::duplicate_clips(doc, policy),
            Self::OverlappingNotes => clip_rules::overlapping_notes(doc, policy),
            Self::FlatVelocity => clip_rules::flat_velocity(doc, policy),
            Self::MissingInstrument => clip_rules::missing_instrument(doc, policy),
            Self::EmptyTrack => clip_rules::empty_tracks(doc, policy),
        }
    }
}

/// Score penalty per issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: u32,
    pub warning: u32,
    pub info: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 15,
            warning: 5,
            info: 2,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: IssueSeverity) -> u32 {
        match severity {
            IssueSeverity::Critical => self.critical,
            IssueSeverity::Warning => self.warning,
            IssueSeverity::Info => self.info,
        }
    }
}

/// Lowest score that still earns each grade; anything below `d` is an F
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeBands {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Default for GradeBands {
    fn default() -> Self {
        Self {
            a: 80,
            b: 60,
            c: 40,
            d: 20,
        }
    }
}

impl GradeBands {
    pub fn grade(&self, score: u32) -> Grade {
        if score >= self.a {
            Grade::A
        } else if score >= self.b {
            Grade::B
        } else if score >= self.c {
            Grade::C
        } else if score >= self.d {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Disabled:total device ratio above which a chain counts as cluttered
    pub disabled_ratio: f64,
    /// Chains shorter than this are never cluttered
    pub clutter_min_devices: usize,
    /// Consecutive enabled compressors that make a stack
    pub compressor_stack: usize,
    /// Clips shorter than this (in beats) are flagged
    pub short_clip_beats: f64,
    /// Start-time tolerance (in beats) for duplicate clip detection
    pub duplicate_window_beats: f64,
    /// Minimum notes before a single-velocity clip is flagged
    pub flat_velocity_min_notes: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            disabled_ratio: 0.30,
            clutter_min_devices: 2,
            compressor_stack: 3,
            short_clip_beats: 1.0,
            duplicate_window_beats: 0.25,
            flat_velocity_min_notes: 8,
        }
    }
}

/// Sane range for one parameter of a built-in device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    pub device: BuiltinDevice,
    pub parameter: String,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_bound_severity")]
    pub severity: IssueSeverity,
}

fn default_bound_severity() -> IssueSeverity {
    IssueSeverity::Warning
}

impl ParameterBound {
    fn new(device: BuiltinDevice, parameter: &str, min: f64, max: f64, severity: IssueSeverity) -> Self {
        Self {
            device,
            parameter: parameter.to_string(),
            min,
            max,
            severity,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// The complete, swappable scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    /// Reported in every `HealthReport` so scores stay auditable
    pub version: String,
    pub rules: Vec<Rule>,
    pub weights: SeverityWeights,
    pub bands: GradeBands,
    pub thresholds: Thresholds,
    pub bounds: Vec<ParameterBound>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::v1()
    }
}

impl HealthPolicy {
    pub fn v1() -> Self {
        use BuiltinDevice::*;
        use IssueSeverity::*;
        Self {
            version: "v1".to_string(),
            rules: Rule::ALL.to_vec(),
            weights: SeverityWeights::default(),
            bands: GradeBands::default(),
            thresholds: Thresholds::default(),
            bounds: vec![
                ParameterBound::new(Compressor, "Ratio", 1.0, 20.0, Warning),
                ParameterBound::new(Compressor, "Threshold", -60.0, 0.0, Warning),
                ParameterBound::new(GlueCompressor, "Ratio", 1.0, 10.0, Warning),
                ParameterBound::new(GlueCompressor, "Threshold", -40.0, 0.0, Warning),
                ParameterBound::new(Limiter, "Ceiling", -24.0, 0.0, Critical),
                ParameterBound::new(Saturator, "Drive", -36.0, 36.0, Warning),
                ParameterBound::new(Utility, "Gain", -35.0, 35.0, Warning),
                ParameterBound::new(Reverb, "DecayTime", 200.0, 20000.0, Info),
            ],
        }
    }

    pub fn bounds_for(&self, device: BuiltinDevice) -> impl Iterator<Item = &ParameterBound> {
        self.bounds.iter().filter(move |b| b.device == device)
    }
}
