//! Devices in a track's effect chain

use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::xml::Element;

/// Built-in device types the analyzer knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinDevice {
    Compressor,
    GlueCompressor,
    MultibandDynamics,
    Limiter,
    Gate,
    Eq8,
    Eq3,
    AutoFilter,
    Reverb,
    Delay,
    Saturator,
    Utility,
    Simpler,
    Sampler,
    Operator,
    Wavetable,
    DrumRack,
    InstrumentRack,
    AudioEffectRack,
}

impl BuiltinDevice {
    const TAGS: &'static [(&'static str, BuiltinDevice)] = &[
        ("Compressor2", Self::Compressor),
        ("GlueCompressor", Self::GlueCompressor),
        ("MultibandDynamics", Self::MultibandDynamics),
        ("Limiter", Self::Limiter),
        ("Gate", Self::Gate),
        ("Eq8", Self::Eq8),
        ("FilterEQ3", Self::Eq3),
        ("AutoFilter", Self::AutoFilter),
        ("Reverb", Self::Reverb),
        ("Delay", Self::Delay),
        ("PingPongDelay", Self::Delay),
        ("Saturator", Self::Saturator),
        ("StereoGain", Self::Utility),
        ("OriginalSimpler", Self::Simpler),
        ("MultiSampler", Self::Sampler),
        ("Operator", Self::Operator),
        ("InstrumentVector", Self::Wavetable),
        ("DrumGroupDevice", Self::DrumRack),
        ("InstrumentGroupDevice", Self::InstrumentRack),
        ("AudioEffectGroupDevice", Self::AudioEffectRack),
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::TAGS.iter().find(|(t, _)| *t == tag).map(|(_, d)| *d)
    }

    /// Canonical element tag for newly created devices
    pub fn tag(self) -> &'static str {
        Self::TAGS
            .iter()
            .find(|(_, d)| *d == self)
            .map(|(t, _)| *t)
            .unwrap_or("Unknown")
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Compressor => "Compressor",
            Self::GlueCompressor => "Glue Compressor",
            Self::MultibandDynamics => "Multiband Dynamics",
            Self::Limiter => "Limiter",
            Self::Gate => "Gate",
            Self::Eq8 => "EQ Eight",
            Self::Eq3 => "EQ Three",
            Self::AutoFilter => "Auto Filter",
            Self::Reverb => "Reverb",
            Self::Delay => "Delay",
            Self::Saturator => "Saturator",
            Self::Utility => "Utility",
            Self::Simpler => "Simpler",
            Self::Sampler => "Sampler",
            Self::Operator => "Operator",
            Self::Wavetable => "Wavetable",
            Self::DrumRack => "Drum Rack",
            Self::InstrumentRack => "Instrument Rack",
            Self::AudioEffectRack => "Audio Effect Rack",
        }
    }

    /// Single-band dynamics compressors (used for series-stacking checks)
    pub fn is_compressor(self) -> bool {
        matches!(self, Self::Compressor | Self::GlueCompressor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluginFormat {
    Vst2,
    Vst3,
    AudioUnit,
}

/// What a device is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Builtin(BuiltinDevice),
    Plugin { format: PluginFormat, name: String },
    Unknown(String),
}

impl DeviceKind {
    /// Classify a device element by tag and, for plugins, its descriptor
    pub fn classify(tag: &str, children: &[Element]) -> Self {
        if let Some(builtin) = BuiltinDevice::from_tag(tag) {
            return Self::Builtin(builtin);
        }
        if tag == "PluginDevice" || tag == "AuPluginDevice" {
            let info = children
                .iter()
                .find(|c| c.name == "PluginDesc")
                .and_then(|desc| desc.children.first());
            let (format, name) = match info {
                Some(info) if info.name == "Vst3PluginInfo" => {
                    (PluginFormat::Vst3, info.child_value("Name"))
                }
                Some(info) if info.name == "AuPluginInfo" => {
                    (PluginFormat::AudioUnit, info.child_value("Name"))
                }
                Some(info) => (PluginFormat::Vst2, info.child_value("PlugName")),
                None if tag == "AuPluginDevice" => (PluginFormat::AudioUnit, None),
                None => (PluginFormat::Vst2, None),
            };
            return Self::Plugin {
                format,
                name: name.unwrap_or("Unnamed Plugin").to_string(),
            };
        }
        Self::Unknown(tag.to_string())
    }

    pub fn builtin(&self) -> Option<BuiltinDevice> {
        match self {
            Self::Builtin(b) => Some(*b),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Builtin(b) => b.label().to_string(),
            Self::Plugin { name, .. } => name.clone(),
            Self::Unknown(tag) => tag.clone(),
        }
    }
}

/// A parameter value as stored in the file
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Bool(bool),
}

impl ParamValue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "true" => Some(Self::Bool(true)),
            "false" => Some(Self::Bool(false)),
            _ => raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(Self::Number),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Number(v) => v,
            Self::Bool(b) => f64::from(u8::from(b)),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A device parameter (`<Name><Manual Value="..."/>...</Name>`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    /// Automation targets, modulation ranges and the like
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
            extra: Vec::new(),
        }
    }
}

/// One link in a track's device chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: Id,
    /// Element tag in the file
    pub tag: String,
    pub kind: DeviceKind,
    pub enabled: bool,
    pub parameters: Vec<Parameter>,
    /// Children of the `On` element other than `Manual`
    #[serde(skip)]
    pub enabled_extra: Vec<Element>,
    #[serde(skip)]
    pub extra_attrs: Vec<(String, String)>,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Device {
    pub fn new(id: Id, kind: BuiltinDevice) -> Self {
        Self {
            id,
            tag: kind.tag().to_string(),
            kind: DeviceKind::Builtin(kind),
            enabled: true,
            parameters: Vec::new(),
            enabled_extra: Vec::new(),
            extra_attrs: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.parameters.push(Parameter::new(name, ParamValue::Number(value)));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn param_value(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.value.as_f64())
    }

    pub fn set_param(&mut self, name: &str, value: f64) {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = ParamValue::Number(value),
            None => self.parameters.push(Parameter::new(name, ParamValue::Number(value))),
        }
    }

    pub fn label(&self) -> String {
        self.kind.label()
    }
}
