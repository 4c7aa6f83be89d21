//! sessionkit-core: Project file model, codec, validation, diagnosis, diffing and generation

mod clip;
pub mod codec;
mod device;
pub mod diff;
mod document;
mod error;
pub mod generate;
pub mod health;
mod ids;
mod locator;
mod track;
pub mod validate;
pub mod xml;

pub use clip::{Clip, ClipDraft, ClipKind, DraftNote, KeyTrack, LoopRegion, NoteEvent, TimeSignature};
pub use codec::{decode, decode_markup, encode, encode_markup};
pub use device::{BuiltinDevice, Device, DeviceKind, ParamValue, Parameter, PluginFormat};
pub use diff::{DeviceChange, DiffReport, TrackDiff, Verdict, diff, diff_with};
pub use document::{Document, FormatVersion, SUPPORTED_MAJOR_VERSIONS, TEMPO_RANGE};
pub use error::{DecodeError, EncodeError, GenerationError, ModelError, Result};
pub use generate::{Generation, SongSpec, Stage, generate};
pub use health::{Grade, HealthPolicy, HealthReport, Issue, IssueSeverity, Rule, analyze, analyze_with};
pub use ids::{Id, IdAllocator, IdIndex, IdNode, NodeKind, RefKind, Reference};
pub use locator::Locator;
pub use track::{CLIP_PATH, ClipTimeline, Mixer, MixerSend, Track, TrackKind};
pub use validate::{Finding, FindingKind, Severity, ValidationReport, validate};
