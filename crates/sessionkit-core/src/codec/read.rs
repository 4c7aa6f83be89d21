//! Lifting a markup tree into the document model

use std::str::FromStr;

use crate::clip::{Clip, ClipKind, KeyTrack, LoopRegion, NoteEvent, TimeSignature};
use crate::device::{Device, DeviceKind, ParamValue, Parameter};
use crate::document::{Document, FormatVersion, SUPPORTED_MAJOR_VERSIONS};
use crate::error::{DecodeError, Result};
use crate::ids::{Id, IdAllocator};
use crate::locator::Locator;
use crate::track::{CLIP_PATH, ClipTimeline, Mixer, MixerSend, Track, TrackKind};
use crate::xml::Element;

fn structure(message: impl Into<String>) -> DecodeError {
    DecodeError::Structure(message.into())
}

fn invalid(element: &str, value: &str) -> DecodeError {
    DecodeError::InvalidValue {
        element: element.to_string(),
        value: value.to_string(),
    }
}

fn take_id(el: &mut Element) -> Result<Id> {
    let raw = el
        .take_attr("Id")
        .ok_or_else(|| structure(format!("<{}> without Id", el.name)))?;
    raw.parse().map(Id).map_err(|_| invalid(&el.name, &raw))
}

fn take_optional_id(el: &mut Element) -> Result<Option<Id>> {
    match el.take_attr("Id") {
        Some(raw) => raw.parse().map(|v| Some(Id(v))).map_err(|_| invalid(&el.name, &raw)),
        None => Ok(None),
    }
}

/// Remove `<name Value="..."/>` and return its raw value
fn take_raw(el: &mut Element, name: &str) -> Option<String> {
    let pos = el
        .children
        .iter()
        .position(|c| c.name == name && c.value().is_some())?;
    el.children.remove(pos).take_attr("Value")
}

fn take_parsed<T: FromStr>(el: &mut Element, name: &str) -> Result<Option<T>> {
    match take_raw(el, name) {
        Some(raw) => raw.parse().map(Some).map_err(|_| invalid(name, &raw)),
        None => Ok(None),
    }
}

/// Parse a finite number; `NaN` and `inf` are rejected
fn finite(element: &str, raw: &str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(element, raw)),
    }
}

fn take_number(el: &mut Element, name: &str) -> Result<Option<f64>> {
    take_raw(el, name).map(|raw| finite(name, &raw)).transpose()
}

fn parse_bool(element: &str, raw: &str) -> Result<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(element, raw)),
    }
}

fn take_bool(el: &mut Element, name: &str) -> Result<Option<bool>> {
    take_raw(el, name).map(|raw| parse_bool(name, &raw)).transpose()
}

fn attr_number(el: &mut Element, name: &str) -> Result<Option<f64>> {
    match el.take_attr(name) {
        Some(raw) => finite(&el.name, &raw).map(Some),
        None => Ok(None),
    }
}

/// A `Manual` value that reads as a number but is not finite
fn non_finite_manual(el: &Element) -> Option<DecodeError> {
    let raw = el.manual_value()?;
    raw.parse::<f64>()
        .is_ok_and(|v| !v.is_finite())
        .then(|| invalid(&el.name, raw))
}

/// `<Name><Manual Value="..."/>...</Name>`, or the element back if it is not one
fn parameter(mut el: Element) -> std::result::Result<Parameter, Element> {
    let value = el.manual_value().and_then(ParamValue::parse);
    match value {
        Some(value) if el.attrs.is_empty() => {
            el.take_child("Manual");
            Ok(Parameter {
                name: el.name,
                value,
                extra: el.children,
            })
        }
        _ => Err(el),
    }
}

fn required_parameter(el: Element) -> Result<Parameter> {
    parameter(el).map_err(|el| invalid(&el.name, el.manual_value().unwrap_or("")))
}

pub(super) fn document(mut root: Element) -> Result<Document> {
    if root.name != "Ableton" {
        return Err(structure(format!("expected <Ableton> root, found <{}>", root.name)));
    }
    let major = root
        .take_attr("MajorVersion")
        .ok_or_else(|| DecodeError::UnsupportedVersion("missing MajorVersion".into()))?;
    if !SUPPORTED_MAJOR_VERSIONS.contains(&major.as_str()) {
        return Err(DecodeError::UnsupportedVersion(major));
    }
    let minor = root.take_attr("MinorVersion").unwrap_or_default();
    let creator = root.take_attr("Creator");

    let mut live_set = root
        .take_child("LiveSet")
        .ok_or_else(|| structure("missing <LiveSet>"))?;
    let version = FormatVersion {
        major,
        minor,
        creator,
        extra_attrs: root.attrs,
    };

    let next_id: u64 = take_parsed(&mut live_set, "NextPointeeId")?
        .ok_or_else(|| structure("missing <NextPointeeId>"))?;

    let tracks = match live_set.take_child("Tracks") {
        Some(tracks) => tracks
            .children
            .into_iter()
            .map(|el| {
                if el.name == TrackKind::Master.tag() {
                    return Err(structure("<MasterTrack> inside <Tracks>"));
                }
                track(el)
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let master = live_set
        .take_child(TrackKind::Master.tag())
        .ok_or_else(|| structure("missing <MasterTrack>"))
        .and_then(track)?;

    let mut locators = Vec::new();
    let mut locator_list_attrs = Vec::new();
    let mut locators_extra = Vec::new();
    if let Some(mut outer) = live_set.take_child("Locators") {
        if let Some(inner) = outer.take_child("Locators") {
            locators = inner
                .children
                .into_iter()
                .map(locator)
                .collect::<Result<Vec<_>>>()?;
            locator_list_attrs = inner.attrs;
        }
        locators_extra = outer.children;
    }

    Ok(Document {
        version,
        ids: IdAllocator::new(next_id),
        tracks,
        master,
        locators,
        live_set_attrs: live_set.attrs,
        locator_list_attrs,
        locators_extra,
        extra: live_set.children,
        root_extra: root.children,
    })
}

fn track(mut el: Element) -> Result<Track> {
    let kind = TrackKind::from_tag(&el.name)
        .ok_or_else(|| structure(format!("unknown track type <{}>", el.name)))?;
    let id = take_id(&mut el)?;

    let mut track = Track::new(id, kind, "");
    track.clip_timeline = None;

    if let Some(mut name) = el.take_child("Name") {
        track.name = take_raw(&mut name, "EffectiveName").unwrap_or_default();
        track.user_name = take_raw(&mut name, "UserName");
        track.name_attrs = name.attrs;
        track.name_extra = name.children;
    }
    track.color = take_parsed(&mut el, "Color")?;

    if let Some(mut chain) = el.take_child("DeviceChain") {
        if let Some(mixer_el) = chain.take_child("Mixer") {
            track.mixer = mixer(mixer_el)?;
        }
        if let Some(mut inner) = chain.take_child("DeviceChain") {
            if let Some(devices) = inner.take_child("Devices") {
                track.devices = devices
                    .children
                    .into_iter()
                    .map(device)
                    .collect::<Result<Vec<_>>>()?;
            }
            track.devices_extra = inner.children;
        }
        if kind.has_clips() {
            track.clip_timeline = clip_timeline(&mut chain)?;
        }
        track.chain_extra = chain.children;
    }

    track.extra_attrs = el.attrs;
    track.extra = el.children;
    Ok(track)
}

fn mixer(mut el: Element) -> Result<Mixer> {
    let mut mixer = Mixer::default();
    if let Some(volume) = el.take_child("Volume") {
        mixer.volume = required_parameter(volume)?;
    }
    if let Some(pan) = el.take_child("Pan") {
        mixer.pan = required_parameter(pan)?;
    }
    if let Some(tempo) = el.take_child("Tempo") {
        mixer.tempo = Some(required_parameter(tempo)?);
    }
    if let Some(sends) = el.take_child("Sends") {
        mixer.sends = sends
            .children
            .into_iter()
            .map(send)
            .collect::<Result<Vec<_>>>()?;
    }
    mixer.extra = el.children;
    Ok(mixer)
}

fn send(mut el: Element) -> Result<MixerSend> {
    if el.name != "TrackSendHolder" {
        return Err(structure(format!("unexpected <{}> in <Sends>", el.name)));
    }
    let level = el
        .take_child("Send")
        .ok_or_else(|| structure("<TrackSendHolder> without <Send>"))
        .and_then(required_parameter)?;
    let target = el
        .take_child("ReturnTrack")
        .ok_or_else(|| structure("<TrackSendHolder> without <ReturnTrack>"))?;
    let raw = target.attr("PointeeId").unwrap_or("");
    let return_track = raw.parse().map(Id).map_err(|_| invalid("ReturnTrack", raw))?;
    Ok(MixerSend {
        return_track,
        level,
        extra: el.children,
    })
}

fn device(mut el: Element) -> Result<Device> {
    let id = take_id(&mut el)?;
    let kind = DeviceKind::classify(&el.name, &el.children);

    let (enabled, enabled_extra) = match el.take_child("On") {
        Some(on) => {
            let on = required_parameter(on)?;
            (on.value.as_f64() != 0.0, on.extra)
        }
        None => (true, Vec::new()),
    };

    let mut parameters = Vec::new();
    let mut extra = Vec::new();
    for child in el.children {
        if let Some(err) = non_finite_manual(&child) {
            return Err(err);
        }
        match parameter(child) {
            Ok(param) => parameters.push(param),
            Err(child) => extra.push(child),
        }
    }

    Ok(Device {
        id,
        tag: el.name,
        kind,
        enabled,
        parameters,
        enabled_extra,
        extra_attrs: el.attrs,
        extra,
    })
}

/// Split the elements along `CLIP_PATH` into shells and clips.
///
/// Leaves `chain` untouched when any step of the path is missing.
fn clip_timeline(chain: &mut Element) -> Result<Option<ClipTimeline>> {
    if chain.path(&CLIP_PATH).is_none() {
        return Ok(None);
    }
    let mut levels: Vec<Element> = Vec::with_capacity(CLIP_PATH.len());
    let mut current = chain.take_child(CLIP_PATH[0]);
    for name in &CLIP_PATH[1..] {
        let Some(mut level) = current else {
            return Ok(None);
        };
        current = level.take_child(name);
        levels.push(level);
    }
    let Some(mut events) = current else {
        return Ok(None);
    };

    let mut clips = Vec::new();
    let mut other = Vec::new();
    for child in std::mem::take(&mut events.children) {
        match ClipKind::from_tag(&child.name) {
            Some(kind) => clips.push(clip(child, kind)?),
            None => other.push(child),
        }
    }
    events.children = other;
    levels.push(events);

    let shells: [Element; 4] = levels
        .try_into()
        .map_err(|_| structure("clip path has unexpected depth"))?;
    Ok(Some(ClipTimeline { clips, shells }))
}

fn clip(mut el: Element, kind: ClipKind) -> Result<Clip> {
    let id = take_id(&mut el)?;
    let time = attr_number(&mut el, "Time")?;
    let start = match take_number(&mut el, "CurrentStart")? {
        Some(start) => start,
        None => time.ok_or_else(|| structure(format!("clip {id} without start")))?,
    };
    let end = take_number(&mut el, "CurrentEnd")?
        .ok_or_else(|| structure(format!("clip {id} without CurrentEnd")))?;
    let name = take_raw(&mut el, "Name").unwrap_or_default();
    let color = take_parsed(&mut el, "Color")?;
    let loop_region = el.take_child("Loop").map(loop_region).transpose()?;
    let time_signature = el.take_child("TimeSignature").map(time_signature).transpose()?;

    let mut key_tracks = Vec::new();
    let mut notes_attrs = Vec::new();
    let mut key_tracks_attrs = Vec::new();
    let mut notes_extra = Vec::new();
    if let Some(mut notes) = el.take_child("Notes") {
        if let Some(keys) = notes.take_child("KeyTracks") {
            key_tracks = keys
                .children
                .into_iter()
                .map(key_track)
                .collect::<Result<Vec<_>>>()?;
            key_tracks_attrs = keys.attrs;
        }
        notes_attrs = notes.attrs;
        notes_extra = notes.children;
    }

    Ok(Clip {
        id,
        kind,
        start,
        time: time.unwrap_or(start),
        end,
        name,
        color,
        loop_region,
        time_signature,
        key_tracks,
        notes_attrs,
        key_tracks_attrs,
        notes_extra,
        extra_attrs: el.attrs,
        extra: el.children,
    })
}

fn loop_region(mut el: Element) -> Result<LoopRegion> {
    Ok(LoopRegion {
        id: take_optional_id(&mut el)?,
        start: take_number(&mut el, "LoopStart")?.unwrap_or(0.0),
        end: take_number(&mut el, "LoopEnd")?.unwrap_or(0.0),
        enabled: take_bool(&mut el, "LoopOn")?.unwrap_or(false),
        extra: el.children,
    })
}

fn time_signature(mut el: Element) -> Result<TimeSignature> {
    let mut ts = TimeSignature::new(
        take_optional_id(&mut el)?,
        take_parsed(&mut el, "Numerator")?.unwrap_or(4),
        take_parsed(&mut el, "Denominator")?.unwrap_or(4),
    );
    ts.extra_attrs = el.attrs;
    ts.extra = el.children;
    Ok(ts)
}

fn key_track(mut el: Element) -> Result<KeyTrack> {
    if el.name != "KeyTrack" {
        return Err(structure(format!("unexpected <{}> in <KeyTracks>", el.name)));
    }
    let id = take_id(&mut el)?;
    let pitch = take_parsed(&mut el, "MidiKey")?
        .ok_or_else(|| structure(format!("key track {id} without MidiKey")))?;

    let mut key = KeyTrack::new(id, pitch);
    if let Some(notes) = el.take_child("Notes") {
        for child in notes.children {
            if child.name == "MidiNoteEvent" {
                key.notes.push(note_event(child)?);
            } else {
                key.notes_extra.push(child);
            }
        }
        key.notes_attrs = notes.attrs;
    }
    key.extra = el.children;
    Ok(key)
}

fn note_event(mut el: Element) -> Result<NoteEvent> {
    let mut number = |name: &str| -> Result<f64> {
        attr_number(&mut el, name)?.ok_or_else(|| structure(format!("<MidiNoteEvent> without {name}")))
    };
    let time = number("Time")?;
    let duration = number("Duration")?;
    let velocity = number("Velocity")?;
    let enabled = match el.take_attr("IsEnabled") {
        Some(raw) => parse_bool("IsEnabled", &raw)?,
        None => true,
    };
    Ok(NoteEvent {
        time,
        duration,
        velocity,
        enabled,
        extra_attrs: el.attrs,
    })
}

fn locator(mut el: Element) -> Result<Locator> {
    if el.name != "Locator" {
        return Err(structure(format!("unexpected <{}> in <Locators>", el.name)));
    }
    let id = take_id(&mut el)?;
    let time = take_number(&mut el, "Time")?
        .ok_or_else(|| structure(format!("locator {id} without Time")))?;
    let name = take_raw(&mut el, "Name").unwrap_or_default();
    Ok(Locator {
        id,
        time,
        name,
        extra: el.children,
    })
}
