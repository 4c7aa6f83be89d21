//! Lowering the document model back into a markup tree

use crate::clip::{Clip, ClipKind, KeyTrack, LoopRegion, NoteEvent, TimeSignature};
use crate::device::{Device, Parameter};
use crate::document::Document;
use crate::locator::Locator;
use crate::track::{ClipTimeline, Mixer, MixerSend, Track};
use crate::xml::Element;

fn cloned(elements: &[Element]) -> impl Iterator<Item = Element> + '_ {
    elements.iter().cloned()
}

fn parameter(param: &Parameter) -> Element {
    Element::manual(param.name.as_str(), param.value).with_children(cloned(&param.extra))
}

pub(super) fn document(doc: &Document) -> Element {
    let mut root = Element::new("Ableton")
        .with_attr("MajorVersion", &doc.version.major)
        .with_attr("MinorVersion", &doc.version.minor);
    if let Some(creator) = &doc.version.creator {
        root.set_attr("Creator", creator);
    }
    root.attrs.extend(doc.version.extra_attrs.iter().cloned());

    let mut live_set = Element::new("LiveSet");
    live_set.attrs = doc.live_set_attrs.clone();
    live_set.children.push(Element::leaf("NextPointeeId", doc.ids.peek()));
    live_set
        .children
        .push(Element::new("Tracks").with_children(doc.tracks.iter().map(track)));
    live_set.children.push(track(&doc.master));
    let mut locator_list = Element::new("Locators").with_children(doc.locators.iter().map(locator));
    locator_list.attrs = doc.locator_list_attrs.clone();
    live_set.children.push(
        Element::new("Locators")
            .with_child(locator_list)
            .with_children(cloned(&doc.locators_extra)),
    );
    live_set.children.extend(cloned(&doc.extra));

    root.children.push(live_set);
    root.children.extend(cloned(&doc.root_extra));
    root
}

fn track(track: &Track) -> Element {
    let mut el = Element::new(track.kind.tag()).with_attr("Id", track.id);
    el.attrs.extend(track.extra_attrs.iter().cloned());

    let mut name = Element::new("Name").with_child(Element::leaf("EffectiveName", &track.name));
    name.attrs = track.name_attrs.clone();
    if let Some(user) = &track.user_name {
        name.children.push(Element::leaf("UserName", user));
    }
    name.children.extend(cloned(&track.name_extra));
    el.children.push(name);

    if let Some(color) = track.color {
        el.children.push(Element::leaf("Color", color));
    }

    let mut chain = Element::new("DeviceChain").with_child(mixer(&track.mixer));
    if let Some(timeline) = &track.clip_timeline {
        chain.children.push(clip_timeline(timeline));
    }
    chain.children.push(
        Element::new("DeviceChain")
            .with_child(Element::new("Devices").with_children(track.devices.iter().map(device)))
            .with_children(cloned(&track.devices_extra)),
    );
    chain.children.extend(cloned(&track.chain_extra));
    el.children.push(chain);

    el.children.extend(cloned(&track.extra));
    el
}

fn mixer(mixer: &Mixer) -> Element {
    let mut el = Element::new("Mixer")
        .with_child(Element::new("Sends").with_children(mixer.sends.iter().map(send)))
        .with_child(parameter(&mixer.volume))
        .with_child(parameter(&mixer.pan));
    if let Some(tempo) = &mixer.tempo {
        el.children.push(parameter(tempo));
    }
    el.with_children(cloned(&mixer.extra))
}

fn send(send: &MixerSend) -> Element {
    Element::new("TrackSendHolder")
        .with_child(parameter(&send.level))
        .with_child(Element::new("ReturnTrack").with_attr("PointeeId", send.return_track))
        .with_children(cloned(&send.extra))
}

fn device(device: &Device) -> Element {
    let mut el = Element::new(device.tag.as_str()).with_attr("Id", device.id);
    el.attrs.extend(device.extra_attrs.iter().cloned());
    el.with_child(Element::manual("On", device.enabled).with_children(cloned(&device.enabled_extra)))
        .with_children(device.parameters.iter().map(parameter))
        .with_children(cloned(&device.extra))
}

/// Re-nest the shells along the clip path with the clips at the bottom
fn clip_timeline(timeline: &ClipTimeline) -> Element {
    let [sequencer, timeable, arranger, events] = &timeline.shells;

    let mut nested = events.clone();
    let extra_events = std::mem::take(&mut nested.children);
    nested.children = timeline.clips.iter().map(clip).chain(extra_events).collect();

    for shell in [arranger, timeable, sequencer] {
        nested = shell.clone().with_child(nested);
    }
    nested
}

fn clip(clip: &Clip) -> Element {
    let mut el = Element::new(clip.kind.tag())
        .with_attr("Id", clip.id)
        .with_attr("Time", clip.time);
    el.attrs.extend(clip.extra_attrs.iter().cloned());

    el.children.push(Element::leaf("CurrentStart", clip.start));
    el.children.push(Element::leaf("CurrentEnd", clip.end));
    if let Some(region) = &clip.loop_region {
        el.children.push(loop_region(region));
    }
    el.children.push(Element::leaf("Name", &clip.name));
    if let Some(color) = clip.color {
        el.children.push(Element::leaf("Color", color));
    }
    if let Some(ts) = &clip.time_signature {
        el.children.push(time_signature(ts));
    }
    if clip.kind == ClipKind::Midi || !clip.key_tracks.is_empty() || !clip.notes_extra.is_empty() {
        let mut keys = Element::new("KeyTracks").with_children(clip.key_tracks.iter().map(key_track));
        keys.attrs = clip.key_tracks_attrs.clone();
        let mut notes = Element::new("Notes")
            .with_child(keys)
            .with_children(cloned(&clip.notes_extra));
        notes.attrs = clip.notes_attrs.clone();
        el.children.push(notes);
    }
    el.with_children(cloned(&clip.extra))
}

fn loop_region(region: &LoopRegion) -> Element {
    let mut el = Element::new("Loop");
    if let Some(id) = region.id {
        el.set_attr("Id", id);
    }
    el.with_child(Element::leaf("LoopStart", region.start))
        .with_child(Element::leaf("LoopEnd", region.end))
        .with_child(Element::leaf("LoopOn", region.enabled))
        .with_children(cloned(&region.extra))
}

fn time_signature(ts: &TimeSignature) -> Element {
    let mut el = Element::new("TimeSignature");
    if let Some(id) = ts.id {
        el.set_attr("Id", id);
    }
    el.attrs.extend(ts.extra_attrs.iter().cloned());
    el.with_child(Element::leaf("Numerator", ts.numerator))
        .with_child(Element::leaf("Denominator", ts.denominator))
        .with_children(cloned(&ts.extra))
}

fn key_track(key: &KeyTrack) -> Element {
    let mut notes = Element::new("Notes")
        .with_children(key.notes.iter().map(note_event))
        .with_children(cloned(&key.notes_extra));
    notes.attrs = key.notes_attrs.clone();
    Element::new("KeyTrack")
        .with_attr("Id", key.id)
        .with_child(notes)
        .with_child(Element::leaf("MidiKey", key.pitch))
        .with_children(cloned(&key.extra))
}

fn note_event(note: &NoteEvent) -> Element {
    let mut el = Element::new("MidiNoteEvent")
        .with_attr("Time", note.time)
        .with_attr("Duration", note.duration)
        .with_attr("Velocity", note.velocity)
        .with_attr("IsEnabled", note.enabled);
    el.attrs.extend(note.extra_attrs.iter().cloned());
    el
}

fn locator(locator: &Locator) -> Element {
    Element::new("Locator")
        .with_attr("Id", locator.id)
        .with_child(Element::leaf("Time", locator.time))
        .with_child(Element::leaf("Name", &locator.name))
        .with_children(cloned(&locator.extra))
}
