//! Project file container: gzip-compressed markup
//!
//! Decoding lifts the markup into a [`Document`]; everything the model does not
//! interpret is carried along and written back so that a decode/encode cycle
//! preserves foreign content.

mod read;
mod write;

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::document::Document;
use crate::error::{DecodeError, EncodeError, Result};
use crate::xml;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode a compressed project file.
pub fn decode(bytes: &[u8]) -> Result<Document> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Err(DecodeError::Container("not a gzip stream".into()));
    }
    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(|e| DecodeError::Container(e.to_string()))?;
    let text = String::from_utf8(raw).map_err(|e| DecodeError::Malformed {
        position: e.utf8_error().valid_up_to() as u64,
        message: "markup is not valid UTF-8".into(),
    })?;
    decode_markup(&text)
}

/// Decode uncompressed markup text.
pub fn decode_markup(text: &str) -> Result<Document> {
    let root = xml::parse(text)?;
    let doc = read::document(root)?;
    tracing::debug!(
        tracks = doc.tracks().len(),
        locators = doc.locators().len(),
        next_id = doc.next_id(),
        "Decoded project"
    );
    Ok(doc)
}

/// Encode a document as a compressed project file.
pub fn encode(doc: &Document) -> std::result::Result<Vec<u8>, EncodeError> {
    let text = encode_markup(doc)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Encode a document as uncompressed markup text.
pub fn encode_markup(doc: &Document) -> std::result::Result<String, EncodeError> {
    Ok(xml::write(&write::document(doc))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipDraft, DraftNote};
    use crate::device::{BuiltinDevice, Device};
    use crate::ids::Id;
    use crate::track::TrackKind;

    const FOREIGN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Ableton MajorVersion="5" MinorVersion="11.0_11300" Creator="Test" Revision="abc">
	<LiveSet>
		<NextPointeeId Value="40" />
		<OverwriteProtectionNumber Value="2816" />
		<Tracks>
			<MidiTrack Id="10" SelectedToolPanel="7">
				<LomId Value="0" />
				<Name>
					<EffectiveName Value="Bass" />
					<UserName Value="Bass" />
					<Annotation Value="" />
				</Name>
				<Color Value="5" />
				<DeviceChain>
					<Mixer>
						<Sends>
							<TrackSendHolder>
								<Send><Manual Value="0.25" /><AutomationTarget Id="11" /></Send>
								<ReturnTrack PointeeId="20" />
							</TrackSendHolder>
						</Sends>
						<Speaker><Manual Value="true" /></Speaker>
						<Volume><Manual Value="0.8" /></Volume>
						<Pan><Manual Value="0" /></Pan>
					</Mixer>
					<MainSequencer>
						<ClipSlotList />
						<ClipTimeable>
							<ArrangerAutomation>
								<Events>
									<MidiClip Id="12" Time="0">
										<CurrentStart Value="0" />
										<CurrentEnd Value="16" />
										<Loop Id="13"><LoopStart Value="0" /><LoopEnd Value="16" /><LoopOn Value="true" /></Loop>
										<Name Value="Intro" />
										<Notes>
											<KeyTracks>
												<KeyTrack Id="14">
													<Notes>
														<MidiNoteEvent Time="0" Duration="0.5" Velocity="100" IsEnabled="true" NoteId="1" />
													</Notes>
													<MidiKey Value="36" />
												</KeyTrack>
											</KeyTracks>
											<PerNoteEventStore />
										</Notes>
									</MidiClip>
								</Events>
							</ArrangerAutomation>
						</ClipTimeable>
					</MainSequencer>
					<DeviceChain>
						<Devices>
							<Compressor2 Id="15">
								<On><Manual Value="true" /></On>
								<Ratio><Manual Value="4" /></Ratio>
								<Model Value="1" />
							</Compressor2>
						</Devices>
						<SignalModulations />
					</DeviceChain>
				</DeviceChain>
			</MidiTrack>
			<ReturnTrack Id="20">
				<Name><EffectiveName Value="A-Reverb" /></Name>
				<DeviceChain>
					<Mixer><Sends /><Volume><Manual Value="1" /></Volume><Pan><Manual Value="0" /></Pan></Mixer>
					<DeviceChain><Devices /></DeviceChain>
				</DeviceChain>
			</ReturnTrack>
		</Tracks>
		<MasterTrack Id="30">
			<Name><EffectiveName Value="Master" /></Name>
			<DeviceChain>
				<Mixer>
					<Sends />
					<Volume><Manual Value="1" /></Volume>
					<Pan><Manual Value="0" /></Pan>
					<Tempo><Manual Value="124" /><AutomationTarget Id="31" /></Tempo>
				</Mixer>
				<DeviceChain><Devices /></DeviceChain>
			</DeviceChain>
		</MasterTrack>
		<Locators>
			<Locators>
				<Locator Id="32"><Time Value="0" /><Name Value="Intro" /><Annotation Value="" /></Locator>
			</Locators>
		</Locators>
		<Scenes />
	</LiveSet>
</Ableton>
"#;

    /// Replace the `nth` occurrence of `from` in the fixture
    fn edit_nth(text: &str, from: &str, nth: usize, to: &str) -> String {
        let (at, _) = text.match_indices(from).nth(nth).unwrap();
        format!("{}{to}{}", &text[..at], &text[at + from.len()..])
    }

    fn round_trips(text: &str) -> (Document, String) {
        let doc = decode_markup(text).unwrap();
        let again = decode(&encode(&doc).unwrap()).unwrap();
        assert_eq!(again, doc);
        let written = encode_markup(&again).unwrap();
        (doc, written)
    }

    #[test]
    fn test_decode_foreign_content() {
        let doc = decode_markup(FOREIGN).unwrap();
        assert_eq!(doc.next_id(), 40);
        assert_eq!(doc.tempo(), Some(124.0));
        assert_eq!(doc.tracks().len(), 2);

        let bass = &doc.tracks()[0];
        assert_eq!(bass.kind, TrackKind::Midi);
        assert_eq!(bass.name, "Bass");
        assert_eq!(bass.color, Some(5));
        assert_eq!(bass.mixer.sends.len(), 1);
        assert_eq!(bass.mixer.sends[0].return_track.0, 20);
        assert_eq!(bass.devices[0].param_value("Ratio"), Some(4.0));
        assert_eq!(bass.clips().len(), 1);
        assert_eq!(bass.clips()[0].note_count(), 1);
        assert_eq!(doc.locators()[0].name, "Intro");
    }

    #[test]
    fn test_round_trip_preserves_foreign_content() {
        let doc = decode_markup(FOREIGN).unwrap();
        let bytes = encode(&doc).unwrap();
        let again = decode(&bytes).unwrap();
        assert_eq!(again, doc);

        let text = encode_markup(&again).unwrap();
        for marker in ["OverwriteProtectionNumber", "SelectedToolPanel", "PerNoteEventStore", "NoteId", "Revision", "Scenes", "SignalModulations"] {
            assert!(text.contains(marker), "lost {marker}");
        }
    }

    #[test]
    fn test_round_trip_of_edited_document() {
        let mut doc = Document::empty();
        let bass = doc.add_track(TrackKind::Midi, "Bass").unwrap();
        doc.add_track(TrackKind::Return, "A-Reverb").unwrap();
        let device = Device::new(doc.allocate_id(), BuiltinDevice::Compressor)
            .with_param("Ratio", 4.0)
            .disabled();
        doc.track_mut(bass).unwrap().devices.push(device);
        let notes = [DraftNote { pitch: 36, time: 0.0, duration: 0.25, velocity: 110 }];
        doc.insert_clip(bass, ClipDraft::new("Groove", 8.0, 12.5).with_notes(notes))
            .unwrap();
        doc.add_locator(8.0, "Verse");
        doc.set_tempo(97.5).unwrap();

        let again = decode(&encode(&doc).unwrap()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_not_gzip_is_container_error() {
        let err = decode(b"<Ableton/>").unwrap_err();
        assert!(matches!(err, DecodeError::Container(_)));
        let err = decode(&[0x1f, 0x8b, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::Container(_)));
    }

    #[test]
    fn test_unsupported_version() {
        let text = FOREIGN.replace("MajorVersion=\"5\"", "MajorVersion=\"4\"");
        let err = decode_markup(&text).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion(v) if v == "4"));
    }

    #[test]
    fn test_truncated_markup_is_malformed() {
        let err = decode_markup(&FOREIGN[..FOREIGN.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_missing_master_is_structure_error() {
        let start = FOREIGN.find("<MasterTrack").unwrap();
        let end = FOREIGN.find("</MasterTrack>").unwrap() + "</MasterTrack>".len();
        let text = format!("{}{}", &FOREIGN[..start], &FOREIGN[end..]);
        let err = decode_markup(&text).unwrap_err();
        assert!(matches!(err, DecodeError::Structure(_)));
    }

    #[test]
    fn test_bad_number_is_invalid_value() {
        let text = FOREIGN.replace("<Color Value=\"5\" />", "<Color Value=\"red\" />");
        let err = decode_markup(&text).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { .. }));
    }

    #[test]
    fn test_time_signature_keeps_foreign_content() {
        let signature = concat!(
            r#"<TimeSignature Id="96" Flavor="compound"><Numerator Value="6" /><Denominator Value="8" />"#,
            r#"<TimeSignatures><RemoteableTimeSignature Id="97"><Numerator Value="6" /></RemoteableTimeSignature></TimeSignatures>"#,
            "</TimeSignature>",
        );
        let text = edit_nth(FOREIGN, r#"<Name Value="Intro" />"#, 0, &format!(r#"<Name Value="Intro" />{signature}"#));
        let (doc, written) = round_trips(&text);

        let ts = doc.tracks()[0].clips()[0].time_signature.as_ref().unwrap();
        assert_eq!((ts.numerator, ts.denominator), (6, 8));
        assert_eq!(ts.extra_attrs, vec![("Flavor".to_string(), "compound".to_string())]);
        assert!(doc.id_index().contains(Id(96)));
        assert!(doc.id_index().contains(Id(97)));
        assert!(written.contains("RemoteableTimeSignature"));
        assert!(written.contains(r#"Flavor="compound""#));
    }

    #[test]
    fn test_clip_time_differing_from_start_survives() {
        let text = FOREIGN.replace(r#"<MidiClip Id="12" Time="0">"#, r#"<MidiClip Id="12" Time="2">"#);
        let (doc, written) = round_trips(&text);
        let clip = &doc.tracks()[0].clips()[0];
        assert_eq!(clip.start, 0.0);
        assert_eq!(clip.time, 2.0);
        assert!(written.contains(r#"Time="2""#));
    }

    #[test]
    fn test_wrapper_attributes_survive() {
        let text = edit_nth(FOREIGN, "<Name>", 0, r#"<Name Source="user">"#);
        let text = edit_nth(&text, "<Locators>", 1, r#"<Locators Sorted="true">"#);
        let text = edit_nth(&text, "<Notes>", 0, r#"<Notes Layout="piano">"#);
        let text = edit_nth(&text, "<KeyTracks>", 0, r#"<KeyTracks Folded="false">"#);
        // The clip's `Notes` is already edited, so the key track's is now the first
        let text = edit_nth(&text, "<Notes>", 0, r#"<Notes Layout="lane">"#);
        let (doc, written) = round_trips(&text);

        assert_eq!(doc.tracks()[0].name_attrs, vec![("Source".to_string(), "user".to_string())]);
        assert_eq!(doc.locator_list_attrs, vec![("Sorted".to_string(), "true".to_string())]);
        let clip = &doc.tracks()[0].clips()[0];
        assert_eq!(clip.notes_attrs, vec![("Layout".to_string(), "piano".to_string())]);
        assert_eq!(clip.key_tracks_attrs, vec![("Folded".to_string(), "false".to_string())]);
        assert_eq!(clip.key_tracks[0].notes_attrs, vec![("Layout".to_string(), "lane".to_string())]);
        for marker in [r#"Source="user""#, r#"Sorted="true""#, r#"Layout="piano""#, r#"Folded="false""#, r#"Layout="lane""#] {
            assert!(written.contains(marker), "lost {marker}");
        }
    }

    #[test]
    fn test_foreign_note_children_stay_inside_notes() {
        let text = FOREIGN.replace(
            r#"<MidiNoteEvent Time="0""#,
            r#"<NoteGroup Id="98" /><MidiNoteEvent Time="0""#,
        );
        let (doc, _) = round_trips(&text);
        let key = &doc.tracks()[0].clips()[0].key_tracks[0];
        assert_eq!(key.notes.len(), 1);
        assert_eq!(key.notes_extra.len(), 1);
        assert_eq!(key.notes_extra[0].name, "NoteGroup");
        assert!(key.extra.is_empty());
        assert!(doc.id_index().contains(Id(98)));
    }

    #[test]
    fn test_non_finite_numbers_are_invalid_values() {
        let cases = [
            (r#"<Ratio><Manual Value="4" />"#, r#"<Ratio><Manual Value="NaN" />"#),
            (r#"<Volume><Manual Value="0.8" />"#, r#"<Volume><Manual Value="inf" />"#),
            (r#"Velocity="100""#, r#"Velocity="NaN""#),
            (r#"<CurrentEnd Value="16" />"#, r#"<CurrentEnd Value="-inf" />"#),
            (r#"<Time Value="0" />"#, r#"<Time Value="nan" />"#),
        ];
        for (from, to) in cases {
            let text = FOREIGN.replace(from, to);
            let err = decode_markup(&text).unwrap_err();
            assert!(matches!(err, DecodeError::InvalidValue { .. }), "{to}: {err:?}");
        }
    }
}
