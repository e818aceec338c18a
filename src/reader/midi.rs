// MIDI melody reader built on midly

use std::collections::HashMap;
use std::path::Path;

use crate::melody::Melody;

use super::{melody_from_events, MelodyReader, RawNote};

/// Reads the melodic line of a Standard MIDI File.
///
/// The track with the most note events is taken as the melody. Simultaneous
/// onsets are collapsed to the highest pitch, so the result is strictly
/// monophonic. Tick times are normalized to quarter-note units using the
/// header's ticks-per-beat.
pub struct MidiReader;

/// Fallback resolution when the header timing is not metrical.
const DEFAULT_TICKS_PER_BEAT: u16 = 480;

#[derive(Debug, Clone, Copy)]
struct TickNote {
    pitch: u8,
    start_tick: u64,
    duration_ticks: u64,
}

impl MelodyReader for MidiReader {
    fn accept(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        lower.ends_with(".mid") || lower.ends_with(".midi")
    }

    fn read(&self, melody_id: &str, path: &Path) -> anyhow::Result<Melody> {
        let data = std::fs::read(path)?;
        let smf = midly::Smf::parse(&data)?;

        let mut ticks_per_beat = DEFAULT_TICKS_PER_BEAT;
        if let midly::Timing::Metrical(tpb) = smf.header.timing {
            ticks_per_beat = tpb.as_int();
        }

        // Decode every track, then keep the one with the most note events.
        let mut melody_track: Vec<TickNote> = Vec::new();
        for track in &smf.tracks {
            let decoded = decode_track(track);
            if decoded.len() > melody_track.len() {
                melody_track = decoded;
            }
        }

        let events = monophonic_events(melody_track, ticks_per_beat);
        Ok(melody_from_events(melody_id, events))
    }
}

/// Pair note-on/note-off messages in one track into timed notes.
///
/// Note-on with velocity 0 counts as note-off. A re-struck pitch closes the
/// note already sounding on that key. Notes still open when the track ends
/// are closed at the final tick.
fn decode_track(track: &[midly::TrackEvent<'_>]) -> Vec<TickNote> {
    let mut notes: Vec<TickNote> = Vec::new();
    let mut current_tick: u64 = 0;
    // Active notes: (pitch, channel) -> start_tick
    let mut active_notes: HashMap<(u8, u8), u64> = HashMap::new();

    for event in track {
        current_tick += event.delta.as_int() as u64;

        if let midly::TrackEventKind::Midi { channel, message } = event.kind {
            let ch = channel.as_int();

            match message {
                midly::MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    let pitch = key.as_int();
                    if let Some(start) = active_notes.remove(&(pitch, ch)) {
                        notes.push(TickNote {
                            pitch,
                            start_tick: start,
                            duration_ticks: current_tick.saturating_sub(start),
                        });
                    }
                    active_notes.insert((pitch, ch), current_tick);
                }
                midly::MidiMessage::NoteOn { key, .. } | midly::MidiMessage::NoteOff { key, .. } => {
                    let pitch = key.as_int();
                    if let Some(start) = active_notes.remove(&(pitch, ch)) {
                        notes.push(TickNote {
                            pitch,
                            start_tick: start,
                            duration_ticks: current_tick.saturating_sub(start),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    for ((pitch, _ch), start) in active_notes.drain() {
        notes.push(TickNote {
            pitch,
            start_tick: start,
            duration_ticks: current_tick.saturating_sub(start),
        });
    }

    notes
}

/// Collapse simultaneous onsets to the highest pitch and normalize ticks to
/// quarter-note units.
fn monophonic_events(mut notes: Vec<TickNote>, ticks_per_beat: u16) -> Vec<RawNote> {
    // Sort by onset, highest pitch first within an onset, then keep the
    // first note of each onset run.
    notes.sort_by(|a, b| {
        a.start_tick
            .cmp(&b.start_tick)
            .then(b.pitch.cmp(&a.pitch))
    });
    notes.dedup_by(|later, first| later.start_tick == first.start_tick);

    let tpb = ticks_per_beat.max(1) as f64;
    notes
        .into_iter()
        .map(|n| RawNote {
            pitch: n.pitch,
            onset: n.start_tick as f64 / tpb,
            duration: n.duration_ticks as f64 / tpb,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

    fn note_on(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(64) },
            },
        }
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) },
            },
        }
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn write_smf(smf: &Smf<'_>, dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        smf.save(&path).unwrap();
        path
    }

    #[test]
    fn reads_sequential_notes_in_quarter_units() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))));
        smf.tracks.push(vec![
            note_on(0, 60),
            note_off(48, 60),
            note_on(0, 62),
            note_off(96, 62),
            end_of_track(),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = write_smf(&smf, &dir, "two_notes.mid");
        let melody = MidiReader.read("two_notes", &path).unwrap();

        assert_eq!(melody.len(), 2);
        let notes = melody.notes();
        assert_eq!(notes[0].pitch, 60);
        assert_eq!(notes[0].onset, 0.0);
        assert_eq!(notes[0].duration, 0.5);
        assert_eq!(notes[1].pitch, 62);
        assert_eq!(notes[1].onset, 0.5);
        assert_eq!(notes[1].duration, 1.0);
    }

    #[test]
    fn picks_track_with_most_note_events() {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(96))));
        // Sparse accompaniment track
        smf.tracks.push(vec![note_on(0, 40), note_off(96, 40), end_of_track()]);
        // Busier melody track
        smf.tracks.push(vec![
            note_on(0, 72),
            note_off(48, 72),
            note_on(0, 74),
            note_off(48, 74),
            note_on(0, 76),
            note_off(48, 76),
            end_of_track(),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = write_smf(&smf, &dir, "two_tracks.mid");
        let melody = MidiReader.read("two_tracks", &path).unwrap();

        let pitches: Vec<u8> = melody.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![72, 74, 76]);
    }

    #[test]
    fn collapses_chords_to_highest_pitch() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))));
        smf.tracks.push(vec![
            // C major triad struck together, then one single note
            note_on(0, 60),
            note_on(0, 64),
            note_on(0, 67),
            note_off(96, 60),
            note_off(0, 64),
            note_off(0, 67),
            note_on(0, 62),
            note_off(96, 62),
            end_of_track(),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = write_smf(&smf, &dir, "chord.mid");
        let melody = MidiReader.read("chord", &path).unwrap();

        let pitches: Vec<u8> = melody.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![67, 62]);
    }

    #[test]
    fn velocity_zero_note_on_ends_the_note() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(96))));
        smf.tracks.push(vec![
            note_on(0, 60),
            TrackEvent {
                delta: u28::new(48),
                kind: TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(0) },
                },
            },
            end_of_track(),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = write_smf(&smf, &dir, "vel_zero.mid");
        let melody = MidiReader.read("vel_zero", &path).unwrap();

        assert_eq!(melody.len(), 1);
        assert_eq!(melody.notes()[0].duration, 0.5);
    }

    #[test]
    fn accepts_midi_extensions_case_insensitively() {
        assert!(MidiReader.accept("tune.mid"));
        assert!(MidiReader.accept("TUNE.MIDI"));
        assert!(MidiReader.accept("Tune.Mid"));
        assert!(!MidiReader.accept("tune.abc"));
        assert!(!MidiReader.accept("tune.midx"));
    }

    #[test]
    fn rejects_garbage_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mid");
        std::fs::write(&path, b"not a midi file").unwrap();
        assert!(MidiReader.read("broken", &path).is_err());
    }
}
