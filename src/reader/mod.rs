// Format readers: file dispatch and raw-event ingestion

pub mod abc;
pub mod midi;

pub use abc::AbcReader;
pub use midi::MidiReader;

use std::cmp::Ordering;
use std::path::Path;

use crate::melody::{Melody, Note};

/// A decoded note event before rest fractions are known.
///
/// Onset and duration are in quarter-note units, as produced by the format
/// glue (ticks divided by ticks-per-beat for MIDI, note-length arithmetic
/// for ABC).
#[derive(Debug, Clone, Copy)]
pub struct RawNote {
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
}

/// A format-specific melody reader.
///
/// `accept` is a pure check on the file name (extension-based); `read`
/// decodes the file into a melody and may fail with a format-specific parse
/// error. The collection loader catches and logs such errors per file;
/// direct callers see them as-is.
pub trait MelodyReader {
    fn accept(&self, file_name: &str) -> bool;

    fn read(&self, melody_id: &str, path: &Path) -> anyhow::Result<Melody>;
}

/// The registered reader set, consulted in order; first `accept` wins.
pub fn default_readers() -> Vec<Box<dyn MelodyReader>> {
    vec![Box::new(MidiReader), Box::new(AbcReader)]
}

/// Build a melody's note sequence from raw events.
///
/// Events are sorted ascending by onset, then each note's rest fraction is
/// derived from the gap between it and the end of the previous event:
///
/// ```text
/// span = end_i - last_off      (end-to-end time span)
/// gap  = onset_i - last_off    (silence before this note starts)
/// rest_fraction = gap / span   when span > 0, else 0.0
/// ```
///
/// The first note always gets 0.0. Overlapping or zero-length timing makes
/// the span non-positive; those notes also get 0.0 rather than an error, so
/// malformed symbolic timing degrades instead of aborting ingestion.
pub fn derive_notes(mut events: Vec<RawNote>) -> Vec<Note> {
    events.sort_by(|a, b| a.onset.partial_cmp(&b.onset).unwrap_or(Ordering::Equal));

    let mut notes = Vec::with_capacity(events.len());
    let mut last_off = 0.0f64;

    for (i, event) in events.iter().enumerate() {
        let end = event.onset + event.duration;

        let rest_fraction = if i == 0 {
            0.0
        } else {
            let span = end - last_off;
            let gap = event.onset - last_off;
            if span > 0.0 { gap / span } else { 0.0 }
        };

        notes.push(Note::new(event.pitch, event.onset, event.duration, rest_fraction));
        last_off = end;
    }

    notes
}

/// `derive_notes` appended onto a fresh melody with the given id.
pub fn melody_from_events(melody_id: &str, events: Vec<RawNote>) -> Melody {
    let mut melody = Melody::new(melody_id);
    for note in derive_notes(events) {
        melody.add_note(note);
    }
    melody
}
