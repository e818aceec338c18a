// End-to-end: MIDI file on disk -> collection -> melody -> n-grams

use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tunegram::{extract_ngrams, MelodyCollection};

const TICKS_PER_BEAT: u16 = 96;

/// Write a single-track SMF where each note is (pitch, gap before onset,
/// duration), all in ticks.
fn write_midi(path: &std::path::Path, notes: &[(u8, u32, u32)]) {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    ));

    let mut track = Vec::new();
    for &(pitch, gap, duration) in notes {
        track.push(TrackEvent {
            delta: u28::new(gap),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn { key: u7::new(pitch), vel: u7::new(64) },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(duration),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff { key: u7::new(pitch), vel: u7::new(0) },
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);
    smf.save(path).unwrap();
}

/// A 22-note tune in which note 12 sounds after a rest covering two thirds
/// of its span: the previous note ends at tick 672, the note occupies ticks
/// 768..816, so gap/span = 96/144.
fn reference_tune() -> Vec<(u8, u32, u32)> {
    let pitches: [u8; 22] = [
        71, 71, 74, 74, 72, 69, 67, 69, 71, 72, 69, 72, 72, 71, 71, 76, 74, 74, 72, 71, 69, 67,
    ];
    let durations: [u32; 22] = [
        48, 48, 48, 48, 96, 96, 48, 48, 48, 48, 96, 48, 48, 48, 48, 96, 96, 48, 48, 48, 48, 96,
    ];

    pitches
        .iter()
        .zip(durations)
        .enumerate()
        .map(|(i, (&pitch, duration))| {
            let gap = if i == 11 { 96 } else { 0 };
            (pitch, gap, duration)
        })
        .collect()
}

#[test]
fn rest_fractions_and_six_grams_from_disk() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    write_midi(&dir.path().join("0A2A.mid"), &reference_tune());

    let collection = MelodyCollection::load(dir.path(), None).unwrap();
    assert_eq!(collection.len(), 1);

    let melody = collection.get("0A2A").unwrap();
    assert_eq!(melody.len(), 22);

    // Ticks normalize to quarter-note units at 96 ticks per beat
    assert_eq!(melody.notes()[0].duration, 0.5);
    assert_eq!(melody.notes()[4].duration, 1.0);

    // Only the note after the rest carries a nonzero rest fraction
    for (i, note) in melody.notes().iter().enumerate() {
        if i == 11 {
            assert_eq!(note.rest_fraction, 1.0 / 1.5);
            assert_eq!(note.pitch, 72);
        } else {
            assert_eq!(note.rest_fraction, 0.0, "note {i}");
        }
    }

    let ngrams = extract_ngrams(melody, 6);
    assert_eq!(ngrams.len(), 17);
    for ngram in &ngrams {
        assert_eq!(ngram.len(), 6);
    }

    assert_eq!(
        ngrams[6].to_string(),
        "{67,0.5,0.0}{69,0.5,0.0}{71,0.5,0.0}{72,0.5,0.0}{69,1.0,0.0}{72,0.5,0.6666666666666666}"
    );
}

#[test]
fn equal_phrases_in_different_files_produce_equal_ngrams() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    let phrase: [(u8, u32, u32); 4] = [(60, 0, 48), (64, 0, 48), (67, 0, 96), (72, 0, 48)];

    // Same phrase, but shifted in time by a leading rest in the second file
    write_midi(&dir.path().join("plain.mid"), &phrase);
    let mut shifted = phrase;
    shifted[0].1 = 192;
    write_midi(&dir.path().join("shifted.mid"), &shifted);

    let collection = MelodyCollection::load(dir.path(), None).unwrap();
    let plain = extract_ngrams(collection.get("plain").unwrap(), 4);
    let shifted = extract_ngrams(collection.get("shifted").unwrap(), 4);

    // Onset offsets differ, but equality and the canonical key ignore onset
    assert_eq!(plain[0], shifted[0]);
    assert_eq!(plain[0].to_string(), shifted[0].to_string());
}

#[test]
fn null_span_flattens_pitch_across_the_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    write_midi(
        &dir.path().join("tune.mid"),
        &[(60, 0, 48), (64, 0, 96), (67, 48, 48)],
    );

    let collection = MelodyCollection::load(dir.path(), None).unwrap();
    let melody = collection.get("tune").unwrap();
    let ngram = extract_ngrams(melody, 3).remove(0);
    let null = ngram.null_span();

    assert!(null.notes().iter().all(|n| n.pitch == 60));
    // Rhythm survives: durations and the rest before the third note
    assert_eq!(null.notes()[1].duration, 1.0);
    assert!(null.notes()[2].rest_fraction > 0.0);
    assert_eq!(null.null_span(), null);
}
