// ABC notation melody reader

use std::collections::HashMap;
use std::path::Path;

use anyhow::bail;

use crate::melody::Melody;

use super::{melody_from_events, MelodyReader, RawNote};

/// Reads the tune body of an ABC file into a monophonic note sequence.
///
/// Covers the note-level subset needed for melodic analysis: default note
/// length (`L:`), key signatures (`K:`, including modes), inline accidentals
/// with measure persistence, octave marks, duration multipliers and
/// divisors, broken rhythm, tuplets, and rests. Chords (`[...]`) are dropped
/// as units while their duration still advances the time cursor. Decorations,
/// slurs, grace notes, and chord symbols are skipped. Only the first tune of
/// a multi-tune file is read.
pub struct AbcReader;

impl MelodyReader for AbcReader {
    fn accept(&self, file_name: &str) -> bool {
        file_name.to_lowercase().ends_with(".abc")
    }

    fn read(&self, melody_id: &str, path: &Path) -> anyhow::Result<Melody> {
        let text = std::fs::read_to_string(path)?;
        let events = parse_tune(&text)?;
        Ok(melody_from_events(melody_id, events))
    }
}

/// Sharps are added in this order as the key signature grows; flats in
/// reverse.
const SHARP_ORDER: [char; 7] = ['F', 'C', 'G', 'D', 'A', 'E', 'B'];

struct TuneState {
    /// Quarter-note units per default-length note (L: header)
    unit: f64,
    key_accidentals: HashMap<char, i32>,
    /// Inline accidentals persist to the end of the measure, per letter and
    /// octave
    measure_accidentals: HashMap<(char, i32), i32>,
    cursor: f64,
    events: Vec<RawNote>,
    /// Duration factor carried onto the next note by broken rhythm (> <)
    carry_factor: f64,
    /// Remaining notes and duration factor of an open tuplet
    tuplet: Option<(u32, f64)>,
}

impl TuneState {
    fn new() -> Self {
        Self {
            unit: 0.5, // L:1/8
            key_accidentals: HashMap::new(),
            measure_accidentals: HashMap::new(),
            cursor: 0.0,
            events: Vec::new(),
            carry_factor: 1.0,
            tuplet: None,
        }
    }

    /// Consume the per-note factors (tuplet membership, broken-rhythm carry)
    /// that apply to the next note or rest.
    fn take_factors(&mut self) -> f64 {
        let mut factor = self.carry_factor;
        self.carry_factor = 1.0;
        if let Some((remaining, tuplet_factor)) = self.tuplet {
            factor *= tuplet_factor;
            self.tuplet = if remaining > 1 { Some((remaining - 1, tuplet_factor)) } else { None };
        }
        factor
    }
}

fn parse_tune(text: &str) -> anyhow::Result<Vec<RawNote>> {
    let mut state = TuneState::new();
    let mut in_body = false;

    for raw_line in text.lines() {
        let line = raw_line.split('%').next().unwrap_or("").trim_end();
        if line.trim().is_empty() {
            if in_body {
                break; // blank line ends the tune
            }
            continue;
        }

        if let Some((field, value)) = header_field(line) {
            match field {
                'X' if in_body => break, // next tune in the file
                'L' => state.unit = parse_unit_length(value)?,
                'K' => {
                    state.key_accidentals = key_signature(value)?;
                    in_body = true;
                }
                _ => {}
            }
            continue;
        }

        if in_body {
            parse_music_line(line, &mut state)?;
        }
    }

    if !in_body {
        bail!("tune has no key (K:) header");
    }
    Ok(state.events)
}

/// `X:1`-style header line, returned as (field letter, value).
fn header_field(line: &str) -> Option<(char, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some((bytes[0] as char, line[2..].trim()))
    } else {
        None
    }
}

/// `L:` value like `1/8`, in quarter-note units.
fn parse_unit_length(value: &str) -> anyhow::Result<f64> {
    let (num, den) = match value.split_once('/') {
        Some((n, d)) => (n.trim().parse::<u32>()?, d.trim().parse::<u32>()?),
        None => (value.trim().parse::<u32>()?, 1),
    };
    if den == 0 {
        bail!("invalid unit note length: {value}");
    }
    Ok(4.0 * num as f64 / den as f64)
}

/// Accidental map for a `K:` value such as `D`, `Bb`, `F#m`, `Ador`.
fn key_signature(value: &str) -> anyhow::Result<HashMap<char, i32>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Ok(HashMap::new());
    }

    let mut chars = value.chars().peekable();
    let tonic = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() && ('A'..='G').contains(&c.to_ascii_uppercase()) => {
            c.to_ascii_uppercase()
        }
        _ => bail!("unrecognized key: {value}"),
    };

    // Sharps in the major key of each tonic letter
    let base = match tonic {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => -1,
        'G' => 1,
        'A' => 3,
        'B' => 5,
        _ => unreachable!(),
    };

    let tonic_accidental = match chars.peek() {
        Some('#') => {
            chars.next();
            7
        }
        Some('b') => {
            chars.next();
            -7
        }
        _ => 0,
    };

    let mode: String = chars
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_lowercase();
    let mode_shift = match mode.as_str() {
        "" | "maj" | "ion" => 0,
        "lyd" => 1,
        "mix" => -1,
        "dor" => -2,
        "m" | "min" | "aeo" => -3,
        "phr" => -4,
        "loc" => -5,
        other => bail!("unrecognized mode '{other}' in key: {value}"),
    };

    let sharps = (base + tonic_accidental + mode_shift).clamp(-7, 7);
    let mut map = HashMap::new();
    if sharps > 0 {
        for &letter in SHARP_ORDER.iter().take(sharps as usize) {
            map.insert(letter, 1);
        }
    } else if sharps < 0 {
        for &letter in SHARP_ORDER.iter().rev().take(-sharps as usize) {
            map.insert(letter, -1);
        }
    }
    Ok(map)
}

fn parse_music_line(line: &str, state: &mut TuneState) -> anyhow::Result<()> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' => i += 1,
            '|' | ':' => {
                state.measure_accidentals.clear();
                i += 1;
            }
            '"' => i = skip_delimited(&chars, i, '"'),
            '!' => i = skip_delimited(&chars, i, '!'),
            '{' => i = skip_delimited(&chars, i, '}'),
            '(' => {
                // Tuplet marker when a digit follows, otherwise a slur
                if let Some(&digit) = chars.get(i + 1).filter(|c| c.is_ascii_digit()) {
                    let p = digit.to_digit(10).unwrap();
                    // p notes in the time of q; q defaults per the ABC standard
                    let q = match p {
                        3 | 6 => 2,
                        2 | 4 | 8 => 3,
                        _ => 2,
                    };
                    state.tuplet = Some((p, q as f64 / p as f64));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            '>' | '<' => {
                i += apply_broken_rhythm(&chars[i..], state);
            }
            '[' => i = parse_bracket(&chars, i, state)?,
            'z' | 'x' | 'Z' => {
                i += 1;
                let (len, used) = parse_length(&chars[i..]);
                i += used;
                state.cursor += state.unit * len * state.take_factors();
            }
            c if is_note_start(c) => {
                let (note, used) = parse_note(&chars[i..], state)?;
                i += used;
                let factor = state.take_factors();
                let duration = note.duration * factor;
                state.events.push(RawNote {
                    pitch: note.pitch,
                    onset: state.cursor,
                    duration,
                });
                state.cursor += duration;
            }
            // Ties, slur ends, decorations, spacers, repeat digits
            _ => i += 1,
        }
    }
    Ok(())
}

fn is_note_start(c: char) -> bool {
    matches!(c, '^' | '_' | '=') || ('A'..='G').contains(&c.to_ascii_uppercase())
}

struct ParsedNote {
    pitch: u8,
    duration: f64,
}

/// One note starting at the slice head: accidentals, letter, octave marks,
/// length. Records inline accidentals into the measure map.
fn parse_note(chars: &[char], state: &mut TuneState) -> anyhow::Result<(ParsedNote, usize)> {
    let mut i = 0;

    let mut explicit: Option<i32> = None;
    while i < chars.len() {
        match chars[i] {
            '^' => {
                explicit = Some(explicit.unwrap_or(0) + 1);
                i += 1;
            }
            '_' => {
                explicit = Some(explicit.unwrap_or(0) - 1);
                i += 1;
            }
            '=' => {
                explicit = Some(0);
                i += 1;
            }
            _ => break,
        }
    }

    let letter = match chars.get(i) {
        Some(&c) if ('A'..='G').contains(&c.to_ascii_uppercase()) => c,
        other => bail!("expected note letter, found {:?}", other),
    };
    i += 1;

    // C is middle C; lowercase is the octave above
    let mut octave: i32 = if letter.is_ascii_lowercase() { 1 } else { 0 };
    while i < chars.len() {
        match chars[i] {
            '\'' => {
                octave += 1;
                i += 1;
            }
            ',' => {
                octave -= 1;
                i += 1;
            }
            _ => break,
        }
    }

    let (len, used) = parse_length(&chars[i..]);
    i += used;

    let upper = letter.to_ascii_uppercase();
    let slot = (upper, octave);
    if let Some(acc) = explicit {
        state.measure_accidentals.insert(slot, acc);
    }
    let accidental = explicit
        .or_else(|| state.measure_accidentals.get(&slot).copied())
        .or_else(|| state.key_accidentals.get(&upper).copied())
        .unwrap_or(0);

    let semitone = match upper {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => unreachable!(),
    };
    let midi = (60 + 12 * octave + semitone + accidental).clamp(0, 127) as u8;

    Ok((ParsedNote { pitch: midi, duration: state.unit * len }, i))
}

/// Length suffix after a note or rest: `2`, `3/2`, `/`, `/4`, `//`.
/// Returns the factor and the number of characters consumed.
fn parse_length(chars: &[char]) -> (f64, usize) {
    let mut i = 0;
    let mut num: u32 = 0;
    while i < chars.len() && chars[i].is_ascii_digit() {
        num = num * 10 + chars[i].to_digit(10).unwrap();
        i += 1;
    }
    let num = if num == 0 { 1 } else { num };

    let mut den: u32 = 1;
    if chars.get(i) == Some(&'/') {
        i += 1;
        let mut explicit_den: u32 = 0;
        while i < chars.len() && chars[i].is_ascii_digit() {
            explicit_den = explicit_den * 10 + chars[i].to_digit(10).unwrap();
            i += 1;
        }
        if explicit_den > 0 {
            den = explicit_den;
        } else {
            // Bare slashes halve: A/ = 1/2, A// = 1/4
            den = 2;
            while chars.get(i) == Some(&'/') {
                den *= 2;
                i += 1;
            }
        }
    }

    (num as f64 / den as f64, i)
}

/// `>` dots the previous note and halves the next; `<` is the mirror image.
/// Returns the number of characters consumed.
fn apply_broken_rhythm(chars: &[char], state: &mut TuneState) -> usize {
    let mut count = 0;
    while chars.get(count) == Some(&chars[0]) {
        count += 1;
    }
    // A single mark shifts half the length, >> and >>> shift more
    let shift = 1.0 - 0.5f64.powi(count as i32);

    let (prev_factor, next_factor) = if chars[0] == '>' {
        (1.0 + shift, 1.0 - shift)
    } else {
        (1.0 - shift, 1.0 + shift)
    };

    // Only stretch the previous event if it ends at the cursor (i.e. it was
    // a note, not a rest)
    if let Some(last) = state.events.last_mut() {
        if (last.onset + last.duration - state.cursor).abs() < 1e-9 {
            let delta = last.duration * (prev_factor - 1.0);
            last.duration += delta;
            state.cursor += delta;
        }
    }
    state.carry_factor = next_factor;
    count
}

/// `[`-introduced constructs: inline fields, repeat endings, and chords.
/// Chords are dropped as units; their duration advances the cursor.
fn parse_bracket(chars: &[char], start: usize, state: &mut TuneState) -> anyhow::Result<usize> {
    let mut i = start + 1;

    // [1 / [2 repeat endings
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return Ok(i + 1);
    }

    // [K:...] / [L:...] inline fields
    if chars.get(i).is_some_and(|c| c.is_ascii_alphabetic()) && chars.get(i + 1) == Some(&':') {
        let field = chars[i];
        let mut end = i + 2;
        while end < chars.len() && chars[end] != ']' {
            end += 1;
        }
        let value: String = chars[i + 2..end].iter().collect();
        match field {
            'L' => state.unit = parse_unit_length(value.trim())?,
            'K' => state.key_accidentals = key_signature(value.trim())?,
            _ => {}
        }
        return Ok((end + 1).min(chars.len()));
    }

    // A chord: parse the member notes, emit none of them
    let mut chord_duration: Option<f64> = None;
    while i < chars.len() && chars[i] != ']' {
        if is_note_start(chars[i]) {
            let (note, used) = parse_note(&chars[i..], state)?;
            i += used;
            chord_duration.get_or_insert(note.duration);
        } else {
            i += 1;
        }
    }
    i = (i + 1).min(chars.len());

    // Trailing multiplier scales the whole chord: [CEG]2
    let (len, used) = parse_length(&chars[i..]);
    i += used;

    if let Some(duration) = chord_duration {
        state.cursor += duration * len * state.take_factors();
    }
    Ok(i)
}

fn skip_delimited(chars: &[char], start: usize, close: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() && chars[i] != close {
        i += 1;
    }
    (i + 1).min(chars.len())
}
