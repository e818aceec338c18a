// Sliding-window n-grams over melodies, with canonical string comparison

use std::borrow::Cow;
use std::fmt;

use anyhow::{bail, Context};

use crate::melody::{Melody, Note};

/// A contiguous, fixed-length run of a melody's notes.
///
/// Extraction borrows slices straight out of the melody; transforms like
/// [`NGram::null_span`] own their notes. Two n-grams compare equal when
/// their per-position (pitch, duration, rest_fraction) tuples match. Onset
/// is not part of equality: phrases transposed in time but identical in
/// pitch, rhythm, and silence pattern are the same phrase.
#[derive(Debug, Clone)]
pub struct NGram<'a> {
    notes: Cow<'a, [Note]>,
}

/// Every contiguous window of `n` notes, stride 1, in melody order.
///
/// `n == 0` and melodies shorter than `n` yield an empty vector rather than
/// an error; otherwise the result holds exactly `len - n + 1` windows.
pub fn extract_ngrams(melody: &Melody, n: usize) -> Vec<NGram<'_>> {
    if n == 0 || melody.len() < n {
        return Vec::new();
    }
    melody.notes().windows(n).map(NGram::from_slice).collect()
}

impl<'a> NGram<'a> {
    pub fn from_slice(notes: &'a [Note]) -> Self {
        Self { notes: Cow::Borrowed(notes) }
    }

    pub fn from_notes(notes: Vec<Note>) -> NGram<'static> {
        NGram { notes: Cow::Owned(notes) }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The rhythmic profile of this n-gram: every note's pitch replaced by
    /// the first note's pitch, with onset, duration, and rest fraction kept.
    /// Idempotent; empty in, empty out.
    pub fn null_span(&self) -> NGram<'static> {
        let Some(first) = self.notes.first() else {
            return NGram::from_notes(Vec::new());
        };

        let notes = self
            .notes
            .iter()
            .map(|note| Note::new(first.pitch, note.onset, note.duration, note.rest_fraction))
            .collect();
        NGram::from_notes(notes)
    }

    /// Parse a canonical string (`{pitch,duration,rest_fraction}` tokens, no
    /// separators) back into a freestanding n-gram. Onsets are not part of
    /// the canonical form and come back as 0.0. Re-serializing the result
    /// reproduces the input.
    pub fn parse_canonical(s: &str) -> anyhow::Result<NGram<'static>> {
        let mut notes = Vec::new();
        let mut rest = s;

        while !rest.is_empty() {
            let Some(stripped) = rest.strip_prefix('{') else {
                bail!("expected '{{' at: {rest:?}");
            };
            let Some((token, tail)) = stripped.split_once('}') else {
                bail!("unterminated token at: {rest:?}");
            };

            let mut fields = token.split(',');
            let (Some(pitch), Some(duration), Some(rest_fraction), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                bail!("expected three fields in token: {{{token}}}");
            };

            notes.push(Note::new(
                pitch.parse().with_context(|| format!("bad pitch in {{{token}}}"))?,
                0.0,
                duration.parse().with_context(|| format!("bad duration in {{{token}}}"))?,
                rest_fraction
                    .parse()
                    .with_context(|| format!("bad rest fraction in {{{token}}}"))?,
            ));
            rest = tail;
        }

        Ok(NGram::from_notes(notes))
    }
}

/// The canonical string form, used as the exact-match comparison key.
/// Floats render in Rust's shortest round-trip decimal form, so equal
/// values always serialize identically.
impl fmt::Display for NGram<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in self.notes.iter() {
            write!(f, "{{{},{:?},{:?}}}", note.pitch, note.duration, note.rest_fraction)?;
        }
        Ok(())
    }
}

impl PartialEq for NGram<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.notes.len() == other.notes.len()
            && self
                .notes
                .iter()
                .zip(other.notes.iter())
                .all(|(a, b)| {
                    a.pitch == b.pitch
                        && a.duration == b.duration
                        && a.rest_fraction == b.rest_fraction
                })
    }
}
