//! Re-fragments a completed text into stream-sized pieces.
//!
//! Fragments borrow from the input and concatenate back to it exactly:
//! separators stay attached to the fragment they follow.

use crate::config::ChunkUnit;

/// Split `text` into ordered fragments of `size` units.
///
/// An empty input yields exactly one empty fragment. A `size` of zero is
/// treated as one.
#[must_use]
pub fn chunk_text(text: &str, unit: ChunkUnit, size: usize) -> Vec<&str> {
    match unit {
        ChunkUnit::Words => chunk_words(text, size),
        ChunkUnit::Chars => chunk_chars(text, size),
    }
}

/// Cut after every `size` whitespace-delimited words. Whitespace following a
/// word belongs to that word; leading whitespace belongs to the first word.
#[must_use]
pub fn chunk_words(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut out = Vec::with_capacity(text.len() / (size * 4) + 1);
    let mut start = 0;
    let mut words = 0;
    let mut in_word = false;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
            continue;
        }
        if in_word {
            continue;
        }
        if words == size {
            out.push(&text[start..idx]);
            start = idx;
            words = 0;
        }
        words += 1;
        in_word = true;
    }

    out.push(&text[start..]);
    out
}

/// Cut after every `size` Unicode scalar values.
#[must_use]
pub fn chunk_chars(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    if text.is_empty() {
        return vec![""];
    }

    let mut out = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            out.push(&text[start..idx]);
            start = idx;
        }
    }
    out.push(&text[start..]);
    out
}
