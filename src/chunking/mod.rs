//! Deterministic, boundary-aware document splitting.
//!
//! [`split`] turns a document body into overlapping windows of at most
//! `chunk_size` characters under a fixed [`ChunkPolicy`]. The splitter is a
//! pure function of `(text, policy)`: no hidden state, no randomness, so the
//! same input always yields the same ordered chunk sequence. That determinism
//! is what makes content-addressed storage idempotent across runs.
//!
//! Windowing policy:
//!
//! 1. A window ideally ends at the latest paragraph break inside its upper
//!    half, falling back to the latest sentence break there.
//! 2. With no eligible break, the window is hard-cut at exactly
//!    `chunk_size` characters.
//! 3. The next window starts `overlap` characters before the previous end so
//!    retrieval context is not truncated at window edges.
//!
//! All indices are Unicode scalar positions; slicing never lands inside a
//! multi-byte character.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ChunkPolicy;

/// One window of a document body, with its position retained for tracing
/// stored chunks back to their origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub text: String,
    /// Position of this chunk within its document.
    pub order_index: usize,
    /// Character offset of the chunk's first scalar in the document body.
    pub start_char: usize,
}

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("paragraph break regex"));

static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["')\]]*\s"#).expect("sentence break regex"));

/// Splits `text` into ordered, overlapping chunks under `policy`.
///
/// Empty input yields an empty sequence; input of at most
/// `policy.chunk_size()` characters yields exactly one chunk equal to the
/// whole text.
pub fn split(text: &str, policy: &ChunkPolicy) -> Vec<ChunkSpan> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every character, so window math runs in character
    // space while slicing stays on valid UTF-8 boundaries.
    let offsets: Vec<usize> = text.char_indices().map(|(byte, _)| byte).collect();
    let total_chars = offsets.len();
    let byte_at = |char_idx: usize| -> usize {
        if char_idx >= total_chars {
            text.len()
        } else {
            offsets[char_idx]
        }
    };

    let chunk_size = policy.chunk_size();
    let overlap = policy.overlap();

    if total_chars <= chunk_size {
        return vec![ChunkSpan {
            text: text.to_string(),
            order_index: 0,
            start_char: 0,
        }];
    }

    let paragraph_ends = boundary_chars(&PARAGRAPH_BREAK, text, &offsets);
    let sentence_ends = boundary_chars(&SENTENCE_BREAK, text, &offsets);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let remaining = total_chars - start;
        if remaining <= chunk_size {
            chunks.push(ChunkSpan {
                text: text[byte_at(start)..].to_string(),
                order_index: chunks.len(),
                start_char: start,
            });
            break;
        }

        let window_end = start + chunk_size;
        // A break is only eligible in the upper half of the window (and past
        // the overlap) so boundary-seeking cannot stall or emit slivers.
        let floor = start + (chunk_size / 2).max(overlap);
        let cut = latest_in_range(&paragraph_ends, floor, window_end)
            .or_else(|| latest_in_range(&sentence_ends, floor, window_end))
            .unwrap_or(window_end);

        chunks.push(ChunkSpan {
            text: text[byte_at(start)..byte_at(cut)].to_string(),
            order_index: chunks.len(),
            start_char: start,
        });
        start = cut - overlap;
    }

    chunks
}

/// Character positions immediately after each regex match, sorted ascending.
fn boundary_chars(pattern: &Regex, text: &str, offsets: &[usize]) -> Vec<usize> {
    pattern
        .find_iter(text)
        .map(|m| match offsets.binary_search(&m.end()) {
            Ok(char_idx) => char_idx,
            Err(char_idx) => char_idx,
        })
        .collect()
}

/// Largest boundary `b` with `floor < b <= ceiling`.
fn latest_in_range(boundaries: &[usize], floor: usize, ceiling: usize) -> Option<usize> {
    let idx = boundaries.partition_point(|&b| b <= ceiling);
    if idx == 0 {
        return None;
    }
    let candidate = boundaries[idx - 1];
    (candidate > floor).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(chunk_size: usize, overlap: usize) -> ChunkPolicy {
        ChunkPolicy::new(chunk_size, overlap).unwrap()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", &policy(800, 80)).is_empty());
    }

    #[test]
    fn short_text_yields_single_whole_chunk() {
        let chunks = split("a short note", &policy(800, 80));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a short note");
        assert_eq!(chunks[0].order_index, 0);
        assert_eq!(chunks[0].start_char, 0);
    }

    #[test]
    fn unbroken_1500_chars_yield_two_windows_with_720_stride() {
        let body: String = std::iter::repeat('x').take(1500).collect();
        let chunks = split(&body, &policy(800, 80));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 800);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[1].start_char, 720);
        assert_eq!(chunks[1].text.chars().count(), 780);
        assert_ne!(chunks[0].text, chunks[1].text);
    }

    #[test]
    fn consecutive_hard_cut_windows_share_overlap_characters() {
        let body: String = (0..1500)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = split(&body, &policy(800, 80));
        assert_eq!(chunks.len(), 2);
        let tail: String = chunks[0].text.chars().skip(720).collect();
        let head: String = chunks[1].text.chars().take(80).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn splitting_is_deterministic() {
        let body = "First paragraph about incident response.\n\nSecond paragraph \
                    covering escalation. It has two sentences. Third paragraph here."
            .repeat(30);
        let first = split(&body, &policy(400, 40));
        let second = split(&body, &policy(400, 40));
        assert_eq!(first, second);
    }

    #[test]
    fn paragraph_break_in_upper_half_is_preferred_over_hard_cut() {
        // One paragraph break at character 700 of an otherwise unbroken body.
        let mut body: String = std::iter::repeat('x').take(698).collect();
        body.push('\n');
        body.push('\n');
        body.push_str(&"y".repeat(800));
        let chunks = split(&body, &policy(800, 80));
        assert_eq!(chunks[0].text.chars().count(), 700);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(chunks[1].start_char, 620);
    }

    #[test]
    fn sentence_break_is_used_when_no_paragraph_break_exists() {
        let mut body: String = std::iter::repeat('x').take(640).collect();
        body.push_str(". ");
        body.push_str(&"y".repeat(900));
        let chunks = split(&body, &policy(800, 80));
        // Boundary lands right after ". " at character 642.
        assert_eq!(chunks[0].text.chars().count(), 642);
        assert_eq!(chunks[1].start_char, 562);
    }

    #[test]
    fn break_in_lower_half_is_ignored() {
        let mut body: String = std::iter::repeat('x').take(100).collect();
        body.push_str("\n\n");
        body.push_str(&"y".repeat(1398));
        let chunks = split(&body, &policy(800, 80));
        // The paragraph break at 102 sits below the 400-char floor, so the
        // first window hard-cuts at 800.
        assert_eq!(chunks[0].text.chars().count(), 800);
        assert_eq!(chunks[1].start_char, 720);
    }

    #[test]
    fn multibyte_text_splits_on_character_boundaries() {
        let body: String = std::iter::repeat('é').take(1500).collect();
        let chunks = split(&body, &policy(800, 80));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.chars().count(), 800);
        assert_eq!(chunks[1].start_char, 720);
    }

    #[test]
    fn order_indices_are_sequential() {
        let body = "word ".repeat(2000);
        let chunks = split(&body, &policy(300, 30));
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.order_index, expected);
        }
        assert!(chunks.len() > 3);
    }
}
