//! Character splitter with overlap.
//!
//! Splits extracted text on a separator ladder (paragraph, line, word) and
//! merges the pieces into chunks of at most `chunk_size` characters, with
//! consecutive chunks sharing up to `chunk_overlap` characters of trailing
//! context. Lengths are measured in characters, not bytes, so accented text
//! never splits inside a code point.
//!
//! Stable and restartable: the same text with the same parameters always
//! yields the same chunk sequence.

use corpus_sync_ports::{SplitterPort, TextChunk};
use corpus_sync_shared::{ErrorCode, ErrorEnvelope, Result};

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Recursive character splitter.
#[derive(Debug, Clone)]
pub struct CharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CharacterSplitter {
    /// Create a splitter with explicit chunk sizing.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk size must be greater than zero",
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk overlap must be smaller than chunk size",
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl SplitterPort for CharacterSplitter {
    fn split(&self, text: &str) -> Result<Vec<TextChunk>> {
        let content = text.trim();
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let pieces = split_pieces(content, self.chunk_size, &SEPARATORS);
        let merged = merge_pieces(&pieces, self.chunk_size, self.chunk_overlap);

        merged
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                Ok(TextChunk {
                    content: content.into_boxed_str(),
                    index: u32::try_from(index).map_err(|_| {
                        ErrorEnvelope::invariant(
                            ErrorCode::internal(),
                            "chunk index overflow",
                        )
                    })?,
                })
            })
            .collect()
    }
}

/// Break text into pieces no longer than `max` characters, preferring the
/// coarsest separator that makes progress.
fn split_pieces<'a>(text: &'a str, max: usize, separators: &[&str]) -> Vec<Piece<'a>> {
    if char_len(text) <= max {
        return vec![Piece::Borrowed(text)];
    }

    let Some((separator, remaining)) = separators.split_first() else {
        return hard_split(text, max);
    };

    let parts: Vec<&str> = text
        .split(separator)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() <= 1 {
        return split_pieces(text, max, remaining);
    }

    let mut pieces = Vec::new();
    for part in parts {
        if char_len(part) <= max {
            pieces.push(Piece::Borrowed(part));
        } else {
            pieces.extend(split_pieces(part, max, remaining));
        }
    }
    pieces
}

/// Last-resort split for a separator-free span: fixed character windows.
fn hard_split(text: &str, max: usize) -> Vec<Piece<'_>> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max)
        .map(|window| Piece::Owned(window.iter().collect()))
        .collect()
}

#[derive(Debug, Clone)]
enum Piece<'a> {
    Borrowed(&'a str),
    Owned(String),
}

impl Piece<'_> {
    fn as_str(&self) -> &str {
        match self {
            Piece::Borrowed(text) => text,
            Piece::Owned(text) => text.as_str(),
        }
    }
}

/// Merge pieces into chunks of at most `size` characters, carrying up to
/// `overlap` characters of trailing pieces into the next chunk.
fn merge_pieces(pieces: &[Piece<'_>], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for piece in pieces {
        let piece = piece.as_str();
        let piece_len = char_len(piece);
        let joined_len = if current.is_empty() {
            piece_len
        } else {
            current_len + 1 + piece_len
        };

        if joined_len > size && !current.is_empty() {
            chunks.push(current.join(" "));

            // Seed the next chunk with trailing context, as long as both the
            // overlap limit and the chunk size allow it.
            let mut tail: Vec<&str> = Vec::new();
            let mut tail_len = 0usize;
            for candidate in current.iter().rev() {
                let candidate_len = char_len(candidate);
                let with_candidate = if tail.is_empty() {
                    candidate_len
                } else {
                    tail_len + 1 + candidate_len
                };
                if with_candidate > overlap || with_candidate + 1 + piece_len > size {
                    break;
                }
                tail.push(candidate);
                tail_len = with_candidate;
            }
            tail.reverse();
            current = tail;
            current_len = tail_len;
        }

        if current.is_empty() {
            current_len = piece_len;
        } else {
            current_len = current_len + 1 + piece_len;
        }
        current.push(piece);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str, size: usize, overlap: usize) -> Vec<String> {
        let splitter = CharacterSplitter::new(size, overlap).expect("splitter");
        splitter
            .split(text)
            .expect("split")
            .into_iter()
            .map(|chunk| chunk.content.into_string())
            .collect()
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split("hello world", 100, 10);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = CharacterSplitter::new(100, 10).expect("splitter");
        assert!(splitter.split("   ").expect("split").is_empty());
    }

    #[test]
    fn chunks_respect_the_size_limit() {
        let words = vec!["mot"; 100].join(" ");
        for chunk in split(&words, 40, 8) {
            assert!(chunk.chars().count() <= 40, "oversized chunk: {chunk}");
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let words = (0..30).map(|n| format!("w{n:02}")).collect::<Vec<_>>();
        let chunks = split(&words.join(" "), 20, 8);
        assert!(chunks.len() > 1);

        for window in chunks.windows(2) {
            let leading_word = window[1].split(' ').next().unwrap_or_default();
            assert!(
                window[0].split(' ').any(|word| word == leading_word),
                "chunk {:?} does not continue from {:?}",
                window[1],
                window[0]
            );
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = vec!["paragraphe premier.", "deuxième alinéa, plus long."]
            .join("\n\n")
            .repeat(10);
        assert_eq!(split(&text, 64, 16), split(&text, 64, 16));
    }

    #[test]
    fn unbroken_spans_are_hard_split() {
        let text = "x".repeat(95);
        let chunks = split(&text, 30, 5);
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 30));
    }

    #[test]
    fn accented_text_splits_on_characters_not_bytes() {
        let text = "é".repeat(50);
        let chunks = split(&text, 20, 4);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 20));
    }

    #[test]
    fn invalid_sizing_is_rejected() {
        assert!(CharacterSplitter::new(0, 0).is_err());
        assert!(CharacterSplitter::new(10, 10).is_err());
    }
}
