//! Fixed-window text chunker with overlap.
//!
//! Splits training content into windows of `chunk_size` characters where
//! each window repeats the last `overlap` characters of the previous one,
//! so that sentences cut at a boundary still appear whole in one chunk.
//!
//! # Algorithm
//!
//! 1. Clamp `overlap` to `chunk_size - 1` (and at least 1 step of progress).
//! 2. Emit `text[start..start + chunk_size]`, measured in characters.
//! 3. Stop once a window reaches the end of the text.
//! 4. Otherwise set `start = end - overlap`, forcing `start + 1` if that
//!    would not advance.
//! 5. Give up after [`MAX_CHUNK_ITERATIONS`] windows and return what was
//!    produced so far.
//!
//! Windows are measured in `char`s, so multi-byte UTF-8 text is never
//! split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use coachbot_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1);
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

/// Default window size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of characters shared by adjacent windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Hard ceiling on the number of windows produced for one document.
pub const MAX_CHUNK_ITERATIONS: usize = 10_000;

/// Output of [`split_chunks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSplit {
    pub chunks: Vec<String>,
    /// `true` when [`MAX_CHUNK_ITERATIONS`] stopped the split early.
    pub hit_ceiling: bool,
}

/// Split `text` into overlapping windows.
///
/// Returns an empty list for empty text or a zero `chunk_size`. Chunks are
/// never empty and the concatenation of chunks, with overlaps removed,
/// reproduces the input exactly.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    split_chunks(text, chunk_size, overlap).chunks
}

/// Like [`chunk_text`], but also reports whether the iteration ceiling
/// truncated the result so the caller can log it.
pub fn split_chunks(text: &str, chunk_size: usize, overlap: usize) -> ChunkSplit {
    let mut out = ChunkSplit {
        chunks: Vec::new(),
        hit_ceiling: false,
    };
    if text.is_empty() || chunk_size == 0 {
        return out;
    }

    let overlap = overlap.min(chunk_size.saturating_sub(1));
    // Byte offset of every char plus the end of the string, so windows can
    // be sliced by char count without re-scanning.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut start = 0usize;
    while start < char_len {
        if out.chunks.len() >= MAX_CHUNK_ITERATIONS {
            out.hit_ceiling = true;
            break;
        }

        let end = (start + chunk_size).min(char_len);
        let piece = &text[bounds[start]..bounds[end]];
        if !piece.is_empty() {
            out.chunks.push(piece.to_string());
        }
        if end == char_len {
            break;
        }

        let next = end - overlap;
        start = if next > start { next } else { start + 1 };
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source text by dropping the overlapping prefix of every
    /// chunk after the first.
    fn reassemble(chunks: &[String], chunk_size: usize, overlap: usize) -> String {
        let overlap = overlap.min(chunk_size.saturating_sub(1));
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(chunk_text("hello", 0, 0).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000, 200);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_exact_window_single_chunk() {
        let text = "a".repeat(1000);
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_default_windows() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);
        // starts at 0, 800, 1600
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 900);
        assert_eq!(&chunks[0][800..], &chunks[1][..200]);
        assert_eq!(reassemble(&chunks, 1000, 200), text);
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let text = "x".repeat(50);
        let split = split_chunks(&text, 10, 1000);
        assert!(!split.hit_ceiling);
        assert!(split.chunks.iter().all(|c| !c.is_empty()));
        // overlap clamps to 9, so every window advances by exactly one char
        assert_eq!(split.chunks.len(), 41);
        assert_eq!(reassemble(&split.chunks, 10, 1000), text);
    }

    #[test]
    fn test_overlap_equal_to_size() {
        let chunks = chunk_text("abcdef", 2, 2);
        assert_eq!(chunks, vec!["ab", "bc", "cd", "de", "ef"]);
    }

    #[test]
    fn test_multibyte_utf8() {
        let text = "héllo wörld ñ 日本語テキスト".repeat(30);
        let chunks = chunk_text(&text, 7, 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(reassemble(&chunks, 7, 3), text);
    }

    #[test]
    fn test_iteration_ceiling() {
        let text = "y".repeat(MAX_CHUNK_ITERATIONS + 500);
        let split = split_chunks(&text, 1, 0);
        assert!(split.hit_ceiling);
        assert_eq!(split.chunks.len(), MAX_CHUNK_ITERATIONS);
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(100);
        assert_eq!(chunk_text(&text, 120, 30), chunk_text(&text, 120, 30));
    }
}
