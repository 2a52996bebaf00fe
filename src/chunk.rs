//! Overlapping fixed-size text chunking.
//!
//! Splits documents into segments of `chunk_size` grapheme clusters with
//! `overlap` clusters shared between consecutive segments. Grapheme
//! boundaries (not bytes) keep multi-byte and combining sequences intact.

use unicode_segmentation::UnicodeSegmentation;

/// Splits `text` into overlapping chunks.
///
/// `chunk_size` and `overlap` are measured in grapheme clusters. When
/// `overlap >= chunk_size` the window still advances by at least one
/// cluster per chunk, so the function always terminates.
#[must_use]
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let graphemes: Vec<&str> = text.graphemes(true).collect();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::with_capacity(graphemes.len().div_ceil(step));
    let mut start = 0;
    while start < graphemes.len() {
        let end = (start + chunk_size).min(graphemes.len());
        chunks.push(graphemes[start..end].concat());
        if end == graphemes.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(chunk_text("abc", 0, 0).is_empty());
    }

    #[test]
    fn test_single_chunk_when_text_fits() {
        let chunks = chunk_text("short", 10, 2);
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 2);
        assert_eq!(chunks[0], "abcd");
        assert_eq!(chunks[1], "cdef");
        assert_eq!(chunks[2], "efgh");
        // Every adjacent pair shares the configured overlap.
        for pair in chunks.windows(2) {
            assert!(pair[1].starts_with(&pair[0][pair[0].len() - 2..]));
        }
    }

    #[test]
    fn test_covers_entire_text() {
        let text = "the quick brown fox jumps over the lazy dog";
        let chunks = chunk_text(text, 12, 3);
        let last = chunks.last().map(String::as_str).unwrap_or_default();
        assert!(text.ends_with(last));
    }

    #[test]
    fn test_grapheme_boundaries_preserved() {
        // Combining sequences and emoji must never be split mid-cluster.
        let text = "née🇫🇷 café";
        for chunk in chunk_text(text, 3, 1) {
            assert!(text.contains(&chunk));
        }
    }

    #[test]
    fn test_degenerate_overlap_still_terminates() {
        let chunks = chunk_text("abcdef", 3, 5);
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0], "abc");
        // Advances one grapheme at a time when overlap >= chunk_size.
        assert_eq!(chunks[1], "bcd");
    }
}
