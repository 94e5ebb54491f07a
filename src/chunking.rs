//! Chunking utilities for splitting documents into overlapping word windows.
//!
//! A document's text is split on whitespace and re-joined into windows of
//! `chunk_size` words, each window starting `chunk_size - overlap` words after
//! the previous one. Chunks are emitted in reading order and each carries the
//! identifier of the document it came from plus its ordinal within it.

use crate::{
    document::Document,
    error::{Error, Result},
};

/// Default chunk size in words.
pub const DEFAULT_CHUNK_SIZE: usize = 400;

/// Default overlap between adjacent chunks in words.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Validated chunking parameters.
///
/// # Examples
///
/// ```
/// use docrag::chunking::ChunkingConfig;
///
/// let config = ChunkingConfig::new(200, 20).unwrap();
/// assert_eq!(config.step(), 180);
///
/// // An overlap that would never advance the window is rejected.
/// assert!(ChunkingConfig::new(10, 10).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    /// Build a config, rejecting `chunk_size == 0` and `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of words between the starts of two consecutive chunks.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A chunk of text from a larger document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text content, words joined by single spaces.
    pub text: String,
    /// Identifier of the document this chunk was cut from.
    pub source: String,
    /// Zero-based chunk index within the document.
    pub ordinal: usize,
}

/// Splits text into overlapping word windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Split text into chunk strings.
    ///
    /// Windows start at word offsets `0, step, 2 * step, ...`. The last window
    /// is the first one that reaches the end of the text, so it may be shorter
    /// than `chunk_size`. Empty or all-whitespace text produces no chunks.
    ///
    /// This is not plain offset stepping: stepping until the offset passes
    /// the word count would also emit trailing windows that are pure suffixes
    /// of the previous one. With `chunk_size = 3, overlap = 1`, "a b c d e"
    /// yields `["a b c", "c d e"]` here, where plain stepping adds `"e"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use docrag::chunking::{Chunker, ChunkingConfig};
    ///
    /// let chunker = Chunker::new(ChunkingConfig::new(3, 1).unwrap());
    /// let chunks = chunker.chunk("a b c d e f");
    /// assert_eq!(chunks, vec!["a b c", "c d e", "e f"]);
    ///
    /// assert!(chunker.chunk("   \n\t ").is_empty());
    /// ```
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let size = self.config.chunk_size;
        let step = self.config.step();

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }

        chunks
    }

    /// Chunk a document, tagging each chunk with its source and ordinal.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.text)
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                text,
                source: document.id.clone(),
                ordinal,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig::new(size, overlap).unwrap())
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = ChunkingConfig::new(0, 0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            ChunkingConfig::new(4, 4).unwrap_err(),
            Error::Config(_)
        ));
        assert!(matches!(
            ChunkingConfig::new(4, 9).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn default_config_is_valid() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.overlap(), DEFAULT_CHUNK_OVERLAP);
        assert!(ChunkingConfig::new(config.chunk_size(), config.overlap()).is_ok());
    }

    #[test]
    fn empty_and_whitespace_text_yield_nothing() {
        let c = chunker(4, 1);
        assert!(c.chunk("").is_empty());
        assert!(c.chunk(" \n\t  \r\n").is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunker(10, 2).chunk("Hello,   world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn short_text_shorter_than_overlap_is_kept() {
        let chunks = chunker(10, 5).chunk("just three words");
        assert_eq!(chunks, vec!["just three words"]);
    }

    #[test]
    fn no_overlap_splits_evenly() {
        let c = chunker(2, 0);
        assert_eq!(c.chunk("the quick brown fox"), vec!["the quick", "brown fox"]);
        assert_eq!(c.chunk("the lazy dog sleeps"), vec!["the lazy", "dog sleeps"]);
    }

    #[test]
    fn overlapping_windows_share_words() {
        let chunks = chunker(4, 2).chunk("a b c d e f g h");
        assert_eq!(chunks, vec!["a b c d", "c d e f", "e f g h"]);
    }

    #[test]
    fn final_window_may_be_short() {
        let chunks = chunker(3, 0).chunk("one two three four five");
        assert_eq!(chunks, vec!["one two three", "four five"]);
    }

    #[test]
    fn no_window_after_one_reaching_the_end() {
        let chunks = chunker(3, 1).chunk("a b c d e");
        assert_eq!(chunks, vec!["a b c", "c d e"]);
    }

    #[test]
    fn whitespace_is_normalized() {
        let chunks = chunker(3, 0).chunk("  alpha\tbeta\n\ngamma   delta ");
        assert_eq!(chunks, vec!["alpha beta gamma", "delta"]);
    }

    #[test]
    fn handles_multibyte_words() {
        let chunks = chunker(2, 1).chunk("café ☕ naïve 日本語");
        assert_eq!(chunks, vec!["café ☕", "☕ naïve", "naïve 日本語"]);
    }

    #[test]
    fn chunk_document_tags_source_and_ordinal() {
        let doc = Document::new("notes.txt", "the quick brown fox");
        let chunks = chunker(2, 0).chunk_document(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "notes.txt");
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "the quick");
        assert_eq!(chunks[1].ordinal, 1);
        assert_eq!(chunks[1].text, "brown fox");
    }

    proptest! {
        #[test]
        fn chunk_count_matches_window_formula(
            words in 0usize..200,
            size in 1usize..20,
            overlap_seed in 0usize..20,
        ) {
            let overlap = overlap_seed % size;
            let text = (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
            let chunks = chunker(size, overlap).chunk(&text);

            let step = size - overlap;
            let expected = if words == 0 {
                0
            } else if words <= overlap {
                1
            } else {
                (words - overlap).div_ceil(step)
            };
            prop_assert_eq!(chunks.len(), expected);
        }

        #[test]
        fn consecutive_chunks_start_one_step_apart(
            words in 1usize..150,
            size in 1usize..15,
            overlap_seed in 0usize..15,
        ) {
            let overlap = overlap_seed % size;
            let text = (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
            let chunks = chunker(size, overlap).chunk(&text);
            let step = size - overlap;

            for (i, chunk) in chunks.iter().enumerate() {
                let first = chunk.split(' ').next().unwrap();
                prop_assert_eq!(first, format!("w{}", i * step));
                prop_assert!(chunk.split(' ').count() <= size);
            }
            let last = chunks.last().unwrap();
            prop_assert_eq!(last.split(' ').last().unwrap(), format!("w{}", words - 1));
        }
    }
}
