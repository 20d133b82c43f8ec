//! Text splitting for retrieval.
//!
//! Documents are cut into bounded, overlapping chunks before embedding:
//!
//! - Semantic splitting: `semchunk-rs` prefers paragraph, line, sentence and word boundaries
//!   and only splits inside a word when nothing else fits.
//! - Length unit: characters by default, or BPE tokens of the embedding model via
//!   `tiktoken-rs` when `TEXT_SPLITTER_LENGTH_UNIT=tokens`.
//! - Overlap: each chunk is prefixed with the tail of its predecessor, bounded so the result
//!   never exceeds the chunk size.

use crate::config::LengthUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

pub(crate) type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while configuring the splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Splitter configured with an impossible length budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load an encoding for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Chunk text with the hash used to drop duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedChunk {
    /// Chunk text content.
    pub text: String,
    /// SHA-256 of the text, hex encoded.
    pub chunk_hash: String,
}

/// Splits documents into overlapping chunks of bounded length.
#[derive(Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl TextSplitter {
    /// Build a splitter measuring length in `unit`; `model` selects the token encoding.
    ///
    /// Overlap is clamped below the chunk size.
    pub fn new(
        chunk_size: usize,
        overlap: usize,
        unit: LengthUnit,
        model: &str,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        let counter = match unit {
            LengthUnit::Chars => char_counter(),
            LengthUnit::Tokens => build_tiktoken_counter(model)?,
        };
        Ok(Self::with_counter(chunk_size, overlap, counter))
    }

    pub(crate) fn with_counter(chunk_size: usize, overlap: usize, counter: LengthCounter) -> Self {
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            counter,
        }
    }

    /// Maximum chunk length.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Effective overlap between adjacent chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Measure `text` in the splitter's length unit.
    pub fn measure(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }

    /// Split text into chunks; whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        // Leave room for the overlap prefix so it survives the final budget trim.
        let base_size = self.chunk_size - self.overlap;
        let counter = Arc::clone(&self.counter);
        let chunker = Chunker::new(
            base_size,
            Box::new(move |segment: &str| counter.as_ref()(segment)),
        );
        let base_chunks = chunker.chunk(text);
        self.apply_overlap(base_chunks)
    }

    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.overlap == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut overlapped = Vec::with_capacity(chunks.len());
        let mut iter = chunks.into_iter();
        let Some(mut previous) = iter.next() else {
            return overlapped;
        };
        overlapped.push(previous.clone());

        for current in iter {
            overlapped.push(self.build_overlapped_chunk(&previous, &current));
            previous = current;
        }

        overlapped
    }

    fn build_overlapped_chunk(&self, previous: &str, current: &str) -> String {
        let tail = self.tail_within(previous, self.overlap);
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);

        if !tail.is_empty() {
            combined.push_str(tail);
            if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
                combined.push(' ');
            }
        }

        combined.push_str(current);
        self.tail_within(&combined, self.chunk_size).to_string()
    }

    /// Longest suffix of `text` (leading whitespace trimmed) that fits in `limit`.
    fn tail_within<'a>(&self, text: &'a str, limit: usize) -> &'a str {
        if limit == 0 {
            return "";
        }

        let trimmed_text = text.trim_start();
        if self.measure(trimmed_text) <= limit {
            return trimmed_text;
        }

        for (offset, _) in text.char_indices().skip(1) {
            let candidate = text[offset..].trim_start();
            if self.measure(candidate) <= limit {
                return candidate;
            }
        }

        ""
    }
}

/// Drop blank chunks and exact duplicates, keeping first occurrences in order.
///
/// Returns the surviving chunks and the number of duplicates skipped.
pub fn dedupe_chunks(chunks: Vec<String>) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&text);
        if seen.insert(hash.clone()) {
            prepared.push(PreparedChunk {
                text,
                chunk_hash: hash,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn char_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter(model: &str) -> Result<LengthCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for length counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
