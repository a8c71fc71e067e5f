//! Chunking strategies for indexing
//!
//! Fixed-window chunking with overlap, and sentence-boundary chunking for
//! prose-heavy papers.

use crate::data::{Chunk, Document};
use anyhow::Result;
use unicode_segmentation::UnicodeSegmentation;

/// Splits a document into chunks.
pub trait Chunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Sliding-window chunker with configurable overlap.
pub struct OverlappingChunker {
    config: ChunkConfig,
}

impl OverlappingChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }
}

impl Chunker for OverlappingChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let chars: Vec<char> = document.content.chars().collect();
        let mut chunks = Vec::new();

        if chars.is_empty() {
            return Ok(chunks);
        }

        let step = self
            .config
            .chunk_size
            .saturating_sub(self.config.chunk_overlap)
            .max(1);

        let mut start = 0;
        let mut index = 0;
        while start < chars.len() {
            let end = (start + self.config.chunk_size).min(chars.len());
            let text: String = chars[start..end].iter().collect();
            chunks.push(Chunk::of(document, text, (start, end), index));
            index += 1;

            if end >= chars.len() {
                break;
            }
            start += step;
        }

        Ok(chunks)
    }
}

/// Chunker that accumulates whole sentences up to the size budget.
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut chunk_start = 0;
        let mut pos = 0;
        let mut index = 0;

        for sentence in document.content.unicode_sentences() {
            if !current.is_empty() && current.len() + sentence.len() > self.config.chunk_size {
                chunks.push(Chunk::of(
                    document,
                    current.trim().to_string(),
                    (chunk_start, pos),
                    index,
                ));
                index += 1;
                current.clear();
                chunk_start = pos;
            }
            current.push_str(sentence);
            pos += sentence.chars().count();
        }

        if !current.trim().is_empty() {
            chunks.push(Chunk::of(
                document,
                current.trim().to_string(),
                (chunk_start, pos),
                index,
            ));
        }

        Ok(chunks)
    }
}

/// Select a chunker by name; unknown names fall back to overlapping.
pub fn create_chunker(strategy: &str, config: ChunkConfig) -> Box<dyn Chunker> {
    match strategy {
        "sentence" => Box::new(SentenceChunker::new(config)),
        "overlapping" => Box::new(OverlappingChunker::new(config)),
        other => {
            tracing::warn!("Unknown chunking strategy '{}', using overlapping", other);
            Box::new(OverlappingChunker::new(config))
        }
    }
}
