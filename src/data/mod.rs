//! Knowledge-base documents and chunking
//!
//! Loading research papers and reference texts (plain text, Markdown, PDF)
//! and splitting them into chunks for embedding and retrieval.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod chunkers;
pub mod loaders;

pub use chunkers::{create_chunker, ChunkConfig, Chunker, OverlappingChunker, SentenceChunker};
pub use loaders::{CorpusLoader, DocumentLoader, MarkdownLoader, TextLoader};

/// A loaded source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier derived from the source path
    pub id: String,
    /// Source path or identifier
    pub source: String,
    /// Full text content
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Metadata carried alongside a document and its chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_path: Option<PathBuf>,
    /// File type (txt, md, pdf)
    pub file_type: String,
    /// Size of the source file in bytes
    pub size: Option<u64>,
    /// Paper title when one could be extracted
    pub title: Option<String>,
}

/// A contiguous slice of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    /// Start offset in the source document, in chars
    pub start_pos: usize,
    /// End offset in the source document, in chars
    pub end_pos: usize,
    pub chunk_index: usize,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: String, source: String, content: String, metadata: DocumentMetadata) -> Self {
        Self {
            id,
            source,
            content,
            metadata,
        }
    }
}

impl Chunk {
    /// Chunk id scheme: `<document_id>_<chunk_index>`.
    pub fn of(document: &Document, content: String, span: (usize, usize), index: usize) -> Self {
        Self {
            id: format!("{}_{}", document.id, index),
            document_id: document.id.clone(),
            content,
            start_pos: span.0,
            end_pos: span.1,
            chunk_index: index,
            metadata: document.metadata.clone(),
        }
    }
}
