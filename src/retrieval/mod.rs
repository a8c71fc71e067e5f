//! Retrieval over the knowledge base
//!
//! Dense vector search (HNSW), BM25 keyword search (tantivy), and a hybrid
//! fusion of the two.

use crate::data::Chunk;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod dense;
pub mod hybrid;
pub mod sparse;

pub use dense::{DenseRetriever, HnswConfig};
pub use hybrid::HybridRetriever;
pub use sparse::Bm25Retriever;

/// One retrieved chunk with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub chunk: Chunk,
    /// Relevance score, higher is better
    pub score: f32,
    /// 1-indexed rank in the result list
    pub rank: usize,
}

/// Sidecar metadata written when an index is built and read back at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Embedding model the index was built with
    pub model_name: String,
    pub dimension: usize,
    pub num_chunks: usize,
    pub created_at: String,
}

/// A retrieval engine over indexed chunks.
pub trait Retriever: Send + Sync {
    /// Return the top-k most relevant chunks for a query. May return fewer
    /// than k when the index is small.
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>>;

    fn name(&self) -> &str;
}
