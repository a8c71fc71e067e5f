//! Dense retrieval
//!
//! Approximate nearest-neighbor search over chunk embeddings via hnsw_rs.
//! Chunk texts and vectors are persisted with the index, so loading never
//! re-reads or re-embeds the source documents.

use crate::data::Chunk;
use crate::embedding::{Embedder, Embedding};
use crate::retrieval::{IndexMetadata, Retriever, SearchResult};
use anyhow::{Context, Result};
use hnsw_rs::hnsw::Neighbour;
use hnsw_rs::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "embeddings.json";
const METADATA_FILE: &str = "metadata.json";

/// HNSW graph parameters.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Maximum connections per layer
    pub max_connections: usize,
    /// Candidate list size during construction
    pub ef_construction: usize,
    /// Candidate list size during search
    pub ef_search: usize,
    /// Maximum number of layers
    pub max_layers: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 30,
            max_layers: 16,
        }
    }
}

/// Dense retriever over an HNSW index with cosine distance.
pub struct DenseRetriever {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Chunks in insertion order; the HNSW point id is the index here
    chunks: Vec<Chunk>,
    /// Embeddings parallel to `chunks`, persisted for reload
    embeddings: Vec<Embedding>,
    embedder: Arc<dyn Embedder>,
    config: HnswConfig,
    metadata: IndexMetadata,
}

impl DenseRetriever {
    /// Build an index from chunks and their embeddings. The two slices must
    /// be parallel.
    pub fn build(
        chunks: Vec<Chunk>,
        embeddings: Vec<Embedding>,
        embedder: Arc<dyn Embedder>,
        config: HnswConfig,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Chunk count ({}) does not match embedding count ({})",
                chunks.len(),
                embeddings.len()
            );
        }
        if chunks.is_empty() {
            anyhow::bail!("Cannot build an index from zero chunks");
        }

        let dimension = embeddings[0].len();
        tracing::debug!(
            "Building dense index: {} chunks, {} dims",
            chunks.len(),
            dimension
        );

        let hnsw: Hnsw<f32, DistCosine> = Hnsw::new(
            config.max_connections,
            chunks.len(),
            config.max_layers,
            config.ef_construction,
            DistCosine,
        );
        for (point_id, embedding) in embeddings.iter().enumerate() {
            hnsw.insert((embedding.as_slice(), point_id));
        }

        let metadata = IndexMetadata {
            model_name: embedder.model_name().to_string(),
            dimension,
            num_chunks: chunks.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        Ok(Self {
            hnsw,
            chunks,
            embeddings,
            embedder,
            config,
            metadata,
        })
    }

    /// Persist chunk texts, vectors, and the metadata sidecar.
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir)
            .with_context(|| format!("Failed to create index directory: {:?}", index_dir))?;

        fs::write(
            index_dir.join(CHUNKS_FILE),
            serde_json::to_string(&self.chunks)?,
        )?;
        fs::write(
            index_dir.join(VECTORS_FILE),
            serde_json::to_string(&self.embeddings)?,
        )?;
        fs::write(
            index_dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&self.metadata)?,
        )?;

        tracing::debug!("Dense index saved to {:?}", index_dir);
        Ok(())
    }

    /// Load an index from disk, rebuilding the HNSW graph from the persisted
    /// vectors.
    pub fn load(index_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let metadata_json = fs::read_to_string(index_dir.join(METADATA_FILE))
            .with_context(|| format!("Failed to read index metadata in {:?}", index_dir))?;
        let metadata: IndexMetadata = serde_json::from_str(&metadata_json)?;

        if embedder.model_name() != metadata.model_name {
            tracing::warn!(
                "Embedder mismatch: index built with '{}', querying with '{}'",
                metadata.model_name,
                embedder.model_name()
            );
        }

        let chunks: Vec<Chunk> = serde_json::from_str(
            &fs::read_to_string(index_dir.join(CHUNKS_FILE))
                .context("Failed to read index chunks")?,
        )?;
        let embeddings: Vec<Embedding> = serde_json::from_str(
            &fs::read_to_string(index_dir.join(VECTORS_FILE))
                .context("Failed to read index embeddings")?,
        )?;

        tracing::debug!("Loaded dense index: {} chunks", chunks.len());
        Self::build(chunks, embeddings, embedder, HnswConfig::default())
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }
}

impl Retriever for DenseRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).context("Failed to embed query")?;

        let neighbours: Vec<Neighbour> = self.hnsw.search(
            query_embedding.as_slice(),
            top_k,
            self.config.ef_search.max(top_k),
        );

        let mut results = Vec::with_capacity(neighbours.len());
        for (rank, neighbour) in neighbours.iter().enumerate() {
            if let Some(chunk) = self.chunks.get(neighbour.d_id) {
                results.push(SearchResult {
                    chunk_id: chunk.id.clone(),
                    chunk: chunk.clone(),
                    // Cosine distance to similarity
                    score: 1.0 - neighbour.distance,
                    rank: rank + 1,
                });
            }
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Document, DocumentMetadata, OverlappingChunker};
    use crate::embedding::{EmbeddingConfig, HashEmbedder};
    use tempfile::tempdir;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc1".to_string(),
            content: content.to_string(),
            start_pos: 0,
            end_pos: content.len(),
            chunk_index: 0,
            metadata: DocumentMetadata::default(),
        }
    }

    fn hash_embedder() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new(EmbeddingConfig::default(), 256))
    }

    fn build_index(embedder: Arc<dyn Embedder>) -> DenseRetriever {
        let chunks = vec![
            chunk("c1", "neonatal sepsis is treated with antibiotics"),
            chunk("c2", "kangaroo care improves thermal regulation"),
            chunk("c3", "surfactant therapy for respiratory distress"),
        ];
        let embeddings: Vec<Embedding> = chunks
            .iter()
            .map(|c| embedder.embed(&c.content).unwrap())
            .collect();
        DenseRetriever::build(chunks, embeddings, embedder, HnswConfig::default()).unwrap()
    }

    #[test]
    fn test_build_and_retrieve_at_most_k() {
        let retriever = build_index(hash_embedder());

        let results = retriever.retrieve("antibiotics for sepsis", 2).unwrap();
        assert!(results.len() <= 2);
        assert!(!results.is_empty());
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        // k larger than the index returns everything
        let all = retriever.retrieve("care", 10).unwrap();
        assert!(all.len() <= 3);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let embedder = hash_embedder();
        let err = DenseRetriever::build(
            vec![chunk("c1", "text")],
            vec![],
            embedder,
            HnswConfig::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_empty_index_rejected() {
        let err = DenseRetriever::build(vec![], vec![], hash_embedder(), HnswConfig::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_save_load_roundtrip_without_reembedding() {
        let embedder = hash_embedder();
        let retriever = build_index(embedder.clone());

        let dir = tempdir().unwrap();
        retriever.save(dir.path()).unwrap();

        let loaded = DenseRetriever::load(dir.path(), embedder).unwrap();
        assert_eq!(loaded.metadata().num_chunks, 3);

        let results = loaded.retrieve("sepsis antibiotics", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[test]
    fn test_index_from_chunked_document() {
        use crate::data::{ChunkConfig, Chunker};

        let doc = Document::new(
            "paper".to_string(),
            "paper.txt".to_string(),
            "Sepsis in neonates. ".repeat(40),
            DocumentMetadata::default(),
        );
        let chunks = OverlappingChunker::new(ChunkConfig {
            chunk_size: 100,
            chunk_overlap: 10,
        })
        .chunk(&doc)
        .unwrap();

        let embedder = hash_embedder();
        let embeddings: Vec<Embedding> = chunks
            .iter()
            .map(|c| embedder.embed(&c.content).unwrap())
            .collect();
        let retriever =
            DenseRetriever::build(chunks, embeddings, embedder, HnswConfig::default()).unwrap();

        assert!(retriever.retrieve("sepsis", 3).unwrap().len() <= 3);
    }
}
