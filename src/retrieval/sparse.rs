//! Sparse retrieval
//!
//! BM25 keyword search over chunk text via tantivy.

use crate::data::Chunk;
use crate::retrieval::{IndexMetadata, Retriever, SearchResult};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

const CHUNKS_FILE: &str = "chunks.json";
const METADATA_FILE: &str = "metadata.json";
const TANTIVY_DIR: &str = "tantivy";

/// BM25 retriever backed by a tantivy index.
pub struct Bm25Retriever {
    index: Index,
    reader: IndexReader,
    content_field: Field,
    chunk_id_field: Field,
    chunks: HashMap<String, Chunk>,
    metadata: IndexMetadata,
}

impl Bm25Retriever {
    /// Build a new BM25 index under `index_dir`.
    pub fn build(chunks: Vec<Chunk>, index_dir: &Path) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("Cannot build an index from zero chunks");
        }

        tracing::debug!("Building BM25 index: {} chunks", chunks.len());

        let mut schema_builder = Schema::builder();
        let chunk_id_field = schema_builder.add_text_field("chunk_id", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", TEXT | STORED);
        let schema = schema_builder.build();

        let tantivy_dir = index_dir.join(TANTIVY_DIR);
        fs::create_dir_all(&tantivy_dir)
            .with_context(|| format!("Failed to create index directory: {:?}", tantivy_dir))?;

        let index = Index::create_in_dir(&tantivy_dir, schema)?;
        let mut writer: IndexWriter = index.writer(50_000_000)?;

        let mut chunks_map = HashMap::new();
        for chunk in &chunks {
            writer.add_document(doc!(
                chunk_id_field => chunk.id.clone(),
                content_field => chunk.content.clone(),
            ))?;
            chunks_map.insert(chunk.id.clone(), chunk.clone());
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        fs::write(
            index_dir.join(CHUNKS_FILE),
            serde_json::to_string(&chunks_map)?,
        )?;

        let metadata = IndexMetadata {
            model_name: "bm25".to_string(),
            dimension: 0,
            num_chunks: chunks.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        fs::write(
            index_dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        Ok(Self {
            index,
            reader,
            content_field,
            chunk_id_field,
            chunks: chunks_map,
            metadata,
        })
    }

    /// Open a previously built index.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let metadata: IndexMetadata = serde_json::from_str(
            &fs::read_to_string(index_dir.join(METADATA_FILE))
                .with_context(|| format!("Failed to read index metadata in {:?}", index_dir))?,
        )?;
        let chunks: HashMap<String, Chunk> = serde_json::from_str(
            &fs::read_to_string(index_dir.join(CHUNKS_FILE))
                .context("Failed to read index chunks")?,
        )?;

        let index = Index::open_in_dir(index_dir.join(TANTIVY_DIR))
            .context("Failed to open tantivy index")?;
        let schema = index.schema();
        let chunk_id_field = schema
            .get_field("chunk_id")
            .context("chunk_id field missing from schema")?;
        let content_field = schema
            .get_field("content")
            .context("content field missing from schema")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        tracing::debug!("Loaded BM25 index: {} chunks", chunks.len());

        Ok(Self {
            index,
            reader,
            content_field,
            chunk_id_field,
            chunks,
            metadata,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }
}

impl Retriever for Bm25Retriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let parsed = parser.parse_query(query).context("Failed to parse query")?;

        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(top_k))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (rank, (score, address)) in top_docs.iter().enumerate() {
            let retrieved: TantivyDocument = searcher.doc(*address)?;
            let chunk_id = retrieved
                .get_first(self.chunk_id_field)
                .and_then(|v| v.as_str());

            if let Some(chunk) = chunk_id.and_then(|id| self.chunks.get(id)) {
                results.push(SearchResult {
                    chunk_id: chunk.id.clone(),
                    chunk: chunk.clone(),
                    score: *score,
                    rank: rank + 1,
                });
            }
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DocumentMetadata;
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

    #[test]
    fn test_build_and_search() {
        let chunks = vec![
            chunk("c1", "ampicillin and gentamicin for early-onset sepsis"),
            chunk("c2", "phototherapy reduces bilirubin levels"),
        ];

        let dir = tempdir().unwrap();
        let retriever = Bm25Retriever::build(chunks, dir.path()).unwrap();

        let results = retriever.retrieve("gentamicin sepsis", 2).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk_id, "c1");
        assert!(results.len() <= 2);
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempdir().unwrap();
        Bm25Retriever::build(vec![chunk("c1", "surfactant therapy")], dir.path()).unwrap();

        let loaded = Bm25Retriever::load(dir.path()).unwrap();
        assert_eq!(loaded.metadata().num_chunks, 1);

        let results = loaded.retrieve("surfactant", 5).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_build_rejected() {
        let dir = tempdir().unwrap();
        assert!(Bm25Retriever::build(vec![], dir.path()).is_err());
    }
}
