//! Hybrid retrieval
//!
//! Reciprocal-rank fusion of dense and sparse result lists.

use crate::retrieval::{Retriever, SearchResult};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Combines multiple retrievers with reciprocal-rank fusion:
/// `score(d) = Σ 1 / (k + rank_i(d))`.
pub struct HybridRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    /// RRF constant, conventionally 60
    k: f32,
}

impl HybridRetriever {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>) -> Self {
        Self { retrievers, k: 60.0 }
    }

    pub fn with_k(retrievers: Vec<Arc<dyn Retriever>>, k: f32) -> Self {
        Self { retrievers, k }
    }

    fn fuse(&self, result_lists: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
        let mut fused: HashMap<String, (SearchResult, f32)> = HashMap::new();

        for results in result_lists {
            for result in results {
                let rrf = 1.0 / (self.k + result.rank as f32);
                fused
                    .entry(result.chunk_id.clone())
                    .and_modify(|(_, score)| *score += rrf)
                    .or_insert((result, rrf));
            }
        }

        let mut ranked: Vec<(SearchResult, f32)> = fused.into_values().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranked
            .into_iter()
            .enumerate()
            .map(|(idx, (mut result, score))| {
                result.rank = idx + 1;
                result.score = score;
                result
            })
            .collect()
    }
}

impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        // Over-fetch so fusion has material to work with
        let fetch_k = top_k * 2;

        let mut lists = Vec::new();
        for retriever in &self.retrievers {
            match retriever.retrieve(query, fetch_k) {
                Ok(results) => lists.push(results),
                Err(e) => tracing::warn!("Retriever '{}' failed: {:#}", retriever.name(), e),
            }
        }

        if lists.is_empty() {
            anyhow::bail!("All retrievers failed");
        }

        let mut fused = self.fuse(lists);
        fused.truncate(top_k);
        Ok(fused)
    }

    fn name(&self) -> &str {
        "hybrid"
    }
}
