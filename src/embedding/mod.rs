//! Text embedding
//!
//! Trait-based embedding interface with a candle BERT backend and a
//! deterministic hash fallback, plus a persistent SQLite cache.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod backends;
pub mod cache;

pub use backends::{create_embedder, BertEmbedder, HashEmbedder};
pub use cache::{CacheStats, EmbeddingCache};

/// An embedding vector.
pub type Embedding = Vec<f32>;

/// How token-level vectors are combined into one sentence vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum PoolingStrategy {
    /// Mean over all tokens
    #[default]
    Mean,
    /// First ([CLS]) token
    Cls,
    /// Element-wise max over all tokens
    Max,
}

/// Configuration for embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name or local path
    pub model_name: String,
    pub pooling: PoolingStrategy,
    /// L2-normalize output vectors
    pub normalize: bool,
    /// Maximum sequence length in tokens
    pub max_length: usize,
    /// Batch size for bulk embedding
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            pooling: PoolingStrategy::Mean,
            normalize: true,
            max_length: 512,
            batch_size: 32,
        }
    }
}

/// An embedding model.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Combine token embeddings into one vector.
pub fn apply_pooling(token_embeddings: &[Vec<f32>], strategy: PoolingStrategy) -> Result<Embedding> {
    if token_embeddings.is_empty() {
        anyhow::bail!("Cannot pool empty token embeddings");
    }
    let dim = token_embeddings[0].len();

    match strategy {
        PoolingStrategy::Mean => {
            let n = token_embeddings.len() as f32;
            let mut out = vec![0.0; dim];
            for tok in token_embeddings {
                for (i, &v) in tok.iter().enumerate() {
                    out[i] += v / n;
                }
            }
            Ok(out)
        }
        PoolingStrategy::Cls => Ok(token_embeddings[0].clone()),
        PoolingStrategy::Max => {
            let mut out = vec![f32::NEG_INFINITY; dim];
            for tok in token_embeddings {
                for (i, &v) in tok.iter().enumerate() {
                    out[i] = out[i].max(v);
                }
            }
            Ok(out)
        }
    }
}

/// L2-normalize in place. Zero vectors are left unchanged.
pub fn normalize_embedding(embedding: &mut Embedding) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in embedding.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na > 0.0 && nb > 0.0 {
        dot / (na * nb)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pooling() {
        let tokens = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let out = apply_pooling(&tokens, PoolingStrategy::Mean).unwrap();
        assert_eq!(out, vec![2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_cls_and_max_pooling() {
        let tokens = vec![vec![1.0, 5.0], vec![4.0, 2.0]];
        assert_eq!(
            apply_pooling(&tokens, PoolingStrategy::Cls).unwrap(),
            vec![1.0, 5.0]
        );
        assert_eq!(
            apply_pooling(&tokens, PoolingStrategy::Max).unwrap(),
            vec![4.0, 5.0]
        );
    }

    #[test]
    fn test_pooling_empty_is_error() {
        assert!(apply_pooling(&[], PoolingStrategy::Mean).is_err());
    }

    #[test]
    fn test_normalize() {
        let mut emb = vec![3.0, 4.0];
        normalize_embedding(&mut emb);
        assert!((emb[0] - 0.6).abs() < 1e-6);
        assert!((emb[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &vec![0.0, 1.0])).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &vec![1.0, 0.0, 0.0]), 0.0);
    }
}
