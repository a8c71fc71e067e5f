//! Embedding backends
//!
//! `BertEmbedder` runs a sentence-transformer checkpoint through candle;
//! `HashEmbedder` is a deterministic token-hash fallback used in tests and
//! offline runs.

use crate::embedding::{normalize_embedding, Embedder, Embedding, EmbeddingConfig, PoolingStrategy};
use crate::training::device::{select_device, DevicePreference};
use crate::training::hub::ModelLoader;
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Token-hash bag-of-words embedder. Requires no model files and is fully
/// deterministic, which makes it the default for tests and air-gapped runs.
pub struct HashEmbedder {
    config: EmbeddingConfig,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig, dimension: usize) -> Self {
        Self { config, dimension }
    }

    fn generate(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];

        let tokens: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dimension;
            embedding[idx] += 1.0;
        }

        // Term-frequency normalization
        let total = tokens.len() as f32;
        for v in embedding.iter_mut() {
            *v /= total;
        }

        if self.config.normalize {
            normalize_embedding(&mut embedding);
        }
        embedding
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.generate(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Candle BERT embedder.
///
/// Loads a BERT-family sentence-transformer from a local directory or the
/// HuggingFace Hub and produces pooled, optionally normalized sentence
/// vectors.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    config: EmbeddingConfig,
    device: Device,
    hidden_size: usize,
}

impl BertEmbedder {
    pub fn new(config: EmbeddingConfig, device: DevicePreference) -> Result<Self> {
        let device = select_device(device)?;

        tracing::info!("Loading embedding model: {}", config.model_name);

        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(&config.model_name)?;

        let config_str = std::fs::read_to_string(&model_path.config_file)
            .context("Failed to read embedding model config")?;
        let bert_config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;
        let hidden_size = bert_config.hidden_size;

        let tokenizer_file = model_path
            .tokenizer_file
            .as_ref()
            .context("tokenizer.json not found for embedding model")?;
        let mut tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to set truncation: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&model_path.weights_file], DTYPE, &device)
                .context("Failed to load embedding model weights")?
        };
        let model = BertModel::load(vb, &bert_config).context("Failed to build BERT model")?;

        tracing::info!("Embedding model loaded (dim={})", hidden_size);

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            hidden_size,
        })
    }

    fn forward_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let inputs: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().to_vec())
            .collect();

        let input_ids = Tensor::from_vec(ids, (batch_size, seq_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch_size, seq_len), &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = match self.config.pooling {
            PoolingStrategy::Mean => mean_pool(&hidden, &attention_mask)?,
            PoolingStrategy::Cls => hidden.narrow(1, 0, 1)?.squeeze(1)?,
            PoolingStrategy::Max => hidden.max(1)?,
        };

        let pooled = if self.config.normalize {
            l2_normalize(&pooled)?
        } else {
            pooled
        };

        let rows: Vec<Vec<f32>> = pooled.to_vec2()?;
        Ok(rows)
    }
}

/// Attention-mask-weighted mean over the sequence dimension.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask
        .unsqueeze(2)?
        .to_dtype(DType::F32)?
        .broadcast_as(hidden.shape())?;
    let sum = hidden.broadcast_mul(&mask)?.sum(1)?;
    let count = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(sum.broadcast_div(&count)?)
}

fn l2_normalize(embeddings: &Tensor) -> Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    Ok(embeddings.broadcast_div(&norm)?)
}

impl Embedder for BertEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut rows = self.forward_batch(&[text])?;
        rows.pop().context("Empty embedding batch")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size) {
            out.extend(self.forward_batch(chunk)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.hidden_size
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Create an embedder by backend name (`bert` or `hash`).
pub fn create_embedder(
    backend: &str,
    config: EmbeddingConfig,
    dimension: usize,
    device: DevicePreference,
) -> Result<Arc<dyn Embedder>> {
    match backend {
        "bert" => Ok(Arc::new(BertEmbedder::new(config, device)?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config, dimension))),
        other => {
            tracing::warn!("Unknown embedding backend '{}', using hash", other);
            Ok(Arc::new(HashEmbedder::new(config, dimension)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(EmbeddingConfig::default(), 128);

        let a = embedder.embed("neonatal sepsis treatment").unwrap();
        let b = embedder.embed("neonatal sepsis treatment").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);

        let c = embedder.embed("unrelated text entirely").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_embedder_similarity_ordering() {
        let embedder = HashEmbedder::new(EmbeddingConfig::default(), 256);

        let q = embedder.embed("antibiotics for neonatal sepsis").unwrap();
        let related = embedder.embed("neonatal sepsis antibiotics dosing").unwrap();
        let unrelated = embedder.embed("rust borrow checker lifetimes").unwrap();

        assert!(cosine_similarity(&q, &related) > cosine_similarity(&q, &unrelated));
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(EmbeddingConfig::default(), 64);
        let emb = embedder.embed("").unwrap();
        assert!(emb.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_hash_embedder_batch() {
        let embedder = HashEmbedder::new(EmbeddingConfig::default(), 64);
        let out = embedder.embed_batch(&["a", "b", "c"]).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_create_embedder_fallback() {
        let embedder =
            create_embedder("nope", EmbeddingConfig::default(), 32, DevicePreference::Cpu).unwrap();
        assert_eq!(embedder.dimension(), 32);
    }
}
