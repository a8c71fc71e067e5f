//! HuggingFace tokenizer wrapper
//!
//! Single and batched encoding with padding and truncation, plus tensor
//! conversion for candle.

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::training::hub::ModelLoader;

pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TokenizerWrapper {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        Ok(Self {
            tokenizer,
            max_length: 512,
        })
    }

    /// Load from a Hub model id or a local model directory.
    pub fn from_pretrained(model_id_or_path: &str) -> Result<Self> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(model_id_or_path)?;
        let tokenizer_file = model_path
            .tokenizer_file
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("tokenizer.json not found for {}", model_id_or_path))?;
        Self::from_file(tokenizer_file)
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// EOS id, probing the conventional token strings.
    pub fn eos_token_id(&self) -> Option<u32> {
        ["<|endoftext|>", "<|im_end|>", "</s>", "[SEP]"]
            .iter()
            .find_map(|t| self.tokenizer.token_to_id(t))
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        Ok(EncodedInput {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    /// Encode a batch with padding to the longest sequence and truncation to
    /// the configured max length.
    pub fn encode_batch(&self, texts: &[String], add_special_tokens: bool) -> Result<BatchEncodedInput> {
        let mut tokenizer = self.tokenizer.clone();
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: self.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to set truncation: {}", e))?;

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), add_special_tokens)
            .map_err(|e| anyhow::anyhow!("Batch tokenization failed: {}", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids());
            attention_mask.extend(encoding.get_attention_mask());
        }

        Ok(BatchEncodedInput {
            input_ids,
            attention_mask,
            batch_size,
            seq_len,
        })
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }
}

/// Encoded single text.
#[derive(Debug, Clone)]
pub struct EncodedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl EncodedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Encoded batch, flattened row-major.
#[derive(Debug, Clone)]
pub struct BatchEncodedInput {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl BatchEncodedInput {
    /// `(input_ids, attention_mask)` tensors of shape `[batch, seq_len]`.
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let input_ids = Tensor::new(&self.input_ids[..], device)?
            .to_dtype(DType::U32)?
            .reshape((self.batch_size, self.seq_len))?;
        let attention_mask = Tensor::new(&self.attention_mask[..], device)?
            .to_dtype(DType::F32)?
            .reshape((self.batch_size, self.seq_len))?;
        Ok((input_ids, attention_mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "downloads a tokenizer from the Hub"]
    fn test_encode_decode_roundtrip() {
        let tokenizer = TokenizerWrapper::from_pretrained("Qwen/Qwen2.5-0.5B").unwrap();
        let encoded = tokenizer.encode("Neonatal sepsis", true).unwrap();
        assert!(!encoded.is_empty());

        let decoded = tokenizer.decode(&encoded.input_ids, true).unwrap();
        assert!(decoded.to_lowercase().contains("sepsis"));
    }
}
