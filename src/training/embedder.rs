//! Fine-tuned embedder
//!
//! Bridges [`QaLoraModel`] into the retrieval-side [`Embedder`] trait so the
//! fine-tuned representation space serves dense retrieval.

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use std::path::Path;

use crate::embedding::{Embedder, Embedding};
use crate::training::device::{select_device, DevicePreference};
use crate::training::lora::LoraConfig;
use crate::training::model::QaLoraModel;
use crate::training::tokenizer::TokenizerWrapper;

/// Embedder backed by the fine-tuned QA model.
pub struct LoraEmbedder {
    model: QaLoraModel,
    tokenizer: TokenizerWrapper,
    model_id: String,
    device: Device,
    batch_size: usize,
}

impl LoraEmbedder {
    /// Load the base model and, when present, the LoRA checkpoint produced by
    /// `medrag train`.
    pub fn new(
        model_id: &str,
        lora_config: &LoraConfig,
        checkpoint: Option<&Path>,
        device: DevicePreference,
    ) -> Result<Self> {
        let device = select_device(device)?;
        let var_map = VarMap::new();

        let mut model = QaLoraModel::from_pretrained(model_id, lora_config, &var_map, &device)
            .context("Failed to load base model")?;

        if let Some(path) = checkpoint {
            model
                .load_lora_checkpoint(path)
                .context("Failed to load fine-tuned checkpoint")?;
            tracing::info!("Loaded fine-tuned LoRA weights from {:?}", path);
        } else {
            tracing::info!("No checkpoint given; using base weights");
        }

        let tokenizer = TokenizerWrapper::from_pretrained(model_id)
            .context("Failed to load tokenizer")?
            .with_max_length(512);

        Ok(Self {
            model,
            tokenizer,
            model_id: model_id.to_string(),
            device,
            batch_size: 16,
        })
    }

    fn encode_texts(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let batch = self.tokenizer.encode_batch(&owned, true)?;
        let (input_ids, attention_mask) = batch.to_tensors(&self.device)?;

        let embeddings = self.model.encode_normalized(&input_ids, &attention_mask)?;
        Ok(embeddings.to_vec2()?)
    }
}

impl Embedder for LoraEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut rows = self.encode_texts(&[text])?;
        rows.pop().context("Empty embedding batch")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.encode_texts(chunk)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.model.hidden_size()
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
