//! QA model with trainable LoRA adapters
//!
//! The Qwen2 decoder's token-embedding table provides the frozen text
//! representation; a LoRA projection over the pooled representation is the
//! only trainable part. Generation itself stays with the frozen decoder in
//! `rag::generator`.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Embedding, VarBuilder, VarMap};
use candle_transformers::models::qwen2::Config as Qwen2Config;
use std::path::Path;

use crate::training::hub::{ModelLoader, ModelPath};
use crate::training::lora::{LoraConfig, LoraProjection};

/// Frozen token-embedding table plus trainable LoRA projection.
pub struct QaLoraModel {
    embed_tokens: Embedding,
    projection: LoraProjection,
    hidden_size: usize,
    device: Device,
}

impl QaLoraModel {
    /// Load from resolved model files, registering LoRA parameters in
    /// `var_map`.
    pub fn from_model_path(
        model_path: &ModelPath,
        lora_config: &LoraConfig,
        var_map: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        let config_str = std::fs::read_to_string(&model_path.config_file)
            .context("Failed to read model config")?;
        let model_config: serde_json::Value =
            serde_json::from_str(&config_str).context("Failed to parse model config")?;

        let arch = model_config["architectures"]
            .get(0)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        let model_type = model_config["model_type"].as_str().unwrap_or("").to_lowercase();
        if !arch.contains("qwen2") && !model_type.contains("qwen2") {
            anyhow::bail!("Unsupported base model architecture: {} (supported: qwen2)", arch);
        }

        let qwen_config: Qwen2Config =
            serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

        tracing::info!(
            "Loading base model for fine-tuning: hidden={}, vocab={}, lora_rank={}",
            qwen_config.hidden_size,
            qwen_config.vocab_size,
            lora_config.rank
        );

        let weight_files = model_path.weight_files()?;
        let weight_refs: Vec<&Path> = weight_files.iter().map(|p| p.as_path()).collect();
        // F32 for training stability
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&weight_refs, DType::F32, device)
                .context("Failed to load base model weights")?
        };

        let embed_tokens = candle_nn::embedding(
            qwen_config.vocab_size,
            qwen_config.hidden_size,
            vb.pp("model.embed_tokens"),
        )
        .context("Failed to load embed_tokens")?;

        let projection =
            LoraProjection::new(qwen_config.hidden_size, lora_config, var_map, device)?;

        tracing::info!(
            "LoRA adapters created: {} trainable params",
            projection.num_trainable_params()
        );

        Ok(Self {
            embed_tokens,
            projection,
            hidden_size: qwen_config.hidden_size,
            device: device.clone(),
        })
    }

    /// Load from a Hub model id or local directory.
    pub fn from_pretrained(
        model_id: &str,
        lora_config: &LoraConfig,
        var_map: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(model_id)?;
        Self::from_model_path(&model_path, lora_config, var_map, device)
    }

    /// Pooled, LoRA-adapted text representation `[batch, hidden]`.
    ///
    /// Token embeddings are mean-pooled under the attention mask, then pushed
    /// through the trainable projection.
    pub fn encode(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let embeddings = self
            .embed_tokens
            .forward(input_ids)
            .context("Embedding lookup failed")?;

        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(embeddings.dtype())?
            .broadcast_as(embeddings.shape())?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = sum.broadcast_div(&count)?;

        self.projection.apply(&pooled)
    }

    /// `encode` followed by L2 normalization.
    pub fn encode_normalized(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let pooled = self.encode(input_ids, attention_mask)?;
        let norm = pooled
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        Ok(pooled.broadcast_div(&norm)?)
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn num_trainable_params(&self) -> usize {
        self.projection.num_trainable_params()
    }

    pub fn save_lora_checkpoint(&self, path: &Path) -> Result<()> {
        self.projection.save(path)
    }

    pub fn load_lora_checkpoint(&mut self, path: &Path) -> Result<()> {
        let device = self.device.clone();
        self.projection.load(path, &device)
    }
}
