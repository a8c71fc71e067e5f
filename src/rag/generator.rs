//! Answer generation
//!
//! Trait-based abstraction over causal LMs with a candle Qwen2
//! implementation.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::qwen2::{Config as Qwen2Config, ModelForCausalLM};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::training::device::{select_device, DevicePreference};
use crate::training::hub::ModelLoader;
use crate::training::tokenizer::TokenizerWrapper;

/// Sampling controls for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// 0.0 disables sampling (greedy)
    pub temperature: f32,
    /// Nucleus sampling threshold; 1.0 disables
    pub top_p: f32,
    /// Top-k cutoff; 0 disables
    pub top_k: usize,
    /// Values > 1.0 discourage repetition
    pub repetition_penalty: f32,
    /// Overrides the generator's configured budget when set
    pub max_new_tokens: Option<usize>,
    /// Generation stops once any of these appears in the output
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repetition_penalty: 1.1,
            max_new_tokens: None,
            stop_sequences: vec![],
            seed: None,
        }
    }
}

impl SamplingParams {
    /// Deterministic decoding.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            top_k: 1,
            repetition_penalty: 1.0,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_new_tokens(mut self, max: usize) -> Self {
        self.max_new_tokens = Some(max);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Generator model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// HuggingFace model id or local directory (e.g. the fine-tuned model)
    pub model_id: String,
    pub device: DevicePreference,
    pub max_new_tokens: usize,
    /// "f32", "f16", or "bf16"
    pub dtype: String,
    pub max_seq_length: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_id: "Qwen/Qwen2.5-0.5B".to_string(),
            device: DevicePreference::Auto,
            max_new_tokens: 128,
            dtype: "f32".to_string(),
            max_seq_length: 4096,
        }
    }
}

impl GeneratorConfig {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    pub fn with_max_new_tokens(mut self, max: usize) -> Self {
        self.max_new_tokens = max;
        self
    }
}

/// A text generation model.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    fn model_name(&self) -> &str;

    /// Maximum context length in tokens.
    fn max_context_length(&self) -> usize;

    fn count_tokens(&self, text: &str) -> Result<usize>;
}

/// Qwen2-family causal LM via candle.
pub struct CandleGenerator {
    /// KV cache mutates during the forward pass, hence the Mutex
    model: Mutex<ModelForCausalLM>,
    tokenizer: TokenizerWrapper,
    config: GeneratorConfig,
    device: Device,
    eos_token_id: u32,
}

impl CandleGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let device = select_device(config.device)?;

        tracing::info!("Loading generator model: {}", config.model_id);
        tracing::info!("  Device: {:?}", device);
        tracing::info!("  Max new tokens: {}", config.max_new_tokens);

        let tokenizer = TokenizerWrapper::from_pretrained(&config.model_id)
            .context("Failed to load generator tokenizer")?
            .with_max_length(config.max_seq_length);

        // Qwen2 default when the tokenizer carries no EOS entry
        let eos_token_id = tokenizer.eos_token_id().unwrap_or(151643);

        let model = Self::load_model(&config, &device)?;

        tracing::info!("Generator loaded");

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            config,
            device,
            eos_token_id,
        })
    }

    fn load_model(config: &GeneratorConfig, device: &Device) -> Result<ModelForCausalLM> {
        let loader = ModelLoader::new()?;
        let model_path = loader.load_model_path(&config.model_id)?;

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
            anyhow::bail!("Unsupported generator architecture: {} (supported: qwen2)", arch);
        }

        let qwen_config: Qwen2Config =
            serde_json::from_str(&config_str).context("Failed to parse Qwen2 config")?;

        tracing::info!(
            "Loading Qwen2: vocab={}, hidden={}, layers={}",
            qwen_config.vocab_size,
            qwen_config.hidden_size,
            qwen_config.num_hidden_layers
        );

        let dtype = match config.dtype.as_str() {
            "f16" => DType::F16,
            "bf16" => DType::BF16,
            _ => DType::F32,
        };

        let weight_files = model_path.weight_files()?;
        let weight_refs: Vec<&std::path::Path> =
            weight_files.iter().map(|p| p.as_path()).collect();
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&weight_refs, dtype, device)
                .context("Failed to load generator weights")?
        };

        ModelForCausalLM::new(&qwen_config, vb).context("Failed to build Qwen2 model")
    }

    fn sample_loop(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let encoded = self.tokenizer.encode(prompt, true)?;
        let prompt_len = encoded.input_ids.len();
        if prompt_len == 0 {
            anyhow::bail!("Empty prompt after tokenization");
        }

        let mut all_tokens = encoded.input_ids;
        let max_tokens = params.max_new_tokens.unwrap_or(self.config.max_new_tokens);

        let temperature = (params.temperature > 0.0).then_some(params.temperature as f64);
        let top_p = (params.top_p < 1.0).then_some(params.top_p as f64);
        let mut logits_processor =
            LogitsProcessor::new(params.seed.unwrap_or(42), temperature, top_p);

        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Model lock poisoned: {}", e))?;
        // Stale KV entries from a previous request would corrupt positions
        model.clear_kv_cache();

        let mut pos = 0;
        for _ in 0..max_tokens {
            // Full prompt on the first pass, one token at a time afterwards
            let context_size = if pos == 0 { all_tokens.len() } else { 1 };
            let start = all_tokens.len() - context_size;
            let input = Tensor::new(&all_tokens[start..], &self.device)?.unsqueeze(0)?;

            let logits = model.forward(&input, pos)?;
            let logits = logits.squeeze(0)?;
            let logits = if logits.dims().len() > 1 {
                logits.get(logits.dim(0)? - 1)?
            } else {
                logits
            };

            let logits = if params.top_k > 0 {
                apply_top_k(&logits, params.top_k)?
            } else {
                logits
            };
            let logits = if params.repetition_penalty != 1.0 {
                apply_repetition_penalty(&logits, &all_tokens, params.repetition_penalty)?
            } else {
                logits
            };

            let next = logits_processor.sample(&logits)?;
            all_tokens.push(next);
            pos += context_size;

            if next == self.eos_token_id {
                break;
            }
            if !params.stop_sequences.is_empty() {
                let generated = self.tokenizer.decode(&all_tokens[prompt_len..], true)?;
                if params.stop_sequences.iter().any(|s| generated.contains(s)) {
                    break;
                }
            }
        }

        let output = self.tokenizer.decode(&all_tokens[prompt_len..], true)?;
        Ok(output.trim().to_string())
    }
}

/// Keep only the k highest logits, setting the rest to -inf.
fn apply_top_k(logits: &Tensor, k: usize) -> Result<Tensor> {
    let vocab_size = logits.dim(0)?;
    if k >= vocab_size {
        return Ok(logits.clone());
    }

    let values: Vec<f32> = logits.to_vec1()?;
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut filtered = vec![f32::NEG_INFINITY; vocab_size];
    for (idx, value) in indexed.into_iter().take(k) {
        filtered[idx] = value;
    }

    Ok(Tensor::new(&filtered[..], logits.device())?)
}

/// Penalize logits of tokens already generated.
fn apply_repetition_penalty(logits: &Tensor, tokens: &[u32], penalty: f32) -> Result<Tensor> {
    let mut values: Vec<f32> = logits.to_vec1()?;

    for &token in tokens {
        if let Some(v) = values.get_mut(token as usize) {
            if *v > 0.0 {
                *v /= penalty;
            } else {
                *v *= penalty;
            }
        }
    }

    Ok(Tensor::new(&values[..], logits.device())?)
}

impl Generator for CandleGenerator {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.sample_loop(prompt, params)
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }

    fn max_context_length(&self) -> usize {
        self.config.max_seq_length
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.tokenizer.encode(text, false)?.input_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_defaults() {
        let params = SamplingParams::default();
        assert!(params.temperature > 0.0);
        assert!(params.max_new_tokens.is_none());
    }

    #[test]
    fn test_greedy_preset() {
        let params = SamplingParams::greedy();
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.top_k, 1);
        assert_eq!(params.repetition_penalty, 1.0);
    }

    #[test]
    fn test_generator_config_builder() {
        let config = GeneratorConfig::new("model/fine_tuned")
            .with_device(DevicePreference::Cpu)
            .with_max_new_tokens(64);

        assert_eq!(config.model_id, "model/fine_tuned");
        assert_eq!(config.max_new_tokens, 64);
    }
}
