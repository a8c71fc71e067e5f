//! LoRA adapters
//!
//! Low-rank adaptation: the weight update is decomposed as
//! `h' = h + (h A^T B^T) * (alpha / rank)` with A Kaiming-initialized and B
//! zero-initialized, so training starts from the frozen model's behavior.

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use std::collections::HashMap;
use std::path::Path;

const LORA_DOWN_KEY: &str = "lora.down";
const LORA_UP_KEY: &str = "lora.up";

/// LoRA hyperparameters.
#[derive(Debug, Clone)]
pub struct LoraConfig {
    /// Rank of the decomposition (typically 4-64)
    pub rank: usize,
    /// Scaling numerator; effective scale is alpha / rank
    pub alpha: f32,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank: 8,
            alpha: 16.0,
        }
    }
}

impl LoraConfig {
    pub fn new(rank: usize, alpha: f32) -> Self {
        Self { rank, alpha }
    }

    pub fn scaling(&self) -> f32 {
        self.alpha / self.rank as f32
    }
}

/// Trainable low-rank projection applied as a residual on hidden states.
pub struct LoraProjection {
    /// Down projection [rank, hidden]
    down: Tensor,
    /// Up projection [hidden, rank]
    up: Tensor,
    scaling: f32,
    rank: usize,
    hidden_size: usize,
}

impl LoraProjection {
    /// Create trainable adapters registered in `var_map`.
    pub fn new(
        hidden_size: usize,
        config: &LoraConfig,
        var_map: &VarMap,
        device: &Device,
    ) -> Result<Self> {
        let vb = VarBuilder::from_varmap(var_map, DType::F32, device);

        let down = vb.get_with_hints(
            (config.rank, hidden_size),
            LORA_DOWN_KEY,
            Init::Kaiming {
                dist: candle_nn::init::NormalOrUniform::Uniform,
                fan: candle_nn::init::FanInOut::FanIn,
                non_linearity: candle_nn::init::NonLinearity::Linear,
            },
        )?;
        let up = vb.get_with_hints((hidden_size, config.rank), LORA_UP_KEY, Init::Const(0.0))?;

        Ok(Self {
            down,
            up,
            scaling: config.scaling(),
            rank: config.rank,
            hidden_size,
        })
    }

    /// `h + (h A^T B^T) * scaling`
    pub fn apply(&self, hidden: &Tensor) -> Result<Tensor> {
        let residual = hidden.matmul(&self.down.t()?)?.matmul(&self.up.t()?)?;
        let scaled = (residual * self.scaling as f64)?;
        Ok((hidden + scaled)?)
    }

    pub fn num_trainable_params(&self) -> usize {
        self.rank * self.hidden_size * 2
    }

    /// Persist the adapter tensors as safetensors.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut tensors = HashMap::new();
        tensors.insert(LORA_DOWN_KEY.to_string(), self.down.to_device(&Device::Cpu)?);
        tensors.insert(LORA_UP_KEY.to_string(), self.up.to_device(&Device::Cpu)?);
        candle_core::safetensors::save(&tensors, path)?;
        tracing::debug!("Saved LoRA checkpoint to {:?}", path);
        Ok(())
    }

    /// Replace the adapter tensors from a checkpoint.
    pub fn load(&mut self, path: &Path, device: &Device) -> Result<()> {
        let tensors = candle_core::safetensors::load(path, device)?;
        self.down = tensors
            .get(LORA_DOWN_KEY)
            .ok_or_else(|| anyhow::anyhow!("Missing {} in {:?}", LORA_DOWN_KEY, path))?
            .clone();
        self.up = tensors
            .get(LORA_UP_KEY)
            .ok_or_else(|| anyhow::anyhow!("Missing {} in {:?}", LORA_UP_KEY, path))?
            .clone();
        tracing::debug!("Loaded LoRA checkpoint from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scaling() {
        assert_eq!(LoraConfig::default().scaling(), 2.0);
        assert_eq!(LoraConfig::new(16, 16.0).scaling(), 1.0);
    }

    #[test]
    fn test_zero_initialized_projection_is_identity() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let projection =
            LoraProjection::new(4, &LoraConfig::default(), &var_map, &device).unwrap();

        let hidden = Tensor::ones((2, 4), DType::F32, &device).unwrap();
        let out = projection.apply(&hidden).unwrap();

        // B starts at zero, so the residual is zero
        let diff: f32 = (&out - &hidden)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let projection =
            LoraProjection::new(8, &LoraConfig::default(), &var_map, &device).unwrap();
        assert_eq!(projection.num_trainable_params(), 8 * 8 * 2);

        let dir = tempdir().unwrap();
        let path = dir.path().join("lora_checkpoint.safetensors");
        projection.save(&path).unwrap();

        let other_map = VarMap::new();
        let mut restored =
            LoraProjection::new(8, &LoraConfig::default(), &other_map, &device).unwrap();
        restored.load(&path, &device).unwrap();

        let hidden = Tensor::ones((1, 8), DType::F32, &device).unwrap();
        let a: Vec<Vec<f32>> = projection.apply(&hidden).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = restored.apply(&hidden).unwrap().to_vec2().unwrap();
        assert_eq!(a, b);
    }
}
