//! Training losses
//!
//! InfoNCE contrastive loss with in-batch negatives: question and answer
//! representations of the same pair are pulled together, every other answer
//! in the batch serves as a negative.

use anyhow::Result;
use candle_core::{DType, Tensor, D};

#[derive(Debug, Clone)]
pub struct ContrastiveLossConfig {
    /// Softmax temperature; lower is sharper
    pub temperature: f32,
}

impl Default for ContrastiveLossConfig {
    fn default() -> Self {
        Self { temperature: 0.05 }
    }
}

#[derive(Debug, Clone)]
pub struct ContrastiveLoss {
    config: ContrastiveLossConfig,
}

impl ContrastiveLoss {
    pub fn new(config: ContrastiveLossConfig) -> Self {
        Self { config }
    }

    pub fn temperature(&self) -> f32 {
        self.config.temperature
    }

    /// In-batch InfoNCE over `[batch, hidden]` question and answer
    /// embeddings. Returns a scalar loss tensor.
    pub fn forward(&self, questions: &Tensor, answers: &Tensor) -> Result<Tensor> {
        let q = normalize(questions)?;
        let a = normalize(answers)?;

        let batch_size = q.dim(0)?;

        // [batch, batch] similarity; the diagonal holds the true pairs
        let sim = q.matmul(&a.t()?)?;
        let sim = (sim / self.config.temperature as f64)?;

        let labels = Tensor::arange(0u32, batch_size as u32, q.device())?;
        cross_entropy(&sim, &labels)
    }
}

fn normalize(embeddings: &Tensor) -> Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(D::Minus1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    Ok(embeddings.broadcast_div(&norm)?)
}

fn cross_entropy(logits: &Tensor, labels: &Tensor) -> Result<Tensor> {
    let log_softmax = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    let labels = labels.to_dtype(DType::I64)?;
    Ok(candle_nn::loss::nll(&log_softmax, &labels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_aligned_pairs_give_low_loss() {
        let device = Device::Cpu;

        // Orthogonal, perfectly aligned pairs
        let q = Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0]], &device).unwrap();
        let aligned_loss = ContrastiveLoss::new(ContrastiveLossConfig::default())
            .forward(&q, &q)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        // Swapped answers: every pair is mismatched
        let swapped = Tensor::new(&[[0.0f32, 1.0], [1.0, 0.0]], &device).unwrap();
        let mismatched_loss = ContrastiveLoss::new(ContrastiveLossConfig::default())
            .forward(&q, &swapped)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        assert!(aligned_loss < mismatched_loss);
        assert!(aligned_loss >= 0.0);
    }

    #[test]
    fn test_loss_is_finite() {
        let device = Device::Cpu;
        let q = Tensor::new(&[[0.3f32, -0.2, 0.5], [0.1, 0.9, -0.4]], &device).unwrap();
        let a = Tensor::new(&[[0.2f32, -0.1, 0.4], [0.0, 0.8, -0.3]], &device).unwrap();

        let loss = ContrastiveLoss::new(ContrastiveLossConfig { temperature: 0.1 })
            .forward(&q, &a)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(loss.is_finite());
    }
}
