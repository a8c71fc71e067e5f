//! Training loop
//!
//! Epoch/batch loop with gradient accumulation, warmup/cosine LR scheduling,
//! periodic logging, and checkpointing of the LoRA adapters.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::training::dataset::{QaExample, TrainingSet};
use crate::training::loss::{ContrastiveLoss, ContrastiveLossConfig};
use crate::training::model::QaLoraModel;
use crate::training::optimizer::{AdamW, AdamWConfig, LearningRateScheduler};
use crate::training::tokenizer::TokenizerWrapper;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f64,
    /// Fraction of total steps spent on linear warmup
    pub warmup_ratio: f64,
    pub weight_decay: f64,
    pub gradient_accumulation_steps: usize,
    pub max_grad_norm: f64,
    /// Save a checkpoint every N optimization steps; 0 disables
    pub save_steps: usize,
    pub logging_steps: usize,
    pub output_dir: PathBuf,
    /// Contrastive loss temperature
    pub temperature: f32,
    pub max_seq_length: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            num_epochs: 3,
            learning_rate: 5e-5,
            warmup_ratio: 0.1,
            weight_decay: 0.01,
            gradient_accumulation_steps: 1,
            max_grad_norm: 1.0,
            save_steps: 500,
            logging_steps: 100,
            output_dir: PathBuf::from("model/fine_tuned"),
            temperature: 0.05,
            max_seq_length: 512,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    pub train_loss: f64,
    pub global_step: usize,
    pub epoch: usize,
    pub samples_per_second: f64,
    pub learning_rate: f64,
}

impl std::fmt::Display for TrainingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Step {} | Epoch {} | Loss: {:.4} | LR: {:.2e} | {:.1} samples/s",
            self.global_step,
            self.epoch,
            self.train_loss,
            self.learning_rate,
            self.samples_per_second
        )
    }
}

#[derive(Debug)]
pub struct TrainingResult {
    pub metrics: TrainingMetrics,
    /// Final checkpoint location
    pub checkpoint_path: Option<PathBuf>,
    /// Loss per batch
    pub history: Vec<f64>,
}

/// Drives fine-tuning of a [`QaLoraModel`].
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    var_map: VarMap,
}

impl Trainer {
    pub fn new(config: TrainingConfig, device: Device) -> Self {
        Self {
            config,
            device,
            var_map: VarMap::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The variable store LoRA parameters must be registered in.
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Run the training loop.
    pub fn train(
        &mut self,
        model: &QaLoraModel,
        tokenizer: &TokenizerWrapper,
        dataset: &TrainingSet,
        eval_dataset: Option<&TrainingSet>,
    ) -> Result<TrainingResult> {
        if dataset.is_empty() {
            anyhow::bail!("Training dataset is empty");
        }

        let batches_per_epoch = dataset.len().div_ceil(self.config.batch_size);
        let total_steps = (batches_per_epoch * self.config.num_epochs)
            .div_ceil(self.config.gradient_accumulation_steps);
        let warmup_steps = (total_steps as f64 * self.config.warmup_ratio) as usize;

        tracing::info!("Starting fine-tuning:");
        tracing::info!("  Examples: {}", dataset.len());
        tracing::info!("  Batch size: {}", self.config.batch_size);
        tracing::info!(
            "  Gradient accumulation: {}",
            self.config.gradient_accumulation_steps
        );
        tracing::info!("  Epochs: {}", self.config.num_epochs);
        tracing::info!("  Optimization steps: {}", total_steps);
        tracing::info!("  Learning rate: {}", self.config.learning_rate);
        tracing::info!("  Trainable params: {}", model.num_trainable_params());

        let mut optimizer = AdamW::new(
            &self.var_map,
            AdamWConfig {
                lr: self.config.learning_rate,
                weight_decay: self.config.weight_decay,
                ..Default::default()
            },
        )?;
        let mut scheduler =
            LearningRateScheduler::new(self.config.learning_rate, warmup_steps, total_steps);
        let loss_fn = ContrastiveLoss::new(ContrastiveLossConfig {
            temperature: self.config.temperature,
        });

        std::fs::create_dir_all(&self.config.output_dir)
            .context("Failed to create output directory")?;

        let mut metrics = TrainingMetrics::default();
        let mut history = Vec::new();
        let mut accumulated: Option<Tensor> = None;
        let mut accumulated_steps = 0;

        for epoch in 0..self.config.num_epochs {
            metrics.epoch = epoch + 1;
            let epoch_start = Instant::now();
            let mut epoch_loss = 0.0;
            let mut epoch_samples = 0;

            for batch in dataset.batches(self.config.batch_size) {
                let step_start = Instant::now();

                let loss = self.batch_loss(model, tokenizer, batch, &loss_fn)?;
                let loss_value = loss.to_scalar::<f32>()? as f64;

                // Average over accumulation steps
                let scaled = (&loss / self.config.gradient_accumulation_steps as f64)?;
                accumulated = Some(match accumulated {
                    Some(acc) => (&acc + &scaled)?,
                    None => scaled,
                });
                accumulated_steps += 1;
                epoch_loss += loss_value;
                epoch_samples += batch.len();

                if accumulated_steps >= self.config.gradient_accumulation_steps {
                    if let Some(acc) = accumulated.take() {
                        let grads = acc.backward()?;
                        optimizer.step_reporting_norm(&grads, self.config.max_grad_norm)?;
                        optimizer.set_learning_rate(scheduler.step());
                        metrics.global_step += 1;
                    }
                    accumulated_steps = 0;

                    if self.config.save_steps > 0
                        && metrics.global_step % self.config.save_steps == 0
                    {
                        self.save_checkpoint(model, metrics.global_step)?;
                    }
                }

                metrics.train_loss = loss_value;
                metrics.learning_rate = scheduler.get_lr();
                metrics.samples_per_second =
                    batch.len() as f64 / step_start.elapsed().as_secs_f64().max(1e-9);
                history.push(loss_value);

                if metrics.global_step > 0 && metrics.global_step % self.config.logging_steps == 0
                {
                    tracing::info!("{}", metrics);
                }
            }

            let avg_loss = if epoch_samples > 0 {
                epoch_loss / batches_per_epoch as f64
            } else {
                0.0
            };
            tracing::info!(
                "Epoch {} done in {:.1}s | Avg loss: {:.4} | Samples: {}",
                epoch + 1,
                epoch_start.elapsed().as_secs_f64(),
                avg_loss,
                epoch_samples
            );

            if let Some(eval) = eval_dataset {
                let eval_loss = self.evaluate(model, tokenizer, eval, &loss_fn)?;
                tracing::info!("Validation loss: {:.4}", eval_loss);
            }
        }

        let checkpoint_path = self.config.output_dir.join("lora_checkpoint.safetensors");
        model.save_lora_checkpoint(&checkpoint_path)?;
        tracing::info!("Final checkpoint: {:?}", checkpoint_path);

        Ok(TrainingResult {
            metrics,
            checkpoint_path: Some(checkpoint_path),
            history,
        })
    }

    fn batch_loss(
        &self,
        model: &QaLoraModel,
        tokenizer: &TokenizerWrapper,
        batch: &[QaExample],
        loss_fn: &ContrastiveLoss,
    ) -> Result<Tensor> {
        let questions: Vec<String> = batch.iter().map(|e| e.question.clone()).collect();
        let answers: Vec<String> = batch.iter().map(|e| e.answer.clone()).collect();

        let q_batch = tokenizer.encode_batch(&questions, true)?;
        let (q_ids, q_mask) = q_batch.to_tensors(model.device())?;
        let a_batch = tokenizer.encode_batch(&answers, true)?;
        let (a_ids, a_mask) = a_batch.to_tensors(model.device())?;

        let q_emb = model.encode(&q_ids, &q_mask)?;
        let a_emb = model.encode(&a_ids, &a_mask)?;

        loss_fn.forward(&q_emb, &a_emb)
    }

    fn evaluate(
        &self,
        model: &QaLoraModel,
        tokenizer: &TokenizerWrapper,
        dataset: &TrainingSet,
        loss_fn: &ContrastiveLoss,
    ) -> Result<f64> {
        let mut total = 0.0;
        let mut batches = 0;
        for batch in dataset.batches(self.config.batch_size) {
            let loss = self.batch_loss(model, tokenizer, batch, loss_fn)?;
            total += loss.to_scalar::<f32>()? as f64;
            batches += 1;
        }
        Ok(if batches > 0 { total / batches as f64 } else { 0.0 })
    }

    fn save_checkpoint(&self, model: &QaLoraModel, step: usize) -> Result<()> {
        let path = self
            .config
            .output_dir
            .join(format!("checkpoint-{}.safetensors", step));
        model.save_lora_checkpoint(&path)?;
        tracing::info!("Saved checkpoint to {:?}", path);
        Ok(())
    }

    /// Restore LoRA parameters from an earlier run.
    pub fn load_checkpoint(&mut self, model: &mut QaLoraModel, path: &Path) -> Result<()> {
        model
            .load_lora_checkpoint(path)
            .context("Failed to load checkpoint")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.num_epochs, 3);
        assert!((config.learning_rate - 5e-5).abs() < 1e-12);
        assert_eq!(config.gradient_accumulation_steps, 1);
    }

    #[test]
    fn test_metrics_display() {
        let metrics = TrainingMetrics {
            train_loss: 0.42,
            global_step: 100,
            epoch: 2,
            samples_per_second: 12.5,
            learning_rate: 5e-5,
        };
        let text = metrics.to_string();
        assert!(text.contains("Step 100"));
        assert!(text.contains("Epoch 2"));
        assert!(text.contains("0.4200"));
    }
}
