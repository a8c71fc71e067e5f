//! Optimization
//!
//! AdamW over the trainable variables, and a linear-warmup / cosine-decay
//! learning rate schedule.

use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::optim::{Optimizer, ParamsAdamW};
use candle_nn::VarMap;

#[derive(Debug, Clone)]
pub struct AdamWConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for AdamWConfig {
    fn default() -> Self {
        Self {
            lr: 5e-5,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

/// AdamW wrapper that tracks its variables so gradient norms can be
/// reported.
pub struct AdamW {
    inner: candle_nn::optim::AdamW,
    vars: Vec<Var>,
    lr: f64,
    step_count: usize,
}

impl AdamW {
    pub fn new(var_map: &VarMap, config: AdamWConfig) -> Result<Self> {
        let vars = var_map.all_vars();
        let inner = candle_nn::optim::AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr: config.lr,
                beta1: config.beta1,
                beta2: config.beta2,
                eps: config.eps,
                weight_decay: config.weight_decay,
            },
        )?;

        Ok(Self {
            inner,
            vars,
            lr: config.lr,
            step_count: 0,
        })
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.inner.step(grads)?;
        self.step_count += 1;
        Ok(())
    }

    /// Step and return the pre-step gradient L2 norm. Norms above `max_norm`
    /// are logged; candle's GradStore is immutable so the loss itself must be
    /// scaled if hard clipping is required.
    pub fn step_reporting_norm(&mut self, grads: &GradStore, max_norm: f64) -> Result<f64> {
        let norm = self.grad_norm(grads)?;
        if norm > max_norm {
            tracing::debug!("Gradient norm {:.4} exceeds max {:.4}", norm, max_norm);
        }
        self.step(grads)?;
        Ok(norm)
    }

    fn grad_norm(&self, grads: &GradStore) -> Result<f64> {
        let mut total = 0.0f64;
        for var in &self.vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let sq: f32 = grad.sqr()?.sum_all()?.to_scalar()?;
                total += sq as f64;
            }
        }
        Ok(total.sqrt())
    }

    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
        self.inner.set_learning_rate(lr);
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }
}

/// Linear warmup then cosine decay to zero.
pub struct LearningRateScheduler {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl LearningRateScheduler {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self {
            base_lr,
            warmup_steps,
            total_steps: total_steps.max(1),
            current_step: 0,
        }
    }

    pub fn get_lr(&self) -> f64 {
        if self.current_step < self.warmup_steps {
            return self.base_lr * (self.current_step as f64 / self.warmup_steps as f64);
        }
        let decay_steps = (self.total_steps - self.warmup_steps).max(1);
        let progress = (self.current_step - self.warmup_steps) as f64 / decay_steps as f64;
        let progress = progress.min(1.0);
        self.base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }

    /// Advance one step and return the new learning rate.
    pub fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.get_lr()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_starts_at_zero() {
        let scheduler = LearningRateScheduler::new(1e-4, 100, 1000);
        assert_eq!(scheduler.get_lr(), 0.0);
    }

    #[test]
    fn test_cosine_decay() {
        let mut scheduler = LearningRateScheduler::new(1e-4, 0, 1000);
        assert!((scheduler.get_lr() - 1e-4).abs() < 1e-10);

        for _ in 0..500 {
            scheduler.step();
        }
        assert!((scheduler.get_lr() - 0.5e-4).abs() < 1e-6);

        for _ in 0..500 {
            scheduler.step();
        }
        assert!(scheduler.get_lr() < 1e-8);
    }

    #[test]
    fn test_lr_never_negative_past_total() {
        let mut scheduler = LearningRateScheduler::new(1e-4, 0, 10);
        for _ in 0..25 {
            scheduler.step();
        }
        assert!(scheduler.get_lr() >= 0.0);
    }

    #[test]
    fn test_adamw_steps_a_var() {
        use candle_core::{DType, Device};
        use candle_nn::{Init, VarMap};

        let var_map = VarMap::new();
        let device = Device::Cpu;
        let var = var_map
            .get((2, 2), "w", Init::Const(1.0), DType::F32, &device)
            .unwrap();

        let mut optimizer = AdamW::new(&var_map, AdamWConfig::default()).unwrap();

        let loss = var.sum_all().unwrap();
        let grads = loss.backward().unwrap();
        optimizer.step_reporting_norm(&grads, 1.0).unwrap();

        assert_eq!(optimizer.step_count(), 1);
        let value: f32 = var_map.all_vars()[0]
            .as_tensor()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(value < 4.0); // moved away from the all-ones init
    }
}
