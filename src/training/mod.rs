//! Fine-tuning
//!
//! Parameter-efficient adaptation of the QA model on medical question/answer
//! pairs (and on processed paper text), using LoRA adapters over a frozen
//! decoder.
//!
//! # Modules
//!
//! - `device` - CPU/CUDA/Metal selection
//! - `hub` - HuggingFace Hub and local model resolution
//! - `tokenizer` - wrapper over the `tokenizers` crate
//! - `dataset` - QA pairs and paper-corpus loading
//! - `lora` - low-rank adapter configuration and projection
//! - `model` - frozen Qwen2 decoder with trainable LoRA projection
//! - `loss` - contrastive alignment loss
//! - `optimizer` - AdamW and LR scheduling
//! - `trainer` - the training loop
//! - `embedder` - bridge from the fine-tuned model into the `Embedder` trait

pub mod dataset;
pub mod device;
pub mod embedder;
pub mod hub;
pub mod lora;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod tokenizer;
pub mod trainer;

pub use dataset::{DatasetConfig, QaExample, TrainingSet};
pub use device::{select_device, DevicePreference};
pub use embedder::LoraEmbedder;
pub use hub::{ModelLoader, ModelPath};
pub use lora::{LoraConfig, LoraProjection};
pub use model::QaLoraModel;
pub use tokenizer::TokenizerWrapper;
pub use trainer::{Trainer, TrainingConfig, TrainingMetrics, TrainingResult};
