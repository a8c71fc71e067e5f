//! Retrieval-augmented question answering
//!
//! The inference engine retrieves relevant chunks, assembles them into a
//! prompt, and generates an answer with a local causal LM:
//!
//! ```text
//! question ──▶ Retriever ──▶ ContextBuilder ──▶ Generator ──▶ RagResponse
//! ```

pub mod context;
pub mod engine;
pub mod generator;
pub mod query;

pub use context::{ContextBuilder, PromptTemplates};
pub use engine::{EngineConfig, InferenceEngine, InferenceEngineBuilder};
pub use generator::{CandleGenerator, Generator, GeneratorConfig, SamplingParams};
pub use query::{RagQuery, RagResponse, Source};
