//! # medrag
//!
//! Retrieval-augmented question answering over medical literature.
//!
//! ## Overview
//!
//! The crate covers the full path from research papers to answered
//! questions:
//!
//! - Document ingestion and chunking (txt, Markdown, PDF)
//! - Embedding generation with candle, with a persistent cache
//! - Dense (HNSW), sparse (BM25), and hybrid retrieval
//! - A retrieval-augmented inference engine over a local causal LM
//! - An axum HTTP endpoint exposing the engine
//! - LoRA fine-tuning of the QA representation space
//! - Ad hoc paper-processing tools and a rule-based medical tokenizer
//!
//! ## Modules
//!
//! - `vocab` - medical vocabulary tokenizer
//! - `data` - documents, loaders, chunking
//! - `embedding` - embedding backends and cache
//! - `retrieval` - index build and query
//! - `rag` - context assembly, generation, the inference engine
//! - `server` - HTTP API
//! - `training` - fine-tuning
//! - `tools` - paper processing and web search
//! - `cli` - command implementations

pub mod cli;
pub mod config;
pub mod data;
pub mod embedding;
pub mod rag;
pub mod retrieval;
pub mod server;
pub mod tools;
pub mod training;
pub mod vocab;

pub use anyhow::{Error, Result};
