//! Project configuration
//!
//! `config.yaml` holds the model and training defaults; CLI flags override
//! individual fields. Missing file or missing keys fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelSection,
    pub training: TrainingSection,
    pub data: DataSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Base causal LM for generation and fine-tuning
    pub base_model: String,
    /// Output directory for fine-tuned artifacts
    pub fine_tuned: PathBuf,
    /// Sentence embedding model for indexing
    pub embedding_model: String,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            base_model: "Qwen/Qwen2.5-0.5B".to_string(),
            fine_tuned: PathBuf::from("model/fine_tuned"),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 2,
            lr: 5e-5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub knowledge_base: PathBuf,
    pub medical_qa: PathBuf,
    pub papers_raw: PathBuf,
    pub papers_processed: PathBuf,
    pub vocab: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            knowledge_base: PathBuf::from("data/knowledge_base"),
            medical_qa: PathBuf::from("data/medical_qa.json"),
            papers_raw: PathBuf::from("data/research_papers/raw"),
            papers_processed: PathBuf::from("data/research_papers/processed"),
            vocab: PathBuf::from("data/vocab.txt"),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_yaml::from_str(&text).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.model.base_model, "Qwen/Qwen2.5-0.5B");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            "model:\n  base_model: gpt2\ntraining:\n  epochs: 5"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.model.base_model, "gpt2");
        assert_eq!(config.training.epochs, 5);
        // Unspecified keys fall back
        assert_eq!(config.training.batch_size, 2);
        assert_eq!(config.data.vocab, PathBuf::from("data/vocab.txt"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.training.epochs, 3);
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(file, "model: [not a map").unwrap();
        assert!(AppConfig::load(file.path()).is_err());
    }
}
