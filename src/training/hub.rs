//! Model resolution
//!
//! Resolves a model id to local files, downloading from the HuggingFace Hub
//! when the id is not a directory on disk.

use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::Api;
use std::path::{Path, PathBuf};

/// Resolved locations of a model's files.
#[derive(Debug, Clone)]
pub struct ModelPath {
    /// Directory containing the model files
    pub path: PathBuf,
    pub model_id: String,
    pub is_local: bool,
    pub config_file: PathBuf,
    /// Primary weights file (single-file models)
    pub weights_file: PathBuf,
    pub tokenizer_file: Option<PathBuf>,
}

impl ModelPath {
    /// Build from a local model directory.
    pub fn from_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(anyhow!("Model directory does not exist: {:?}", path));
        }

        let config_file = path.join("config.json");
        if !config_file.exists() {
            return Err(anyhow!("config.json not found in {:?}", path));
        }

        let weights_file = path.join("model.safetensors");
        let weights_file = if weights_file.exists() {
            weights_file
        } else {
            // Sharded models carry an index file instead of a single weight file
            Self::find_shards(&path)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("No safetensors weights found in {:?}", path))?
        };

        let tokenizer_file = path.join("tokenizer.json");

        Ok(Self {
            model_id: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "local".to_string()),
            path: path.clone(),
            is_local: true,
            config_file,
            weights_file,
            tokenizer_file: tokenizer_file.exists().then_some(tokenizer_file),
        })
    }

    /// All weight files: the single `model.safetensors`, or sorted shards.
    pub fn weight_files(&self) -> Result<Vec<PathBuf>> {
        let single = self.path.join("model.safetensors");
        if single.exists() {
            return Ok(vec![single]);
        }
        let shards = Self::find_shards(&self.path)?;
        if shards.is_empty() {
            // Hub downloads may land outside the snapshot dir layout
            return Ok(vec![self.weights_file.clone()]);
        }
        Ok(shards)
    }

    fn find_shards(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut shards = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.starts_with("model-") && name.ends_with(".safetensors") {
                shards.push(path);
            }
        }
        shards.sort();
        Ok(shards)
    }
}

/// Resolves model ids to files, local directories first.
pub struct ModelLoader {
    api: Api,
}

impl ModelLoader {
    pub fn new() -> Result<Self> {
        let api = Api::new().context("Failed to initialize HuggingFace Hub API")?;
        Ok(Self { api })
    }

    /// Resolve `model_id_or_path`: an existing directory is used as-is,
    /// anything else is treated as a Hub model id and downloaded.
    pub fn load_model_path(&self, model_id_or_path: &str) -> Result<ModelPath> {
        let local = Path::new(model_id_or_path);
        if local.is_dir() {
            tracing::debug!("Using local model directory: {:?}", local);
            return ModelPath::from_local(local);
        }
        self.download(model_id_or_path)
    }

    fn download(&self, model_id: &str) -> Result<ModelPath> {
        tracing::info!("Fetching model from HuggingFace Hub: {}", model_id);

        let repo = self.api.model(model_id.to_string());

        let config_file = repo
            .get("config.json")
            .context("Failed to download config.json")?;

        let weights_file = repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors (only safetensors weights are supported)")?;

        let tokenizer_file = repo.get("tokenizer.json").ok();

        let path = config_file
            .parent()
            .ok_or_else(|| anyhow!("Invalid config path"))?
            .to_path_buf();

        Ok(ModelPath {
            path,
            model_id: model_id.to_string(),
            is_local: false,
            config_file,
            weights_file,
            tokenizer_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_model_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"x").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();

        let model_path = ModelPath::from_local(dir.path()).unwrap();
        assert!(model_path.is_local);
        assert!(model_path.tokenizer_file.is_some());
        assert_eq!(model_path.weight_files().unwrap().len(), 1);
    }

    #[test]
    fn test_local_model_path_sharded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("model-00002-of-00002.safetensors"), b"b").unwrap();
        std::fs::write(dir.path().join("model-00001-of-00002.safetensors"), b"a").unwrap();

        let model_path = ModelPath::from_local(dir.path()).unwrap();
        let files = model_path.weight_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].to_string_lossy().contains("00001"));
    }

    #[test]
    fn test_missing_directory_is_error() {
        assert!(ModelPath::from_local("/nonexistent/model").is_err());
    }

    #[test]
    fn test_missing_config_is_error() {
        let dir = tempdir().unwrap();
        assert!(ModelPath::from_local(dir.path()).is_err());
    }
}
