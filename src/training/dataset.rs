//! Training data
//!
//! Question/answer pairs from the medical QA corpus (JSON array or JSONL),
//! and self-supervised pairs built from processed paper text.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::data::{ChunkConfig, Chunker, Document, DocumentMetadata, SentenceChunker};

/// One training pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaExample {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: Some(42),
        }
    }
}

/// An in-memory training set.
#[derive(Debug)]
pub struct TrainingSet {
    examples: Vec<QaExample>,
    config: DatasetConfig,
}

impl TrainingSet {
    pub fn new(examples: Vec<QaExample>, config: DatasetConfig) -> Self {
        let mut set = Self { examples, config };
        if set.config.shuffle {
            set.shuffle();
        }
        set
    }

    /// Load a JSON array of `{question, answer}` records (the
    /// `medical_qa.json` format).
    pub fn from_json(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open dataset: {:?}", path))?;
        let examples: Vec<QaExample> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse QA dataset: {:?}", path))?;

        tracing::info!("Loaded {} QA pairs from {:?}", examples.len(), path);
        Ok(Self::new(examples, config))
    }

    /// Load one JSON record per line.
    pub fn from_jsonl(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open dataset: {:?}", path))?;

        let mut examples = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let example: QaExample = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSON at line {}", line_num + 1))?;
            examples.push(example);
        }

        tracing::info!("Loaded {} QA pairs from {:?}", examples.len(), path);
        Ok(Self::new(examples, config))
    }

    /// Build self-supervised pairs from a directory of processed paper text:
    /// each chunk is paired with its successor.
    pub fn from_paper_corpus(
        dir: impl AsRef<Path>,
        chunk_config: ChunkConfig,
        config: DatasetConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let chunker = SentenceChunker::new(chunk_config);
        let mut examples = Vec::new();

        let mut entries: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read paper corpus: {:?}", dir))?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.path());

        for entry in entries {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let document = Document::new(
                stem,
                path.to_string_lossy().to_string(),
                content,
                DocumentMetadata::default(),
            );

            let chunks = chunker.chunk(&document)?;
            for pair in chunks.windows(2) {
                examples.push(QaExample {
                    question: pair[0].content.clone(),
                    answer: pair[1].content.clone(),
                });
            }
        }

        tracing::info!(
            "Built {} successor-chunk pairs from paper corpus {:?}",
            examples.len(),
            dir
        );
        Ok(Self::new(examples, config))
    }

    /// Auto-detect: directories are paper corpora, files dispatch on
    /// extension.
    pub fn load(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            return Self::from_paper_corpus(path, ChunkConfig::default(), config);
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => Self::from_jsonl(path, config),
            _ => Self::from_json(path, config),
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&QaExample> {
        self.examples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QaExample> {
        self.examples.iter()
    }

    /// Iterate in contiguous batches.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = &[QaExample]> {
        self.examples.chunks(batch_size.max(1))
    }

    /// Split into train and validation sets.
    pub fn split(&self, train_ratio: f64) -> (Vec<QaExample>, Vec<QaExample>) {
        let idx = (self.examples.len() as f64 * train_ratio) as usize;
        (self.examples[..idx].to_vec(), self.examples[idx..].to_vec())
    }

    fn shuffle(&mut self) {
        let mut rng = match self.config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        self.examples.shuffle(&mut rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn unshuffled() -> DatasetConfig {
        DatasetConfig {
            shuffle: false,
            seed: None,
        }
    }

    #[test]
    fn test_from_json_array() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[{{"question": "What is apnea of prematurity?", "answer": "Pauses in breathing."}},
                {{"question": "What is RDS?", "answer": "Respiratory distress syndrome."}}]"#
        )
        .unwrap();

        let set = TrainingSet::from_json(file.path(), unshuffled()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().question, "What is apnea of prematurity?");
    }

    #[test]
    fn test_from_jsonl_skips_blank_lines() {
        let mut file = NamedTempFile::with_suffix(".jsonl").unwrap();
        writeln!(file, r#"{{"question": "q1", "answer": "a1"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"question": "q2", "answer": "a2"}}"#).unwrap();

        let set = TrainingSet::from_jsonl(file.path(), unshuffled()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_paper_corpus_pairs_successive_chunks() {
        let dir = tempdir().unwrap();
        let text = "One sentence here. Another sentence follows. A third sentence. A fourth one.";
        std::fs::write(dir.path().join("paper.txt"), text).unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let set = TrainingSet::from_paper_corpus(
            dir.path(),
            ChunkConfig {
                chunk_size: 30,
                chunk_overlap: 0,
            },
            unshuffled(),
        )
        .unwrap();

        assert!(!set.is_empty());
        // Each pair's answer is the chunk following its question
        let first = set.get(0).unwrap();
        assert_ne!(first.question, first.answer);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let examples: Vec<QaExample> = (0..32)
            .map(|i| QaExample {
                question: format!("q{}", i),
                answer: format!("a{}", i),
            })
            .collect();

        let config = DatasetConfig {
            shuffle: true,
            seed: Some(7),
        };
        let a = TrainingSet::new(examples.clone(), config.clone());
        let b = TrainingSet::new(examples, config);

        let qa: Vec<_> = a.iter().map(|e| e.question.clone()).collect();
        let qb: Vec<_> = b.iter().map(|e| e.question.clone()).collect();
        assert_eq!(qa, qb);
    }

    #[test]
    fn test_batches_and_split() {
        let examples: Vec<QaExample> = (0..10)
            .map(|i| QaExample {
                question: format!("q{}", i),
                answer: format!("a{}", i),
            })
            .collect();
        let set = TrainingSet::new(examples, unshuffled());

        let batches: Vec<_> = set.batches(4).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 2);

        let (train, val) = set.split(0.8);
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
    }
}
