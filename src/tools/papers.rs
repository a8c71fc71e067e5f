//! Batch paper processing
//!
//! Converts every PDF under the raw directory to plain text in the processed
//! directory and writes one consolidated `metadata.json`. The processed
//! directory is what indexing and paper-corpus training consume.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tools::analyzer::PaperReport;

pub struct PaperProcessor {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

/// Outcome of one batch run.
#[derive(Debug)]
pub struct ProcessingSummary {
    pub processed: usize,
    pub skipped: usize,
    pub metadata_path: PathBuf,
}

impl PaperProcessor {
    pub fn new(raw_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            processed_dir: processed_dir.into(),
        }
    }

    /// Process all PDFs. Papers that fail to parse are skipped with a
    /// warning rather than aborting the batch.
    pub fn process(&self) -> Result<ProcessingSummary> {
        fs::create_dir_all(&self.processed_dir).with_context(|| {
            format!("Failed to create processed dir: {:?}", self.processed_dir)
        })?;

        let mut metadata: BTreeMap<String, PaperReport> = BTreeMap::new();
        let mut processed = 0;
        let mut skipped = 0;

        let mut pdfs: Vec<PathBuf> = fs::read_dir(&self.raw_dir)
            .with_context(|| format!("Failed to read raw dir: {:?}", self.raw_dir))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("pdf"))
            .collect();
        pdfs.sort();

        tracing::info!("Processing {} papers from {:?}", pdfs.len(), self.raw_dir);

        for pdf in &pdfs {
            match self.process_one(pdf) {
                Ok(report) => {
                    let name = pdf
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    metadata.insert(name, report);
                    processed += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {:#}", pdf, e);
                    skipped += 1;
                }
            }
        }

        let metadata_path = self.processed_dir.join("metadata.json");
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        tracing::info!(
            "Paper processing done: {} processed, {} skipped",
            processed,
            skipped
        );

        Ok(ProcessingSummary {
            processed,
            skipped,
            metadata_path,
        })
    }

    #[cfg(feature = "pdf")]
    fn process_one(&self, pdf: &Path) -> Result<PaperReport> {
        let text = pdf_extract::extract_text(pdf)
            .with_context(|| format!("Failed to extract {:?}", pdf))?;

        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        fs::write(self.processed_dir.join(format!("{}.txt", stem)), &text)?;

        Ok(crate::tools::analyzer::analyze_text(pdf, &text))
    }

    #[cfg(not(feature = "pdf"))]
    fn process_one(&self, _pdf: &Path) -> Result<PaperReport> {
        anyhow::bail!("PDF support not enabled. Compile with --features pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_raw_dir_writes_empty_metadata() {
        let raw = tempdir().unwrap();
        let processed = tempdir().unwrap();

        let summary = PaperProcessor::new(raw.path(), processed.path())
            .process()
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 0);
        let metadata = std::fs::read_to_string(summary.metadata_path).unwrap();
        assert_eq!(metadata.trim(), "{}");
    }

    #[test]
    fn test_missing_raw_dir_is_error() {
        let processed = tempdir().unwrap();
        let result = PaperProcessor::new("/nonexistent/raw", processed.path()).process();
        assert!(result.is_err());
    }
}
