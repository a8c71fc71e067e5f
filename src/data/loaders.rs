//! Document loaders for the knowledge base
//!
//! Plain text, Markdown, and (optionally) PDF sources. Loading a directory
//! walks it recursively and skips files no loader understands.

use crate::data::{Document, DocumentMetadata};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Loads a document from a file on disk.
pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document>;

    /// Whether this loader handles the given file extension.
    fn can_load(&self, path: &Path) -> bool;
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Stable document id derived from the source path.
fn document_id(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("doc_{:x}", hasher.finish())
}

fn base_metadata(path: &Path, file_type: &str) -> Result<DocumentMetadata> {
    let size = fs::metadata(path)?.len();
    Ok(DocumentMetadata {
        file_path: Some(path.to_path_buf()),
        file_type: file_type.to_string(),
        size: Some(size),
        title: None,
    })
}

/// Plain-text loader (`.txt`).
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {:?}", path))?;
        let metadata = base_metadata(path, "txt")?;

        Ok(Document::new(
            document_id(path),
            path.to_string_lossy().to_string(),
            content,
            metadata,
        ))
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["txt"])
    }
}

/// Markdown loader (`.md`, `.markdown`). The first `#` heading becomes the
/// document title.
pub struct MarkdownLoader;

impl DocumentLoader for MarkdownLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read markdown file: {:?}", path))?;

        let mut metadata = base_metadata(path, "md")?;
        metadata.title = content
            .lines()
            .find(|l| l.starts_with("# "))
            .map(|l| l.trim_start_matches("# ").trim().to_string());

        Ok(Document::new(
            document_id(path),
            path.to_string_lossy().to_string(),
            content,
            metadata,
        ))
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["md", "markdown"])
    }
}

/// PDF loader, available with the `pdf` feature.
#[cfg(feature = "pdf")]
pub struct PdfLoader;

#[cfg(feature = "pdf")]
impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Document> {
        let content = pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;
        let metadata = base_metadata(path, "pdf")?;

        Ok(Document::new(
            document_id(path),
            path.to_string_lossy().to_string(),
            content,
            metadata,
        ))
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }
}

/// Multi-format loader over all supported file types.
pub struct CorpusLoader {
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl CorpusLoader {
    pub fn new() -> Self {
        let mut loaders: Vec<Box<dyn DocumentLoader>> =
            vec![Box::new(TextLoader), Box::new(MarkdownLoader)];
        #[cfg(feature = "pdf")]
        loaders.push(Box::new(PdfLoader));
        Self { loaders }
    }

    /// Load a single file with the first loader that accepts it.
    pub fn load(&self, path: &Path) -> Result<Document> {
        for loader in &self.loaders {
            if loader.can_load(path) {
                return loader.load(path);
            }
        }
        anyhow::bail!("No loader for file: {:?}", path)
    }

    /// Whether any loader handles this file.
    pub fn can_load(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.can_load(path))
    }

    /// Load all supported documents under `dir`, recursively. Files that
    /// fail to load are skipped with a warning.
    pub fn load_directory(&self, dir: &Path) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to read directory: {:?}", dir))?
        {
            let path = entry?.path();
            if path.is_dir() {
                documents.extend(self.load_directory(&path)?);
            } else if self.can_load(&path) {
                match self.load(&path) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => tracing::warn!("Skipping {:?}: {:#}", path, e),
                }
            }
        }

        Ok(documents)
    }
}

impl Default for CorpusLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_text_loader() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "Preterm birth complications.").unwrap();

        let doc = TextLoader.load(file.path()).unwrap();
        assert!(doc.content.contains("Preterm birth"));
        assert_eq!(doc.metadata.file_type, "txt");
        assert!(doc.id.starts_with("doc_"));
    }

    #[test]
    fn test_markdown_title_extraction() {
        let mut file = NamedTempFile::with_suffix(".md").unwrap();
        writeln!(file, "# Neonatal Care Guidelines\n\nBody text.").unwrap();

        let doc = MarkdownLoader.load(file.path()).unwrap();
        assert_eq!(
            doc.metadata.title.as_deref(),
            Some("Neonatal Care Guidelines")
        );
    }

    #[test]
    fn test_corpus_loader_walks_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b.md"), "# B\nbeta").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), [0u8, 1]).unwrap();

        let docs = CorpusLoader::new().load_directory(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_unsupported_file_is_error() {
        let loader = CorpusLoader::new();
        assert!(loader.load(Path::new("weights.bin")).is_err());
    }
}
