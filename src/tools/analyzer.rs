//! PDF analysis
//!
//! Extracts full text, a title heuristic, and DOI references from a research
//! paper.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extracted facts about one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperReport {
    pub source: PathBuf,
    /// First non-empty text line, which is usually the title
    pub title: Option<String>,
    /// DOI references found in the text, deduplicated and sorted
    pub dois: Vec<String>,
    /// Extracted text length in chars
    pub text_chars: usize,
}

/// Pull DOI identifiers out of free text.
pub fn extract_dois(text: &str) -> Vec<String> {
    // DOI syntax: 10.<registrant>/<suffix>
    let pattern = Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+").expect("valid DOI pattern");
    let unique: BTreeSet<String> = pattern
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ';', ')']).to_string())
        .collect();
    unique.into_iter().collect()
}

fn first_line_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.to_string())
}

/// Analyze a PDF on disk.
#[cfg(feature = "pdf")]
pub fn analyze_pdf(path: &Path) -> Result<PaperReport> {
    if !path.exists() {
        anyhow::bail!("PDF not found: {:?}", path);
    }

    let text = pdf_extract::extract_text(path)
        .with_context(|| format!("Failed to extract text from {:?}", path))?;

    Ok(analyze_text(path, &text))
}

#[cfg(not(feature = "pdf"))]
pub fn analyze_pdf(_path: &Path) -> Result<PaperReport> {
    anyhow::bail!("PDF support not enabled. Compile with --features pdf")
}

/// Analyze already-extracted text.
pub fn analyze_text(source: &Path, text: &str) -> PaperReport {
    PaperReport {
        source: source.to_path_buf(),
        title: first_line_title(text),
        dois: extract_dois(text),
        text_chars: text.chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dois() {
        let text = "See doi:10.1056/NEJMoa2029849 and https://doi.org/10.1001/jama.2020.1585. \
                    Repeated: 10.1056/NEJMoa2029849";
        let dois = extract_dois(text);

        assert_eq!(dois.len(), 2);
        assert!(dois.contains(&"10.1056/NEJMoa2029849".to_string()));
        assert!(dois.contains(&"10.1001/jama.2020.1585".to_string()));
    }

    #[test]
    fn test_extract_dois_none() {
        assert!(extract_dois("no identifiers here").is_empty());
    }

    #[test]
    fn test_analyze_text() {
        let report = analyze_text(
            Path::new("paper.pdf"),
            "\n  Outcomes of Extremely Preterm Infants\nAbstract...\n10.1056/NEJMoa123456\n",
        );

        assert_eq!(
            report.title.as_deref(),
            Some("Outcomes of Extremely Preterm Infants")
        );
        assert_eq!(report.dois.len(), 1);
        assert!(report.text_chars > 0);
    }
}
