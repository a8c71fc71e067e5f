//! Query and response types for the inference engine.

use serde::{Deserialize, Serialize};

/// A question posed to the inference engine.
#[derive(Debug, Clone)]
pub struct RagQuery {
    pub question: String,
    /// Number of chunks to retrieve
    pub top_k: usize,
    /// Attach source references to the response
    pub include_sources: bool,
}

impl RagQuery {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            top_k: 4,
            include_sources: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_sources(mut self, include: bool) -> Self {
        self.include_sources = include;
        self
    }
}

/// A reference to a retrieved chunk that informed the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub snippet: String,
}

/// An answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Context string that was sent to the model
    pub context: String,
    pub retrieval_time_ms: u64,
    pub generation_time_ms: u64,
}

impl RagResponse {
    pub fn total_time_ms(&self) -> u64 {
        self.retrieval_time_ms + self.generation_time_ms
    }
}

impl std::fmt::Display for RagResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.answer)?;
        if !self.sources.is_empty() {
            writeln!(f, "\nSources:")?;
            for (i, source) in self.sources.iter().enumerate() {
                writeln!(
                    f,
                    "  [{}] {} (score: {:.4})",
                    i + 1,
                    source.document_id,
                    source.score
                )?;
            }
        }
        write!(
            f,
            "\nretrieval={}ms generation={}ms",
            self.retrieval_time_ms, self.generation_time_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = RagQuery::new("What causes neonatal jaundice?")
            .with_top_k(8)
            .with_sources(false);

        assert_eq!(query.top_k, 8);
        assert!(!query.include_sources);
    }

    #[test]
    fn test_response_display() {
        let response = RagResponse {
            answer: "Elevated bilirubin.".to_string(),
            sources: vec![Source {
                chunk_id: "c1".to_string(),
                document_id: "doc1".to_string(),
                score: 0.92,
                snippet: "bilirubin levels".to_string(),
            }],
            context: String::new(),
            retrieval_time_ms: 12,
            generation_time_ms: 340,
        };

        let text = response.to_string();
        assert!(text.contains("Elevated bilirubin."));
        assert!(text.contains("doc1"));
        assert_eq!(response.total_time_ms(), 352);
    }
}
