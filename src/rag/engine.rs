//! The inference engine
//!
//! Composes a retriever, a context builder, and a generator into one
//! question-answering call.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::rag::context::ContextBuilder;
use crate::rag::generator::{Generator, SamplingParams};
use crate::rag::query::{RagQuery, RagResponse, Source};
use crate::retrieval::Retriever;

/// Engine-level configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default number of chunks to retrieve
    pub top_k: usize,
    /// Budget for the assembled context block, in characters
    pub max_context_chars: usize,
    /// Prompt template name
    pub template: String,
    pub sampling: SamplingParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 4000,
            template: "default".to_string(),
            sampling: SamplingParams::default(),
        }
    }
}

/// Retrieval-augmented question answering engine.
pub struct InferenceEngine {
    retriever: Arc<dyn Retriever>,
    generator: Box<dyn Generator>,
    context_builder: ContextBuilder,
    config: EngineConfig,
}

impl InferenceEngine {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Box<dyn Generator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            context_builder: ContextBuilder::new(),
            config,
        }
    }

    /// Answer a question: retrieve, assemble context, generate.
    pub fn answer(&self, query: &RagQuery) -> Result<RagResponse> {
        let retrieval_start = Instant::now();
        let results = self
            .retriever
            .retrieve(&query.question, query.top_k)
            .context("Retrieval failed")?;
        let retrieval_time_ms = retrieval_start.elapsed().as_millis() as u64;

        let context = self
            .context_builder
            .build(&results, self.config.max_context_chars);
        let prompt =
            self.context_builder
                .format_prompt(&query.question, &context, &self.config.template);

        let generation_start = Instant::now();
        let raw = self
            .generator
            .generate(&prompt, &self.config.sampling)
            .context("Generation failed")?;
        let generation_time_ms = generation_start.elapsed().as_millis() as u64;

        let sources = if query.include_sources {
            results
                .iter()
                .map(|r| Source {
                    chunk_id: r.chunk_id.clone(),
                    document_id: r.chunk.document_id.clone(),
                    score: r.score,
                    snippet: truncate_snippet(&r.chunk.content, 200),
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(RagResponse {
            answer: extract_answer(&raw),
            sources,
            context,
            retrieval_time_ms,
            generation_time_ms,
        })
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Builder for [`InferenceEngine`].
#[derive(Default)]
pub struct InferenceEngineBuilder {
    retriever: Option<Arc<dyn Retriever>>,
    generator: Option<Box<dyn Generator>>,
    config: EngineConfig,
}

impl InferenceEngineBuilder {
    pub fn new() -> Self {
        Self {
            retriever: None,
            generator: None,
            config: EngineConfig::default(),
        }
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn build(self) -> Result<InferenceEngine> {
        let retriever = self.retriever.context("Engine requires a retriever")?;
        let generator = self.generator.context("Engine requires a generator")?;
        Ok(InferenceEngine::new(retriever, generator, self.config))
    }
}

/// Models sometimes echo the prompt scaffold back; keep only what follows
/// the final `Answer:` marker.
fn extract_answer(raw: &str) -> String {
    match raw.rfind("Answer:") {
        Some(idx) => raw[idx + "Answer:".len()..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Truncate at a word boundary and mark the cut.
fn truncate_snippet(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(space) => format!("{}...", &truncated[..space]),
        None => format!("{}...", truncated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Chunk, DocumentMetadata};
    use crate::retrieval::SearchResult;

    struct CannedRetriever {
        results: Vec<SearchResult>,
    }

    impl Retriever for CannedRetriever {
        fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
            Ok(self.results.iter().take(top_k).cloned().collect())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    struct EchoGenerator;

    impl Generator for EchoGenerator {
        fn generate(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
            Ok(format!("{} generated answer", prompt))
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        fn count_tokens(&self, text: &str) -> Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    fn engine() -> InferenceEngine {
        let results = vec![SearchResult {
            chunk_id: "c1".to_string(),
            chunk: Chunk {
                id: "c1".to_string(),
                document_id: "doc1".to_string(),
                content: "Neonatal sepsis is treated with ampicillin.".to_string(),
                start_pos: 0,
                end_pos: 43,
                chunk_index: 0,
                metadata: DocumentMetadata::default(),
            },
            score: 0.9,
            rank: 1,
        }];

        InferenceEngineBuilder::new()
            .retriever(Arc::new(CannedRetriever { results }))
            .generator(Box::new(EchoGenerator))
            .build()
            .unwrap()
    }

    #[test]
    fn test_answer_flows_retrieval_into_prompt() {
        let engine = engine();
        let response = engine
            .answer(&RagQuery::new("How is neonatal sepsis treated?"))
            .unwrap();

        // The echoed prompt shows the context and question reached the model,
        // and extract_answer stripped everything before the Answer: marker.
        assert_eq!(response.answer, "generated answer");
        assert!(response.context.contains("ampicillin"));
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].document_id, "doc1");
    }

    #[test]
    fn test_sources_omitted_on_request() {
        let engine = engine();
        let response = engine
            .answer(&RagQuery::new("question").with_sources(false))
            .unwrap();
        assert!(response.sources.is_empty());
    }

    #[test]
    fn test_builder_requires_parts() {
        assert!(InferenceEngineBuilder::new().build().is_err());
    }

    #[test]
    fn test_extract_answer() {
        assert_eq!(extract_answer("Context\nAnswer: the answer"), "the answer");
        assert_eq!(extract_answer("no marker here"), "no marker here");
        assert_eq!(
            extract_answer("Answer: first\nAnswer: second"),
            "second"
        );
    }

    #[test]
    fn test_truncate_snippet() {
        let text = "a long snippet that should be truncated at a word";
        let out = truncate_snippet(text, 20);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 23);
        assert_eq!(truncate_snippet("short", 20), "short");
    }
}
