//! Prompt assembly
//!
//! Joins retrieved chunks into a bounded context block and instantiates a
//! prompt template around it.

use crate::retrieval::SearchResult;
use std::collections::HashMap;

/// Named prompt templates with `{context}` and `{question}` placeholders.
pub struct PromptTemplates {
    templates: HashMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let mut templates = HashMap::new();

        // The plain retrieval-augmented shape: context, question, answer.
        templates.insert(
            "default".to_string(),
            "{context}\n\nQuestion: {question}\nAnswer:".to_string(),
        );

        templates.insert(
            "clinical".to_string(),
            concat!(
                "You are a careful clinical assistant. Answer using only the ",
                "reference excerpts below. If the excerpts do not contain the ",
                "answer, say so. Cite excerpts as [Excerpt N].\n\n",
                "Reference excerpts:\n{context}\n\n",
                "Question: {question}\n\n",
                "Answer:"
            )
            .to_string(),
        );

        templates.insert(
            "concise".to_string(),
            concat!(
                "Answer the question using only the context below. ",
                "Be concise.\n\n",
                "Context:\n{context}\n\n",
                "Question: {question}\nAnswer:"
            )
            .to_string(),
        );

        Self { templates }
    }
}

impl PromptTemplates {
    /// Look up a template, falling back to `default`.
    pub fn get(&self, name: &str) -> &str {
        self.templates
            .get(name)
            .or_else(|| self.templates.get("default"))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn register(&mut self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

/// Builds the context block and final prompt for generation.
pub struct ContextBuilder {
    templates: PromptTemplates,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            templates: PromptTemplates::default(),
        }
    }

    pub fn with_templates(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    /// Join retrieved chunks into a context string, stopping at `max_chars`.
    /// A chunk that would overflow the budget is dropped rather than cut
    /// mid-sentence.
    pub fn build(&self, results: &[SearchResult], max_chars: usize) -> String {
        let mut context = String::new();

        for (i, result) in results.iter().enumerate() {
            let block = format!("[Excerpt {}] {}\n\n", i + 1, result.chunk.content.trim());
            if context.len() + block.len() > max_chars {
                break;
            }
            context.push_str(&block);
        }

        context.trim_end().to_string()
    }

    /// Instantiate the named template with context and question.
    pub fn format_prompt(&self, question: &str, context: &str, template_name: &str) -> String {
        self.templates
            .get(template_name)
            .replace("{context}", context)
            .replace("{question}", question)
    }

    /// `build` + `format_prompt` in one call.
    pub fn build_prompt(
        &self,
        question: &str,
        results: &[SearchResult],
        max_context_chars: usize,
        template_name: &str,
    ) -> String {
        let context = self.build(results, max_context_chars);
        self.format_prompt(question, &context, template_name)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Chunk, DocumentMetadata};

    fn result(chunk_id: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: chunk_id.to_string(),
            chunk: Chunk {
                id: chunk_id.to_string(),
                document_id: "doc1".to_string(),
                content: content.to_string(),
                start_pos: 0,
                end_pos: content.len(),
                chunk_index: 0,
                metadata: DocumentMetadata::default(),
            },
            score,
            rank: 1,
        }
    }

    #[test]
    fn test_build_context_numbers_excerpts() {
        let builder = ContextBuilder::new();
        let results = vec![
            result("c1", "First passage.", 0.9),
            result("c2", "Second passage.", 0.8),
        ];

        let context = builder.build(&results, 1000);
        assert!(context.contains("[Excerpt 1] First passage."));
        assert!(context.contains("[Excerpt 2] Second passage."));
    }

    #[test]
    fn test_build_context_honors_budget() {
        let builder = ContextBuilder::new();
        let long = "x".repeat(400);
        let results = vec![result("c1", &long, 0.9), result("c2", &long, 0.8)];

        let context = builder.build(&results, 450);
        assert!(context.contains("[Excerpt 1]"));
        assert!(!context.contains("[Excerpt 2]"));
        assert!(context.len() <= 450);
    }

    #[test]
    fn test_format_prompt_default_shape() {
        let builder = ContextBuilder::new();
        let prompt = builder.format_prompt("What is X?", "X is a thing.", "default");

        assert_eq!(prompt, "X is a thing.\n\nQuestion: What is X?\nAnswer:");
    }

    #[test]
    fn test_unknown_template_falls_back() {
        let builder = ContextBuilder::new();
        let prompt = builder.format_prompt("Q", "C", "nonexistent");
        assert!(prompt.ends_with("Answer:"));
        assert!(prompt.contains("Question: Q"));
    }

    #[test]
    fn test_custom_template() {
        let mut templates = PromptTemplates::default();
        templates.register("bare", "{question}");
        let builder = ContextBuilder::with_templates(templates);

        assert_eq!(builder.format_prompt("Only Q", "ignored", "bare"), "Only Q");
    }
}
