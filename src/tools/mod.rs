//! Ad hoc document-processing tools
//!
//! Standalone batch jobs for ingesting research papers and a small web
//! search helper. These sit outside the serving path and are driven from the
//! CLI.

pub mod analyzer;
pub mod papers;
pub mod websearch;

pub use analyzer::{extract_dois, PaperReport};
pub use papers::PaperProcessor;
pub use websearch::web_search;
