//! Web search helper
//!
//! Fetches a search results page and extracts outbound result links. A
//! demonstration tool, not a serving dependency.

use anyhow::{Context, Result};
use regex::Regex;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; MedragBot/0.1)";

/// Search the web and return up to `num_results` result URLs.
pub fn web_search(query: &str, num_results: usize) -> Result<Vec<String>> {
    let url = format!(
        "https://www.google.com/search?q={}&num={}",
        urlencode(query),
        num_results
    );

    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let body = client
        .get(&url)
        .send()
        .context("Search request failed")?
        .error_for_status()
        .context("Search returned an error status")?
        .text()
        .context("Failed to read search response")?;

    Ok(extract_links(&body, num_results))
}

/// Pull external http(s) links out of result-page HTML.
pub fn extract_links(html: &str, limit: usize) -> Vec<String> {
    let href = Regex::new(r#"href="(https?://[^"]+)""#).expect("valid href pattern");

    let mut links = Vec::new();
    for cap in href.captures_iter(html) {
        let url = cap[1].to_string();
        // Skip the search engine's own navigation links
        if url.contains("google.com") {
            continue;
        }
        if !links.contains(&url) {
            links.push(url);
        }
        if links.len() >= limit {
            break;
        }
    }
    links
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            other => format!("%{:02X}", other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_links_filters_and_dedupes() {
        let html = r#"
            <a href="https://www.google.com/preferences">settings</a>
            <a href="https://pubmed.ncbi.nlm.nih.gov/12345/">result 1</a>
            <a href="https://pubmed.ncbi.nlm.nih.gov/12345/">result 1 again</a>
            <a href="http://who.int/neonatal">result 2</a>
        "#;

        let links = extract_links(html, 5);
        assert_eq!(
            links,
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/12345/".to_string(),
                "http://who.int/neonatal".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_respects_limit() {
        let html = r#"
            <a href="https://a.example/1">1</a>
            <a href="https://b.example/2">2</a>
            <a href="https://c.example/3">3</a>
        "#;
        assert_eq!(extract_links(html, 2).len(), 2);
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("neonatal sepsis"), "neonatal+sepsis");
        assert_eq!(urlencode("a&b"), "a%26b");
    }
}
