//! Documentation page parsing.
//!
//! Pages are fetched as markdown and reduced to the handful of facts the
//! generator needs: title, lead paragraph, example code blocks and the
//! parameter names the page documents without showing in code.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

use crate::types::{CodeSample, ParsedDocument, QueryLanguage};

/// First H1 heading.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").unwrap());

/// Fenced code block with an optional language tag.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w+)?\n(.*?)```").unwrap());

/// Headings and inline code that name a parameter.
///
/// SAFETY: Patterns are compile-time constants that are known to be valid.
#[allow(clippy::unwrap_used)]
static PARAM_RES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)###\s+(\w+)\s+parameter").unwrap(),
        Regex::new(r"(?i)####\s+(\w+)").unwrap(),
        Regex::new(r"(?i)`(\w+)`\s+\(.*?\)").unwrap(),
    ]
});

const SLUG_PREFIX: &str = "query-dsl-";

/// URL of the markdown rendition of a page.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    if url.ends_with(".md") {
        url.to_string()
    } else {
        format!("{url}.md")
    }
}

/// Page URL without the markdown suffix.
#[must_use]
pub fn doc_url(url: &str) -> String {
    url.strip_suffix(".md").unwrap_or(url).to_string()
}

/// Output identifier for a page: its last path segment, minus the DSL prefix.
///
/// `https://host/reference/query-dsl-match-query` becomes `match-query`.
#[must_use]
pub fn slug_from_url(url: &str) -> String {
    let page = doc_url(url);
    let path = Url::parse(&page).map_or_else(|_| page.clone(), |u| u.path().to_string());
    let Some(last) = path.split('/').filter(|p| !p.is_empty()).next_back() else {
        return "unknown".to_string();
    };
    last.strip_prefix(SLUG_PREFIX).unwrap_or(last).to_string()
}

/// Query type identifier derived from the slug (`match-query` -> `match_query`).
#[must_use]
pub fn query_type_from_url(url: &str) -> String {
    slug_from_url(url).replace('-', "_")
}

fn extract_title(markdown: &str) -> String {
    TITLE_RE
        .captures(markdown)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn extract_description(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let start = lines
        .iter()
        .position(|l| l.starts_with("# "))
        .map_or(0, |i| i + 1);

    let mut parts = Vec::new();
    for line in &lines[start..] {
        let line = line.trim();
        if line.is_empty() {
            if parts.is_empty() {
                continue;
            }
            break;
        }
        if line.starts_with('#') {
            break;
        }
        parts.push(line);
    }
    parts.join(" ")
}

fn extract_code_samples(markdown: &str) -> Vec<CodeSample> {
    FENCE_RE
        .captures_iter(markdown)
        .filter_map(|caps| {
            let language = caps.get(1).map_or("", |m| m.as_str());
            let code = caps.get(2).map_or("", |m| m.as_str()).trim();
            let lang = language.to_lowercase();
            let looks_like_query = code.to_lowercase().contains("query") || code.contains('{');
            ((lang.is_empty() || lang == "json") && looks_like_query).then(|| CodeSample {
                language: if language.is_empty() {
                    "json".to_string()
                } else {
                    language.to_string()
                },
                code: code.to_string(),
            })
        })
        .collect()
}

fn find_missing_params(markdown: &str, samples: &[CodeSample]) -> Vec<String> {
    let found: BTreeSet<String> = PARAM_RES
        .iter()
        .flat_map(|re| re.captures_iter(markdown))
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
        .collect();

    let sample_text = samples
        .iter()
        .map(|s| s.code.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    found
        .into_iter()
        .filter(|param| !sample_text.contains(param.as_str()))
        .collect()
}

/// Parse a fetched page into a [`ParsedDocument`].
#[must_use]
pub fn parse_document(url: &str, markdown: &str) -> ParsedDocument {
    let title = extract_title(markdown);
    let description = extract_description(markdown);
    let code_examples = extract_code_samples(markdown);
    let missing_params = find_missing_params(markdown, &code_examples);
    let doc_url = doc_url(url);
    let language = QueryLanguage::detect(&doc_url, &title, &description, markdown);

    ParsedDocument {
        url: url.to_string(),
        normalized_url: normalize_url(url),
        slug: slug_from_url(url),
        query_type: query_type_from_url(url),
        doc_url,
        language,
        title,
        description,
        code_examples,
        missing_params,
        raw_markdown: markdown.to_string(),
    }
}
