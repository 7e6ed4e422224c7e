//! URL list handling.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Read a URLs file: one URL per line, blank lines and `#` comments ignored.
///
/// Duplicates are removed, keeping the first occurrence.
pub fn read_urls_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read URLs file {}", path.display()))?;
    Ok(parse_urls(&content))
}

/// Parse URL list text.
pub fn parse_urls(content: &str) -> Vec<String> {
    let lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string);
    dedupe_urls(lines)
}

/// Drop repeated URLs, preserving first-seen order.
pub fn dedupe_urls(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let urls = parse_urls(
            "# query dsl\nhttps://a/match\n\n   \nhttps://b/term  \n#https://c/skipped\n",
        );
        assert_eq!(urls, vec!["https://a/match", "https://b/term"]);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let urls = parse_urls("https://b\nhttps://a\nhttps://b\nhttps://c\nhttps://a\n");
        assert_eq!(urls, vec!["https://b", "https://a", "https://c"]);
    }

    #[test]
    fn test_read_missing_file_errors() {
        let temp = tempfile::tempdir().unwrap();
        let err = read_urls_file(&temp.path().join("nope.txt")).unwrap_err();
        assert!(err.to_string().contains("failed to read URLs file"));
    }
}
