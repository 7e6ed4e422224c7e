//! Post-parse normalization of generated artifacts.
//!
//! Language models drift from the requested shape in predictable ways:
//! fenced replies, single-quoted ES|QL literals, missing per-dataset maps,
//! one-character suggestion fragments. Everything here is pure so it can be
//! applied to fresh and cached replies alike.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::schema::{DatasetSchema, SchemaCatalog};
use crate::types::{LabConfig, ParsedDocument, QueryLanguage, QueryStructure, Template};

/// Single-quoted string literal.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static SINGLE_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']*)'").unwrap());

/// Suggestions at or below this length are fragments, not advice.
const MIN_SUGGESTION_LEN: usize = 5;

const DEFAULT_DISPLAY_FIELDS: [(&str, &str); 3] = [
    ("products", "product_name"),
    ("product_reviews", "review_title"),
    ("product_users", "username"),
];

const DEFAULT_SEARCH_FIELDS: [(&str, &str); 3] = [
    ("products", "product_name"),
    ("product_reviews", "review_text"),
    ("product_users", "interests"),
];

const DEFAULT_SAMPLE_QUERIES: [(&str, &str); 3] = [
    ("products", "wireless"),
    ("product_reviews", "comfortable"),
    ("product_users", "Electronics"),
];

/// Remove a surrounding markdown code fence.
///
/// Replies that do not start with a fence are returned trimmed and otherwise
/// untouched.
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut inside = false;
    let mut body = Vec::new();
    for line in trimmed.lines() {
        if line.trim_start().starts_with("```") {
            inside = !inside;
            continue;
        }
        if inside {
            body.push(line);
        }
    }
    body.join("\n").trim().to_string()
}

/// Remove one pair of matching quotes wrapped around the whole text.
#[must_use]
pub fn strip_wrapping_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\'', '`'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].trim();
        }
    }
    trimmed
}

/// Rewrite `'literal'` to `"literal"`.
#[must_use]
pub fn double_quote_literals(query: &str) -> String {
    SINGLE_QUOTED_RE.replace_all(query, "\"$1\"").into_owned()
}

fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn fill_map<F>(
    target: &mut BTreeMap<String, String>,
    catalog: &SchemaCatalog,
    fallback: &[(&str, &str)],
    pick: F,
) where
    F: Fn(&DatasetSchema) -> Option<String>,
{
    if !target.is_empty() {
        return;
    }
    let from_catalog: BTreeMap<String, String> = catalog
        .iter()
        .filter_map(|(name, schema)| pick(schema).map(|v| (name.to_string(), v)))
        .collect();
    *target = if from_catalog.is_empty() {
        defaults(fallback)
    } else {
        from_catalog
    };
}

/// Repair structural drift in a freshly parsed artifact.
///
/// Missing per-dataset maps are filled from the schema catalog (or fixed
/// defaults when the catalog has nothing to offer), suggestion fragments are
/// dropped, ES|QL literals are double-quoted and empty templates are removed.
pub fn normalize_lab_config(config: &mut LabConfig, doc: &ParsedDocument, catalog: &SchemaCatalog) {
    config.query_language = doc.language;
    if config.query_type.trim().is_empty() {
        config.query_type.clone_from(&doc.query_type);
    }
    if config.doc_url.trim().is_empty() {
        config.doc_url.clone_from(&doc.doc_url);
    }

    fill_map(&mut config.key_display_fields, catalog, &DEFAULT_DISPLAY_FIELDS, |s| {
        s.key_display_field.clone()
    });
    fill_map(&mut config.search_fields, catalog, &DEFAULT_SEARCH_FIELDS, |s| {
        s.searchable_text_fields.first().cloned()
    });
    fill_map(&mut config.sample_queries, catalog, &DEFAULT_SAMPLE_QUERIES, |s| {
        s.sample_query.clone()
    });
    if config.query_structure.is_none() {
        config.query_structure = Some(QueryStructure::default());
    }

    let quote_fix = doc.language == QueryLanguage::Esql;
    for example in &mut config.examples {
        example
            .try_this
            .retain(|s| s.chars().count() > MIN_SUGGESTION_LEN);

        if quote_fix {
            match &mut example.template {
                Template::Text(text) => *text = double_quote_literals(text),
                Template::PerDataset(map) => {
                    for query in map.values_mut() {
                        *query = double_quote_literals(query);
                    }
                },
                Template::Structured(_) => {},
            }
        }
    }

    let before = config.examples.len();
    config.examples.retain(|e| !e.template.is_empty());
    let dropped = before - config.examples.len();
    if dropped > 0 {
        warn!(dropped, query_type = %config.query_type, "dropped examples with empty templates");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use crate::schema::tests::sample_catalog;
    use crate::types::Example;

    fn esql_doc() -> ParsedDocument {
        parse_document(
            "https://x/reference/esql/esql-commands",
            "# ES|QL commands\n\nPiped queries.\n",
        )
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\nFROM x\n| LIMIT 1\n```\ntrailing"), "FROM x\n| LIMIT 1");
    }

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("\"FROM x\""), "FROM x");
        assert_eq!(strip_wrapping_quotes("`FROM x`"), "FROM x");
        assert_eq!(strip_wrapping_quotes("FROM x | WHERE a == \"b\""), "FROM x | WHERE a == \"b\"");
        assert_eq!(strip_wrapping_quotes("'"), "'");
    }

    #[test]
    fn test_double_quote_literals() {
        assert_eq!(
            double_quote_literals("FROM p | WHERE name LIKE '*wireless*' AND c == 'Books'"),
            "FROM p | WHERE name LIKE \"*wireless*\" AND c == \"Books\""
        );
        assert_eq!(double_quote_literals("FROM p"), "FROM p");
    }

    #[test]
    fn test_fills_maps_from_catalog() {
        let mut config = LabConfig::default();
        normalize_lab_config(&mut config, &esql_doc(), &sample_catalog());

        assert_eq!(config.key_display_fields["product_reviews"], "review_title");
        assert_eq!(config.search_fields["products"], "product_description");
        assert_eq!(config.sample_queries["product_users"], "Electronics");
        assert_eq!(config.query_structure, Some(QueryStructure::default()));
        assert_eq!(config.query_language, QueryLanguage::Esql);
        assert_eq!(config.query_type, "esql_commands");
        assert_eq!(config.doc_url, "https://x/reference/esql/esql-commands");
    }

    #[test]
    fn test_fills_maps_from_defaults_without_catalog() {
        let mut config = LabConfig::default();
        normalize_lab_config(&mut config, &esql_doc(), &SchemaCatalog::default());

        assert_eq!(config.search_fields["products"], "product_name");
        assert_eq!(config.sample_queries["products"], "wireless");
    }

    #[test]
    fn test_keeps_existing_maps() {
        let mut config = LabConfig {
            search_fields: BTreeMap::from([("products".to_string(), "category".to_string())]),
            ..LabConfig::default()
        };
        normalize_lab_config(&mut config, &esql_doc(), &sample_catalog());
        assert_eq!(config.search_fields.len(), 1);
    }

    #[test]
    fn test_examples_cleanup() {
        let mut config = LabConfig {
            examples: vec![
                Example {
                    id: "a".to_string(),
                    template: Template::Text("FROM products | WHERE c == 'Books'".to_string()),
                    try_this: vec!["x".to_string(), "Change the category".to_string()],
                    ..Example::default()
                },
                Example {
                    id: "empty".to_string(),
                    template: Template::Text("  ".to_string()),
                    ..Example::default()
                },
            ],
            ..LabConfig::default()
        };
        normalize_lab_config(&mut config, &esql_doc(), &sample_catalog());

        assert_eq!(config.examples.len(), 1);
        assert_eq!(config.examples[0].try_this, vec!["Change the category"]);
        assert_eq!(
            config.examples[0].template,
            Template::Text("FROM products | WHERE c == \"Books\"".to_string())
        );
    }

    #[test]
    fn test_query_dsl_templates_keep_single_quotes() {
        let doc = parse_document("https://x/query-dsl-match-query", "# Match query\n");
        let template = Template::Text(r#"{"query": {"match": {"a": "it's"}}}"#.to_string());
        let mut config = LabConfig {
            examples: vec![Example {
                template: template.clone(),
                ..Example::default()
            }],
            ..LabConfig::default()
        };
        normalize_lab_config(&mut config, &doc, &sample_catalog());
        assert_eq!(config.examples[0].template, template);
    }
}
