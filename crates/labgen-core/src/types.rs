//! Core data types shared by the generator, validator and quality gate.
//!
//! The generated artifact ([`LabConfig`]) arrives from a language model as
//! loosely shaped JSON. These types pin the shape down: every field the model
//! may omit has a serde default, scalar-vs-list drift is absorbed by lenient
//! deserializers, and anything else is rejected as a parse failure so the
//! generator can retry.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Query language a documentation page teaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    /// Object-shaped search DSL. Executed through the search endpoint.
    #[default]
    QueryDsl,
    /// Piped textual language. Examples target every dataset at once.
    Esql,
    /// Event query language. Textual, single dataset per example.
    Eql,
}

impl QueryLanguage {
    /// Detect the language from document metadata.
    ///
    /// Explicit markers win over the default: ES|QL is checked first because
    /// its URLs also contain `eql`.
    #[must_use]
    pub fn detect(url: &str, title: &str, description: &str, content: &str) -> Self {
        let url = url.to_lowercase();
        let title = title.to_lowercase();
        let description = description.to_lowercase();

        if url.contains("esql")
            || title.contains("esql")
            || description.contains("esql")
            || content.to_lowercase().contains("es|ql")
        {
            return Self::Esql;
        }

        if url.contains("eql")
            && (title.contains("eql") || description.contains("event query language"))
        {
            return Self::Eql;
        }

        Self::QueryDsl
    }

    /// Whether templates are JSON objects rather than query strings.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::QueryDsl)
    }

    /// Whether each example carries one query per dataset.
    #[must_use]
    pub const fn is_multi_dataset(self) -> bool {
        matches!(self, Self::Esql)
    }

    /// Stable identifier used in prompts and serialized configs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueryDsl => "query_dsl",
            Self::Esql => "esql",
            Self::Eql => "eql",
        }
    }

    /// Name shown to humans and language models.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::QueryDsl => "Query DSL",
            Self::Esql => "ES|QL",
            Self::Eql => "EQL",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fenced code block lifted from a documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSample {
    /// Fence language tag (empty when untagged).
    pub language: String,
    /// Block contents.
    pub code: String,
}

/// Structured view of one documentation page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// URL as supplied by the user.
    pub url: String,
    /// URL of the markdown rendition that was fetched.
    pub normalized_url: String,
    /// Canonical page URL (without the `.md` suffix).
    pub doc_url: String,
    /// Identifier used for output naming.
    pub slug: String,
    /// `slug` in identifier form (`match_query`).
    pub query_type: String,
    /// Detected query language.
    pub language: QueryLanguage,
    /// First H1 heading.
    pub title: String,
    /// First paragraph after the title.
    pub description: String,
    /// Candidate example queries from the page.
    pub code_examples: Vec<CodeSample>,
    /// Parameters named in headings but absent from every code sample.
    pub missing_params: Vec<String>,
    /// Raw markdown source.
    pub raw_markdown: String,
}

/// The query attached to an example.
///
/// Deserialization tries the variants in order, so a JSON object whose values
/// are all strings is read as a per-dataset mapping, and any other object as a
/// structured query body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    /// A query string, or a structured query serialized as JSON text.
    Text(String),
    /// One textual query per dataset name.
    PerDataset(BTreeMap<String, String>),
    /// A structured query body.
    Structured(serde_json::Map<String, Value>),
}

impl Default for Template {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Template {
    /// True when there is nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::PerDataset(map) => map.values().all(|q| q.trim().is_empty()),
            Self::Structured(map) => map.is_empty(),
        }
    }

    /// Text form of a textual template, if it is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Interpret the template as a structured query body.
    ///
    /// Text templates must contain a JSON object.
    pub fn structured_body(&self) -> Result<Value> {
        match self {
            Self::Structured(map) => Ok(Value::Object(map.clone())),
            Self::Text(text) => {
                let value: Value = serde_json::from_str(text)
                    .map_err(|e| Error::Parse(format!("Invalid JSON template: {e}")))?;
                if value.is_object() {
                    Ok(value)
                } else {
                    Err(Error::Parse("Template is not a JSON object".to_string()))
                }
            },
            Self::PerDataset(_) => Err(Error::Parse(
                "Per-dataset template cannot be executed as a structured query".to_string(),
            )),
        }
    }

    /// Canonical text used for duplicate detection.
    ///
    /// Whitespace runs collapse to a single space so formatting differences do
    /// not hide duplicates.
    #[must_use]
    pub fn normalized(&self) -> String {
        let raw = match self {
            Self::Text(text) => text.clone(),
            Self::PerDataset(map) => map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Structured(map) => Value::Object(map.clone()).to_string(),
        };
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// One runnable example inside a lab.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    /// Stable identifier within the lab.
    #[serde(default)]
    pub id: String,
    /// Short heading.
    #[serde(default)]
    pub title: String,
    /// What the example demonstrates.
    #[serde(default)]
    pub description: String,
    /// The query itself.
    #[serde(default)]
    pub template: Template,
    /// Target dataset for single-dataset languages.
    #[serde(default)]
    pub index: String,
    /// Suggested follow-up experiments.
    #[serde(default, deserialize_with = "one_or_many")]
    pub try_this: Vec<String>,
    /// Tooltip text keyed by parameter name.
    #[serde(default, deserialize_with = "string_map")]
    pub tooltips: BTreeMap<String, String>,
}

/// Describes where the searched field lives inside a structured query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStructure {
    /// Structure kind (`inline`, `default_field`, `fields`, `nested`).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Path of the field inside the query body.
    #[serde(default)]
    pub field_path: String,
}

impl Default for QueryStructure {
    fn default() -> Self {
        Self {
            kind: "inline".to_string(),
            field_path: String::new(),
        }
    }
}

/// The generated artifact for one documentation topic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabConfig {
    /// Language the examples are written in.
    #[serde(default)]
    pub query_language: QueryLanguage,
    /// Identifier of the query type being taught.
    #[serde(default)]
    pub query_type: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Summary lifted from the documentation page.
    #[serde(default)]
    pub description: String,
    /// Canonical documentation URL.
    #[serde(default)]
    pub doc_url: String,
    /// Field shown as the result heading, per dataset.
    #[serde(default, deserialize_with = "string_map")]
    pub key_display_fields: BTreeMap<String, String>,
    /// Field searched by sample queries, per dataset.
    #[serde(default, deserialize_with = "string_map")]
    pub search_fields: BTreeMap<String, String>,
    /// Default search text, per dataset.
    #[serde(default, deserialize_with = "string_map")]
    pub sample_queries: BTreeMap<String, String>,
    /// Query structure descriptor.
    #[serde(default)]
    pub query_structure: Option<QueryStructure>,
    /// Ordered examples.
    #[serde(default)]
    pub examples: Vec<Example>,
}

/// Outcome of validating one example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Example the result belongs to.
    pub example_id: String,
    /// Whether the example met its threshold.
    pub valid: bool,
    /// Hits (structured) or rows (textual). Minimum across datasets for
    /// per-dataset templates.
    pub hit_count: u64,
    /// Failure reason, if any.
    pub error: Option<String>,
    /// Template that passed after one or more repairs.
    pub repaired_template: Option<Template>,
}

/// Aggregate of a validation pass over a whole lab.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Number of examples validated.
    pub total: usize,
    /// Examples that passed.
    pub valid: usize,
    /// Examples that failed.
    pub invalid: usize,
    /// Per-example results in example order.
    pub results: Vec<ValidationResult>,
}

impl ValidationSummary {
    /// Build a summary from individual results.
    #[must_use]
    pub fn from_results(results: Vec<ValidationResult>) -> Self {
        let valid = results.iter().filter(|r| r.valid).count();
        Self {
            total: results.len(),
            valid,
            invalid: results.len() - valid,
            results,
        }
    }

    /// True when every example passed.
    #[must_use]
    pub const fn all_valid(&self) -> bool {
        self.invalid == 0
    }
}

/// Accepts a string, a list, or null and yields a list of strings.
///
/// Non-string list members are dropped.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        other => Err(de::Error::custom(format!(
            "expected string or list of strings, found {other}"
        ))),
    }
}

/// Accepts an object whose values may be strings, scalars, or lists.
///
/// Scalars are stringified and lists contribute their first string.
fn string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    Value::Array(items) => items.into_iter().find_map(|i| match i {
                        Value::String(s) => Some(s),
                        _ => None,
                    }),
                    _ => None,
                };
                value.map(|v| (k, v))
            })
            .collect()),
        other => Err(de::Error::custom(format!("expected object, found {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_esql_from_any_marker() {
        assert_eq!(
            QueryLanguage::detect("https://x/esql-commands", "", "", ""),
            QueryLanguage::Esql
        );
        assert_eq!(
            QueryLanguage::detect("https://x/query", "", "", "Use ES|QL to filter"),
            QueryLanguage::Esql
        );
        assert_eq!(
            QueryLanguage::detect("https://x/query", "ESQL syntax", "", ""),
            QueryLanguage::Esql
        );
    }

    #[test]
    fn test_detect_eql_needs_url_and_metadata() {
        assert_eq!(
            QueryLanguage::detect("https://x/eql-syntax", "EQL syntax reference", "", ""),
            QueryLanguage::Eql
        );
        assert_eq!(
            QueryLanguage::detect(
                "https://x/eql",
                "Syntax",
                "Event Query Language is a language for events",
                ""
            ),
            QueryLanguage::Eql
        );
        // URL alone is not enough
        assert_eq!(
            QueryLanguage::detect("https://x/eql", "Syntax", "Other", ""),
            QueryLanguage::QueryDsl
        );
    }

    #[test]
    fn test_detect_defaults_to_query_dsl() {
        assert_eq!(
            QueryLanguage::detect("https://x/query-dsl-match-query", "Match query", "", ""),
            QueryLanguage::QueryDsl
        );
    }

    #[test]
    fn test_template_untagged_variants() {
        let text: Template = serde_json::from_value(json!("FROM products")).unwrap();
        assert_eq!(text, Template::Text("FROM products".to_string()));

        let per: Template =
            serde_json::from_value(json!({"products": "FROM products"})).unwrap();
        assert!(matches!(per, Template::PerDataset(_)));

        let structured: Template =
            serde_json::from_value(json!({"query": {"match": {"a": "b"}}})).unwrap();
        assert!(matches!(structured, Template::Structured(_)));
    }

    #[test]
    fn test_structured_body_from_text() {
        let t = Template::Text(r#"{"query": {"match_all": {}}}"#.to_string());
        assert_eq!(
            t.structured_body().unwrap(),
            json!({"query": {"match_all": {}}})
        );

        let bad = Template::Text("[1, 2]".to_string());
        assert!(bad.structured_body().is_err());
    }

    #[test]
    fn test_normalized_ignores_whitespace() {
        let a = Template::Text("FROM products\n  | LIMIT 10".to_string());
        let b = Template::Text("FROM products | LIMIT   10".to_string());
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_example_lenient_fields() {
        let example: Example = serde_json::from_value(json!({
            "id": "basic",
            "title": "Basic",
            "template": "FROM products",
            "tryThis": "Change the limit to 5",
            "tooltips": {"limit": 10, "from": "source index"}
        }))
        .unwrap();

        assert_eq!(example.try_this, vec!["Change the limit to 5"]);
        assert_eq!(example.tooltips.get("limit").unwrap(), "10");
        assert!(example.index.is_empty());
    }

    #[test]
    fn test_lab_config_defaults_and_list_values() {
        let config: LabConfig = serde_json::from_value(json!({
            "queryType": "match",
            "searchFields": {"products": ["product_description", "product_name"]},
            "examples": []
        }))
        .unwrap();

        assert_eq!(config.query_language, QueryLanguage::QueryDsl);
        assert_eq!(
            config.search_fields.get("products").unwrap(),
            "product_description"
        );
        assert!(config.query_structure.is_none());
    }

    #[test]
    fn test_validation_summary_counts() {
        let result = |valid| ValidationResult {
            example_id: "e".to_string(),
            valid,
            hit_count: 0,
            error: None,
            repaired_template: None,
        };
        let summary = ValidationSummary::from_results(vec![result(true), result(false)]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);
        assert!(!summary.all_valid());
    }
}
