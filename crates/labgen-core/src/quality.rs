//! Static quality checks over a finished lab.
//!
//! Pure and non-blocking: the gate only reports warnings. `passed` means no
//! warnings were raised and callers decide what to do with the rest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::types::{Example, LabConfig, Template, ValidationResult};

/// Error text longer than this is truncated in `validation_failed` messages.
const ERROR_DISPLAY_LEN: usize = 50;

/// Category of a quality warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A required top-level field is absent or empty.
    MissingField,
    /// The lab has no examples.
    NoExamples,
    /// An example lacks a required field.
    MissingExampleField,
    /// Two examples share a title.
    DuplicateTitle,
    /// Two examples share a template.
    Duplicate,
    /// A valid example returned fewer hits than the threshold.
    MinHits,
    /// The validator marked the example invalid.
    ValidationFailed,
}

/// A single informational finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityWarning {
    /// Warning category.
    #[serde(rename = "type")]
    pub kind: WarningKind,
    /// Example the warning is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_id: Option<String>,
    /// Field the warning is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Earlier example this one duplicates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    /// Hit count reported by the validator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<u64>,
    /// Human-readable description.
    pub message: String,
}

impl QualityWarning {
    fn new(kind: WarningKind, message: String) -> Self {
        Self {
            kind,
            example_id: None,
            field: None,
            duplicate_of: None,
            hit_count: None,
            message,
        }
    }

    fn example(mut self, id: impl Into<String>) -> Self {
        self.example_id = Some(id.into());
        self
    }

    fn field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

/// Outcome of a gate run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// True when no warnings were raised.
    pub passed: bool,
    /// Number of warnings.
    pub warning_count: usize,
    /// Every warning, in check order.
    pub warnings: Vec<QualityWarning>,
}

impl QualityReport {
    fn from_warnings(warnings: Vec<QualityWarning>) -> Self {
        Self {
            passed: warnings.is_empty(),
            warning_count: warnings.len(),
            warnings,
        }
    }
}

/// The quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityGate {
    min_hits: u64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self { min_hits: 3 }
    }
}

fn display_id(example: &Example) -> &str {
    if example.id.is_empty() {
        "unknown"
    } else {
        &example.id
    }
}

impl QualityGate {
    /// Gate with a custom hit threshold.
    #[must_use]
    pub const fn new(min_hits: u64) -> Self {
        Self { min_hits }
    }

    /// Run every check.
    #[must_use]
    pub fn run(&self, config: &LabConfig, results: &[ValidationResult]) -> QualityReport {
        let mut warnings = required_fields(config);
        warnings.extend(duplicate_titles(&config.examples));
        warnings.extend(duplicate_templates(&config.examples));
        warnings.extend(self.hit_thresholds(results));
        QualityReport::from_warnings(warnings)
    }

    fn hit_thresholds(&self, results: &[ValidationResult]) -> Vec<QualityWarning> {
        results
            .iter()
            .filter_map(|result| {
                let warning = if !result.valid {
                    let error = result.error.as_deref().unwrap_or("Query returned 0 hits");
                    let message = if error.chars().count() > ERROR_DISPLAY_LEN {
                        let head: String = error.chars().take(ERROR_DISPLAY_LEN).collect();
                        format!("Validation failed: {head}...")
                    } else {
                        format!("Validation failed: {error}")
                    };
                    QualityWarning::new(WarningKind::ValidationFailed, message)
                } else if result.hit_count < self.min_hits {
                    QualityWarning::new(
                        WarningKind::MinHits,
                        format!(
                            "Only returned {} hits (min: {})",
                            result.hit_count, self.min_hits
                        ),
                    )
                } else {
                    return None;
                };
                let mut warning = warning.example(result.example_id.clone());
                warning.hit_count = Some(result.hit_count);
                Some(warning)
            })
            .collect()
    }
}

fn required_fields(config: &LabConfig) -> Vec<QualityWarning> {
    let checks = [
        ("queryType", config.query_type.trim().is_empty()),
        ("displayName", config.display_name.trim().is_empty()),
        ("description", config.description.trim().is_empty()),
        ("docUrl", config.doc_url.trim().is_empty()),
        ("keyDisplayFields", config.key_display_fields.is_empty()),
        ("searchFields", config.search_fields.is_empty()),
        ("sampleQueries", config.sample_queries.is_empty()),
        ("queryStructure", config.query_structure.is_none()),
    ];

    let mut warnings: Vec<QualityWarning> = checks
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| {
            QualityWarning::new(
                WarningKind::MissingField,
                format!("Missing required field: {field}"),
            )
            .field(field)
        })
        .collect();

    // An empty example list gets its own warning rather than a missing-field one.
    if config.examples.is_empty() {
        warnings.push(QualityWarning::new(
            WarningKind::NoExamples,
            "No examples generated - lab config has empty examples array".to_string(),
        ));
    }

    for example in &config.examples {
        let per_dataset = matches!(example.template, Template::PerDataset(_));
        let checks = [
            ("id", example.id.trim().is_empty()),
            ("title", example.title.trim().is_empty()),
            ("description", example.description.trim().is_empty()),
            ("template", example.template.is_empty()),
            ("index", !per_dataset && example.index.trim().is_empty()),
        ];
        let id = display_id(example);
        warnings.extend(checks.iter().filter(|(_, missing)| *missing).map(|(field, _)| {
            QualityWarning::new(
                WarningKind::MissingExampleField,
                format!("Example '{id}' missing field: {field}"),
            )
            .example(id)
            .field(field)
        }));
    }

    warnings
}

/// Flags the second and later occurrences of each key, referencing the first.
fn duplicates<'a, F>(examples: &'a [Example], kind: WarningKind, what: &str, key: F) -> Vec<QualityWarning>
where
    F: Fn(&'a Example) -> Option<String>,
{
    let mut first_seen: HashMap<String, &str> = HashMap::new();
    let mut warnings = Vec::new();
    for example in examples {
        let Some(key) = key(example) else {
            continue;
        };
        match first_seen.entry(key) {
            Entry::Occupied(first) => {
                let first = *first.get();
                let mut warning = QualityWarning::new(
                    kind,
                    format!("Duplicate {what} (same as example '{first}')"),
                )
                .example(display_id(example));
                warning.duplicate_of = Some(first.to_string());
                warnings.push(warning);
            },
            Entry::Vacant(slot) => {
                slot.insert(display_id(example));
            },
        }
    }
    warnings
}

fn duplicate_titles(examples: &[Example]) -> Vec<QualityWarning> {
    duplicates(examples, WarningKind::DuplicateTitle, "title", |e| {
        (!e.title.is_empty()).then(|| e.title.clone())
    })
}

fn duplicate_templates(examples: &[Example]) -> Vec<QualityWarning> {
    duplicates(examples, WarningKind::Duplicate, "query", |e| {
        let normalized = e.template.normalized();
        (!normalized.is_empty()).then_some(normalized)
    })
}
