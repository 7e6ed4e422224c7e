//! Example validation with bounded repair.
//!
//! Each example is executed against the live engine. Zero results or an
//! execution error fail the attempt; while attempts remain, a [`Repairer`]
//! supplies a corrected template and the loop re-executes. Structured queries
//! get five attempts by default and textual queries three.
//!
//! Per-dataset templates are stricter: every configured dataset must be
//! present and return at least `min_rows`, or the whole example is invalid.

mod repair_loop;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::ValidationConfig;
use crate::engine::QueryExecutor;
use crate::types::{Example, LabConfig, QueryLanguage, Template, ValidationResult, ValidationSummary};
use crate::Result;

use repair_loop::{Failure, RepairLoop};

/// Dataset used when an example does not name one.
pub const DEFAULT_DATASET: &str = "product_reviews";

/// Produces a corrected template for a failing one.
#[async_trait]
pub trait Repairer: Send + Sync {
    /// Repair `template`, which failed on `dataset` for `reason`.
    async fn repair(
        &self,
        language: QueryLanguage,
        dataset: &str,
        template: &Template,
        reason: &str,
    ) -> Result<Template>;
}

/// Attempt bounds and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Total executions for structured queries.
    pub structured_attempts: u32,
    /// Total executions for textual queries.
    pub textual_attempts: u32,
    /// Rows each dataset of a per-dataset template must return.
    pub min_rows: u64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

impl From<&ValidationConfig> for ValidationPolicy {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            structured_attempts: config.structured_attempts,
            textual_attempts: config.textual_attempts,
            min_rows: config.min_hits,
        }
    }
}

impl ValidationPolicy {
    /// Total executions allowed for `language`.
    #[must_use]
    pub const fn attempts_for(&self, language: QueryLanguage) -> u32 {
        if language.is_structured() {
            self.structured_attempts
        } else {
            self.textual_attempts
        }
    }
}

/// Executes examples and drives their repair loops.
pub struct Validator {
    executor: Arc<dyn QueryExecutor>,
    repairer: Option<Arc<dyn Repairer>>,
    policy: ValidationPolicy,
    datasets: Vec<String>,
}

impl Validator {
    /// Validator without repair. `datasets` lists what a per-dataset template
    /// must cover; when empty, the template's own keys are used.
    pub fn new(executor: Arc<dyn QueryExecutor>, policy: ValidationPolicy, datasets: Vec<String>) -> Self {
        Self {
            executor,
            repairer: None,
            policy,
            datasets,
        }
    }

    /// Enable repair through `repairer`.
    #[must_use]
    pub fn with_repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    fn repair_loop<'a>(&'a self, language: QueryLanguage, dataset: &'a str, min_count: u64) -> RepairLoop<'a> {
        RepairLoop {
            executor: self.executor.as_ref(),
            repairer: self.repairer.as_deref(),
            language,
            dataset,
            max_attempts: self.policy.attempts_for(language),
            min_count,
        }
    }

    /// Validate one example.
    #[instrument(skip(self, example), fields(example = %example.id))]
    pub async fn validate_example(&self, language: QueryLanguage, example: &Example) -> ValidationResult {
        let example_id = if example.id.is_empty() {
            "unknown".to_string()
        } else {
            example.id.clone()
        };

        match &example.template {
            Template::PerDataset(map) => self.validate_per_dataset(example_id, language, map).await,
            template => {
                let dataset = if example.index.trim().is_empty() {
                    DEFAULT_DATASET
                } else {
                    example.index.as_str()
                };
                let runner = self.repair_loop(language, dataset, 1);
                let outcome = runner.run(template.clone()).await;
                let passed = outcome.passed();
                ValidationResult {
                    example_id,
                    valid: passed,
                    hit_count: outcome.count,
                    error: outcome
                        .failure
                        .as_ref()
                        .map(|f| runner.describe(f, outcome.executions)),
                    repaired_template: (passed && outcome.repairs > 0).then_some(outcome.template),
                }
            },
        }
    }

    async fn validate_per_dataset(
        &self,
        example_id: String,
        language: QueryLanguage,
        map: &BTreeMap<String, String>,
    ) -> ValidationResult {
        let datasets: Vec<&str> = if self.datasets.is_empty() {
            map.keys().map(String::as_str).collect()
        } else {
            self.datasets.iter().map(String::as_str).collect()
        };

        let mut merged = map.clone();
        let mut errors = Vec::new();
        let mut min_count: Option<u64> = None;
        let mut repaired_any = false;

        for dataset in datasets {
            let Some(query) = map.get(dataset).filter(|q| !q.trim().is_empty()) else {
                errors.push(format!("{dataset}: missing from template"));
                min_count = Some(0);
                continue;
            };

            let outcome = self
                .repair_loop(language, dataset, self.policy.min_rows)
                .run(Template::Text(query.clone()))
                .await;
            min_count = Some(min_count.map_or(outcome.count, |m| m.min(outcome.count)));

            match &outcome.failure {
                None => {
                    if outcome.repairs > 0 {
                        if let Template::Text(fixed) = outcome.template {
                            merged.insert(dataset.to_string(), fixed);
                            repaired_any = true;
                        }
                    }
                },
                Some(Failure::Shortfall(0)) => errors.push(format!("{dataset}: query returned 0 rows")),
                Some(Failure::Shortfall(n)) => errors.push(format!(
                    "{dataset}: only {n} rows (<{} rows)",
                    self.policy.min_rows
                )),
                Some(Failure::Error(e)) => errors.push(format!("{dataset}: {e}")),
            }
        }

        let valid = errors.is_empty();
        debug!(valid, errors = errors.len(), "per-dataset validation finished");
        ValidationResult {
            example_id,
            valid,
            hit_count: min_count.unwrap_or(0),
            error: (!valid).then(|| errors.join("; ")),
            repaired_template: repaired_any.then_some(Template::PerDataset(merged)),
        }
    }

    /// Validate every example of `config` in order.
    #[instrument(skip(self, config), fields(query_type = %config.query_type))]
    pub async fn validate_all(&self, config: &LabConfig) -> ValidationSummary {
        let mut results = Vec::with_capacity(config.examples.len());
        for example in &config.examples {
            results.push(self.validate_example(config.query_language, example).await);
        }
        let summary = ValidationSummary::from_results(results);
        info!(
            total = summary.total,
            valid = summary.valid,
            invalid = summary.invalid,
            "validation finished"
        );
        summary
    }
}
