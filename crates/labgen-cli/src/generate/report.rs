//! Batch run report: a JSON record plus a short plain-text breakdown.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use labgen_core::QualityWarning;
use serde::{Deserialize, Serialize};

use super::orchestrator::{BatchResults, FailedLab, SkippedLab};

/// Longest error shown in the plain-text breakdown.
const MAX_ERROR_DISPLAY: usize = 80;

/// Summary counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// URLs processed this run.
    pub total_urls: usize,
    /// Labs generated.
    pub created: usize,
    /// URLs skipped because their lab existed.
    pub skipped: usize,
    /// URLs that failed.
    pub failed: usize,
    /// Wall-clock time for the batch.
    pub elapsed_seconds: f64,
}

/// One generated lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabEntry {
    /// Lab slug.
    pub slug: String,
    /// Source URL.
    pub url: String,
    /// Number of examples in the artifact.
    pub example_count: usize,
    /// Whether every example validated.
    pub validation_passed: bool,
}

/// One URL that was skipped or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    /// Lab slug.
    pub slug: String,
    /// Source URL.
    pub url: String,
    /// Skip reason or error message.
    pub reason: String,
}

/// A quality warning tagged with the lab it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabWarning {
    /// Lab slug.
    pub lab_slug: String,
    /// The warning itself.
    #[serde(flatten)]
    pub warning: QualityWarning,
}

/// Everything recorded about one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
    /// Summary counts.
    pub summary: ReportSummary,
    /// Generated labs.
    pub created_labs: Vec<LabEntry>,
    /// Skipped URLs.
    pub skipped_labs: Vec<UrlEntry>,
    /// Failed URLs.
    pub failed_labs: Vec<UrlEntry>,
    /// Quality warnings across all labs.
    pub quality_warnings: Vec<LabWarning>,
}

impl RunReport {
    /// Build a report from batch results.
    pub fn from_results(results: &BatchResults, elapsed: Duration) -> Self {
        let mut created_labs = Vec::with_capacity(results.created.len());
        let mut quality_warnings = Vec::new();
        for lab in &results.created {
            let outcome = &lab.outcome;
            created_labs.push(LabEntry {
                slug: outcome.slug.clone(),
                url: outcome.url.clone(),
                example_count: outcome.config.examples.len(),
                validation_passed: outcome.validation.all_valid(),
            });
            quality_warnings.extend(outcome.quality.warnings.iter().map(|w| LabWarning {
                lab_slug: outcome.slug.clone(),
                warning: w.clone(),
            }));
        }

        let skipped = |lab: &SkippedLab| UrlEntry {
            slug: lab.slug.clone(),
            url: lab.url.clone(),
            reason: "Already exists (use --regenerate)".to_string(),
        };
        let failed = |lab: &FailedLab| UrlEntry {
            slug: lab.slug.clone(),
            url: lab.url.clone(),
            reason: lab.error.clone(),
        };

        Self {
            timestamp: Utc::now(),
            summary: ReportSummary {
                total_urls: results.total(),
                created: results.created.len(),
                skipped: results.skipped.len(),
                failed: results.failed.len(),
                elapsed_seconds: elapsed.as_secs_f64(),
            },
            created_labs,
            skipped_labs: results.skipped.iter().map(skipped).collect(),
            failed_labs: results.failed.iter().map(failed).collect(),
            quality_warnings,
        }
    }

    /// Write the report as `generate-labs-<timestamp>.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let name = format!(
            "generate-labs-{}.json",
            self.timestamp.format("%Y-%m-%dT%H-%M-%S")
        );
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        Ok(path)
    }

    /// Print the plain-text breakdown.
    pub fn print_summary(&self, out: &mut impl Write) -> std::io::Result<()> {
        let s = &self.summary;
        writeln!(
            out,
            "{} {} urls, {} created, {} skipped, {} failed in {}",
            "Lab generation:".bold(),
            s.total_urls,
            s.created.to_string().green(),
            s.skipped.to_string().yellow(),
            s.failed.to_string().red(),
            format_elapsed(s.elapsed_seconds)
        )?;

        for lab in &self.created_labs {
            let status = if lab.validation_passed {
                "validated".green()
            } else {
                "has invalid examples".yellow()
            };
            writeln!(
                out,
                "  {} {} ({} examples, {status})",
                "✓".green(),
                lab.slug,
                lab.example_count
            )?;
        }
        for lab in &self.skipped_labs {
            writeln!(out, "  {} {} ({})", "⊘".yellow(), lab.slug, lab.reason)?;
        }
        for lab in &self.failed_labs {
            writeln!(
                out,
                "  {} {}: {}",
                "✗".red(),
                lab.slug,
                truncate(&lab.reason, MAX_ERROR_DISPLAY)
            )?;
        }
        for entry in &self.quality_warnings {
            let example = entry.warning.example_id.as_deref().unwrap_or("-");
            writeln!(
                out,
                "  {} {}/{example}: {}",
                "⚠".yellow(),
                entry.lab_slug,
                entry.warning.message
            )?;
        }
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Human-readable duration.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_elapsed(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let whole = seconds as u64;
    if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m", whole / 3600, (whole % 3600) / 60)
    }
}
