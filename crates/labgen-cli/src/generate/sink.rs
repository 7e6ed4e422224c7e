//! Destination for finished labs.

use anyhow::{Context, Result};
use labgen_core::LabOutcome;
use std::path::{Path, PathBuf};

/// Where finished labs go.
///
/// The orchestrator asks [`LabSink::exists`] before running a URL so existing
/// labs can be skipped without paying for generation.
pub trait LabSink: Send + Sync {
    /// Whether a lab for `slug` has already been written.
    fn exists(&self, slug: &str) -> bool;

    /// Persist a finished lab, returning where it was written.
    fn write(&self, outcome: &LabOutcome) -> Result<PathBuf>;
}

/// Writes each lab as `<dir>/<slug>.json`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Write labs under `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{slug}.json"))
    }
}

impl LabSink for FileSink {
    fn exists(&self, slug: &str) -> bool {
        self.path_for(slug).exists()
    }

    fn write(&self, outcome: &LabOutcome) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path_for(&outcome.slug);
        let json = serde_json::to_string_pretty(&outcome.config)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
