//! Orchestrator for batch lab generation.
//!
//! Runs the per-URL pipeline over a list of URLs with bounded concurrency,
//! recording every transition in the batch state store and reporting
//! progress through a callback.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use labgen_core::parser::slug_from_url;
use labgen_core::{BatchTracker, LabOutcome, LabPipeline};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::sink::LabSink;

/// Runs the full pipeline for one URL (allows mocking in tests).
#[async_trait::async_trait]
pub trait LabRunner: Send + Sync {
    /// Produce a lab for `url`.
    async fn run(&self, url: &str) -> labgen_core::Result<LabOutcome>;
}

#[async_trait::async_trait]
impl LabRunner for LabPipeline {
    async fn run(&self, url: &str) -> labgen_core::Result<LabOutcome> {
        LabPipeline::run(self, url).await
    }
}

/// A lab that was generated this run.
#[derive(Debug, Clone)]
pub struct CreatedLab {
    /// Pipeline output.
    pub outcome: LabOutcome,
    /// Where it was written; `None` on a dry run.
    pub path: Option<PathBuf>,
}

/// A URL whose lab already existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLab {
    /// Lab slug.
    pub slug: String,
    /// Source URL.
    pub url: String,
}

/// A URL that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLab {
    /// Lab slug derived from the URL.
    pub slug: String,
    /// Source URL.
    pub url: String,
    /// Error message.
    pub error: String,
}

/// Outcome of one URL.
#[derive(Debug, Clone)]
pub enum UrlOutcome {
    /// Lab generated (and written unless dry run).
    Created(CreatedLab),
    /// Lab already existed.
    Skipped(SkippedLab),
    /// Pipeline or sink failure.
    Failed(FailedLab),
}

/// Aggregated results of a batch.
#[derive(Debug, Default)]
pub struct BatchResults {
    /// Generated labs.
    pub created: Vec<CreatedLab>,
    /// Skipped URLs.
    pub skipped: Vec<SkippedLab>,
    /// Failed URLs.
    pub failed: Vec<FailedLab>,
}

impl BatchResults {
    /// Number of URLs processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created.len() + self.skipped.len() + self.failed.len()
    }

    /// Whether any URL failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn push(&mut self, outcome: UrlOutcome) {
        match outcome {
            UrlOutcome::Created(lab) => self.created.push(lab),
            UrlOutcome::Skipped(lab) => self.skipped.push(lab),
            UrlOutcome::Failed(lab) => self.failed.push(lab),
        }
    }
}

/// Progress callback type, called with (completed, total) after each URL.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Runs a batch of URLs through a [`LabRunner`] into a [`LabSink`].
///
/// Each worker owns one URL from start to finish. URLs complete in any
/// order; batch state is updated after every transition.
pub struct BatchOrchestrator<R: LabRunner, S: LabSink> {
    runner: R,
    sink: S,
    concurrency: usize,
    regenerate: bool,
    dry_run: bool,
    progress_callback: Option<ProgressCallback>,
}

impl<R: LabRunner, S: LabSink> BatchOrchestrator<R, S> {
    /// Create with specified concurrency (clamped to 1-50).
    #[must_use]
    pub fn new(runner: R, sink: S, concurrency: usize) -> Self {
        Self {
            runner,
            sink,
            concurrency: concurrency.clamp(1, 50),
            regenerate: false,
            dry_run: false,
            progress_callback: None,
        }
    }

    /// Regenerate labs that already exist instead of skipping them.
    #[must_use]
    pub const fn with_regenerate(mut self, regenerate: bool) -> Self {
        self.regenerate = regenerate;
        self
    }

    /// Run the pipeline without writing labs.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Get current concurrency level.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every URL, recording transitions in `tracker`.
    ///
    /// Failures are scoped to their URL; the batch always runs to the end.
    pub async fn run_all(&self, urls: &[String], tracker: &BatchTracker) -> BatchResults {
        if urls.is_empty() {
            return BatchResults::default();
        }

        let total = urls.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let outcomes: Vec<UrlOutcome> = stream::iter(urls)
            .map(|url| {
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let progress = self.progress_callback.clone();

                async move {
                    let _permit = semaphore.acquire().await;

                    let outcome = self.run_one(url, tracker).await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = progress {
                        cb(done, total);
                    }
                    outcome
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut results = BatchResults::default();
        for outcome in outcomes {
            results.push(outcome);
        }
        results
    }

    async fn run_one(&self, url: &str, tracker: &BatchTracker) -> UrlOutcome {
        let slug = slug_from_url(url);

        if !self.regenerate && self.sink.exists(&slug) {
            info!(%slug, "lab already exists, skipping (use --regenerate)");
            record(url, tracker.complete(url).await);
            return UrlOutcome::Skipped(SkippedLab {
                slug,
                url: url.to_string(),
            });
        }

        record(url, tracker.start(url).await);
        match self.produce(url).await {
            Ok(lab) => {
                record(url, tracker.complete(url).await);
                UrlOutcome::Created(lab)
            },
            Err(error) => {
                warn!(%url, %error, "lab generation failed");
                record(url, tracker.fail(url, &error).await);
                UrlOutcome::Failed(FailedLab {
                    slug,
                    url: url.to_string(),
                    error,
                })
            },
        }
    }

    async fn produce(&self, url: &str) -> Result<CreatedLab, String> {
        let outcome = self.runner.run(url).await.map_err(|e| e.to_string())?;
        if self.dry_run {
            return Ok(CreatedLab {
                outcome,
                path: None,
            });
        }
        let path = self.sink.write(&outcome).map_err(|e| format!("{e:#}"))?;
        info!(slug = %outcome.slug, path = %path.display(), "lab written");
        Ok(CreatedLab {
            outcome,
            path: Some(path),
        })
    }
}

fn record(url: &str, result: labgen_core::Result<()>) {
    if let Err(e) = result {
        warn!(%url, error = %e, "failed to record batch state");
    }
}
