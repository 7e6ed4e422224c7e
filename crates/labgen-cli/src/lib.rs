//! labgen CLI - batch generation of validated query labs
//!
//! Reads a list of documentation URLs, runs each one through the
//! [`labgen_core::LabPipeline`], writes the finished labs and a run report,
//! and maps the outcome to a semantic exit code (see [`error`]).
use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use labgen_core::{BatchTracker, Config, ContentCache, LabPipeline, StateStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

mod cli;
pub mod error;
pub mod generate;
mod utils;

use crate::cli::Cli;
use crate::error::{CliError, ErrorCategory};
use crate::generate::{BatchOrchestrator, FileSink, RunReport};
use crate::utils::{initialize_logging, read_urls_file};

/// Execute the labgen CLI with the current process arguments.
///
/// # Errors
///
/// Returns an error when configuration is unusable or an internal step
/// (cache, state file, report) fails. Per-URL failures are not errors; they
/// are reported and reflected in the returned exit code.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute(cli).await
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref()).map_err(CliError::config)?;
    if let Some(min_hits) = cli.min_hits {
        config.validation.min_hits = min_hits;
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir.clone_from(dir);
    }
    config.validate().map_err(CliError::config)?;

    let urls = collect_urls(&cli)?;

    let cache = Arc::new(ContentCache::open(&config.paths.cache_dir, !cli.no_cache)?);
    if cli.clear_cache {
        cache.clear()?;
        info!(dir = %config.paths.cache_dir.display(), "cache cleared");
    }

    let pipeline = LabPipeline::connect(&config, Arc::clone(&cache)).await?;

    let store = StateStore::new(&config.paths.state_file);
    let input_file = cli.urls_file.as_ref().map(|p| p.display().to_string());
    let (state, work) = if cli.wants_resume() {
        let plan = store.resume_or_create(&urls, input_file)?;
        if plan.resumed {
            info!(remaining = plan.work.len(), "resuming previous batch");
        }
        (plan.state, plan.work)
    } else {
        let state = store.create_batch(&urls, input_file)?;
        let work = state.pending.clone();
        (state, work)
    };
    debug!(urls = work.len(), parallel = cli.parallel, "starting batch");

    let progress = progress_bar(work.len(), cli.quiet || cli.log_json);
    let progress_handle = progress.clone();
    let orchestrator =
        BatchOrchestrator::new(pipeline, FileSink::new(&config.paths.output_dir), cli.parallel)
            .with_regenerate(cli.regenerate)
            .with_dry_run(cli.dry_run)
            .with_progress(move |done, _total| {
                progress_handle.set_position(u64::try_from(done).unwrap_or(u64::MAX));
            });

    let tracker = BatchTracker::new(store, state);
    let started = Instant::now();
    let results = orchestrator.run_all(&work, &tracker).await;
    progress.finish_and_clear();

    let report = RunReport::from_results(&results, started.elapsed());
    if !cli.dry_run {
        let path = report.save(&report_dir(&config.paths.state_file))?;
        info!(path = %path.display(), "report saved");
    }
    if !cli.quiet {
        report.print_summary(&mut std::io::stdout().lock())?;
    }

    if tracker.finish().await? {
        debug!("batch finished cleanly, state cleared");
    }

    if results.has_failures() {
        Ok(ErrorCategory::UrlFailures.as_exit_code())
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn collect_urls(cli: &Cli) -> Result<Vec<String>> {
    let urls = match (&cli.urls_file, &cli.url) {
        (Some(path), _) => read_urls_file(path).map_err(CliError::config)?,
        (None, Some(url)) => vec![url.clone()],
        (None, None) => {
            return Err(CliError::config(anyhow::anyhow!(
                "no URLs given: pass a URLs file or --url"
            ))
            .into());
        },
    };
    if urls.is_empty() {
        return Err(CliError::config(anyhow::anyhow!("URLs file contains no URLs")).into());
    }
    Ok(urls)
}

/// Reports live next to the state file.
fn report_dir(state_file: &Path) -> PathBuf {
    state_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn progress_bar(total: usize, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} labs")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
