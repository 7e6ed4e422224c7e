//! # CLI Structure and Argument Parsing
//!
//! `labgen` has a single mode: take a list of documentation URLs, turn each
//! one into a validated lab, and report on the batch.
//!
//! ```bash
//! # One page
//! labgen --url https://www.elastic.co/docs/reference/query-languages/query-dsl/query-dsl-match-query
//!
//! # A list of pages, four at a time, resuming an interrupted run
//! labgen urls.txt --parallel 4
//!
//! # Regenerate everything from scratch without writing labs
//! labgen urls.txt --regenerate --clear-cache --dry-run
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Main CLI structure for the `labgen` command
#[derive(Parser, Clone, Debug)]
#[command(name = "labgen")]
#[command(version)]
#[command(
    about = "labgen - Generate validated query labs from documentation pages",
    long_about = None
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// File with one documentation URL per line (`#` starts a comment)
    #[arg(value_name = "URLS_FILE", conflicts_with = "url")]
    pub urls_file: Option<PathBuf>,

    /// Generate a lab for a single URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Number of URLs processed concurrently (1-50)
    #[arg(short = 'p', long, default_value_t = 1, value_name = "N")]
    pub parallel: usize,

    /// Resume the saved batch (implied when a URLs file is given)
    #[arg(long)]
    pub resume: bool,

    /// Bypass the content cache for reads and writes
    #[arg(long)]
    pub no_cache: bool,

    /// Delete the content cache before starting
    #[arg(long)]
    pub clear_cache: bool,

    /// Regenerate labs that already exist in the output directory
    #[arg(long)]
    pub regenerate: bool,

    /// Run the pipeline but do not write labs or the report
    #[arg(long)]
    pub dry_run: bool,

    /// Minimum hits per example before the quality gate warns
    #[arg(long, value_name = "N")]
    pub min_hits: Option<u64>,

    /// Path to configuration file (overrides autodiscovery). Also via `LABGEN_CONFIG`.
    #[arg(long, value_name = "FILE", env = "LABGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory labs are written to (overrides configuration)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub log_json: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Cli {
    /// Whether the saved batch should be consulted before starting.
    pub const fn wants_resume(&self) -> bool {
        self.resume || self.urls_file.is_some()
    }
}
