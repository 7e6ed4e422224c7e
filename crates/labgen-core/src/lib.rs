//! # labgen-core
//!
//! Core functionality for labgen: turning a query-language documentation page
//! into a validated, runnable set of example queries (a "lab").
//!
//! The hard part is the generate, execute, repair loop. Examples must actually
//! return data from a live engine, under bounded retries, using a layered set
//! of generation backends, and a whole batch of URLs must be resumable without
//! paying twice for work already done.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **Cache**: content-addressed store for fetched pages, parsed documents
//!   and generation responses
//! - **State**: durable per-URL lifecycle for a batch
//! - **Generation**: backend fallback, prompt construction, normalization and
//!   per-dataset variant expansion
//! - **Validation**: bounded execute/repair state machine, including the
//!   multi-dataset threshold check
//! - **Quality**: static, non-blocking warnings over the finished artifact
//! - **Pipeline**: sequences the above for one URL
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use labgen_core::{Config, ContentCache, LabPipeline};
//!
//! # async fn run() -> labgen_core::Result<()> {
//! let config = Config::load(None)?;
//! let cache = Arc::new(ContentCache::open(&config.paths.cache_dir, true)?);
//! let pipeline = LabPipeline::connect(&config, cache).await?;
//!
//! let outcome = pipeline
//!     .run("https://www.elastic.co/docs/reference/query-languages/query-dsl/query-dsl-match-query")
//!     .await?;
//! println!(
//!     "{}: {}/{} examples valid, {} warnings",
//!     outcome.slug,
//!     outcome.validation.valid,
//!     outcome.validation.total,
//!     outcome.quality.warning_count
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Only [`Error::Config`] is
//! fatal to a run; everything else is scoped to the URL that produced it.

/// Generation backends and their fallback composition
pub mod backend;
/// Content-addressed cache
pub mod cache;
/// Configuration loading and validation
pub mod config;
/// Query engine execution
pub mod engine;
/// Error types and result aliases
pub mod error;
/// Documentation page fetching
pub mod fetcher;
/// Artifact generation
pub mod generate;
/// Documentation page parsing
pub mod parser;
/// Per-URL pipeline
pub mod pipeline;
/// Quality gate
pub mod quality;
/// Dataset schema catalog
pub mod schema;
/// Batch state store
pub mod state;
/// Core data types
pub mod types;
/// Example validation with repair
pub mod validate;

// Re-export commonly used types
pub use backend::{
    AgentToolBackend, ChatPrompt, CompletionBackend, FallbackBackend, GenerationBackend,
    RepairRequest, VariantRequest,
};
pub use cache::{CacheKey, CacheNamespace, ContentCache};
pub use config::{
    AgentConfig, CompletionConfig, Config, EngineConfig, GenerationConfig, PathsConfig,
    ValidationConfig,
};
pub use engine::{EngineClient, FallbackExecutor, QueryExecutor};
pub use error::{Error, Result};
pub use fetcher::DocFetcher;
pub use generate::ContentGenerator;
pub use pipeline::{LabOutcome, LabPipeline, load_document};
pub use quality::{QualityGate, QualityReport, QualityWarning, WarningKind};
pub use schema::{DatasetSchema, SchemaCatalog};
pub use state::{BatchPlan, BatchState, BatchTracker, FailedUrl, StateStore};
pub use types::*;
pub use validate::{Repairer, ValidationPolicy, Validator};
