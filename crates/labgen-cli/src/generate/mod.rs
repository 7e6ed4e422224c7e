//! Batch orchestration for the `labgen` command.
//!
//! ## Key Components
//!
//! - [`BatchOrchestrator`]: runs URLs through the pipeline with bounded concurrency
//! - [`LabSink`] / [`FileSink`]: where finished labs are written
//! - [`RunReport`]: JSON report and plain-text summary of a batch

mod orchestrator;
mod report;
mod sink;

pub use orchestrator::{
    BatchOrchestrator, BatchResults, CreatedLab, FailedLab, LabRunner, ProgressCallback,
    SkippedLab, UrlOutcome,
};
pub use report::{LabEntry, LabWarning, ReportSummary, RunReport, UrlEntry, format_elapsed};
pub use sink::{FileSink, LabSink};
