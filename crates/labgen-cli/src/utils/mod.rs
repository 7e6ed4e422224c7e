//! Shared helpers for the CLI.
//!
//! - [`logging`]: tracing subscriber and color setup
//! - [`urls`]: reading and de-duplicating URL lists

pub mod logging;
pub mod urls;

pub use logging::initialize_logging;
pub use urls::{dedupe_urls, read_urls_file};
