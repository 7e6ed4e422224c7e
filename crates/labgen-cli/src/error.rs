//! CLI error handling with semantic exit codes.
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Every URL produced a lab or was skipped |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Config` | Missing credentials, endpoints or unreadable inputs |
//! | 3 | `UrlFailures` | The batch ran but one or more URLs failed |
//!
//! ```bash
//! labgen urls.txt
//! case $? in
//!     0) echo "all labs generated" ;;
//!     3) echo "some URLs failed, rerun to resume" ;;
//!     *) echo "run aborted" ;;
//! esac
//! ```

use std::fmt;
use std::process::ExitCode;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Configuration or usage error (exit code 2).
    ///
    /// Raised before any URL is processed.
    Config = 2,

    /// One or more URLs in the batch failed (exit code 3).
    UrlFailures = 3,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Create an `ExitCode` from this category.
    #[must_use]
    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Config => "configuration error",
            Self::UrlFailures => "url failures",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Config, source)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    // Display already prints the wrapped error, so the chain continues below it.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.chain().nth(1)
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// A `CliError` keeps its category; a core configuration error anywhere in
/// the chain maps to `Config`; everything else is internal.
#[must_use]
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }

    let is_config = err.chain().any(|cause| {
        cause
            .downcast_ref::<labgen_core::Error>()
            .is_some_and(labgen_core::Error::is_fatal)
    });
    if is_config {
        ErrorCategory::Config.exit_code()
    } else {
        ErrorCategory::Internal.exit_code()
    }
}
