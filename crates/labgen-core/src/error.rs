//! Error types and handling for labgen-core operations.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors are
//! categorized so callers can decide what is fatal for a whole run
//! (configuration), what is scoped to a single URL (generation, fetch), and
//! what is absorbed by a retry loop (engine execution, backend outages).
//!
//! ## Error Categories
//!
//! - **I/O Errors**: File system operations on the cache and state file
//! - **Network Errors**: HTTP requests to documentation hosts and backends
//! - **Parse Errors**: Markdown parsing, backend payloads that are not JSON
//! - **Storage Errors**: Cache and batch state persistence
//! - **Configuration Errors**: Missing credentials or endpoints
//! - **Generation Errors**: Backends that keep returning unusable output
//! - **Engine Errors**: The query engine rejected a query
//!
//! ## Recovery Hints
//!
//! ```rust
//! use labgen_core::{Error, Result};
//!
//! fn handle(result: Result<()>) {
//!     match result {
//!         Err(e) if e.is_recoverable() => println!("transient: {e}"),
//!         Err(e) => println!("{} failure: {e}", e.category()),
//!         Ok(()) => {},
//!     }
//! }
//! # handle(Ok(()));
//! ```

use thiserror::Error;

/// The main error type for labgen-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Timeouts and interruptions are treated as recoverable, everything
    /// else (permission denied, missing directories) is permanent.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Connection and timeout errors are recoverable, while
    /// malformed requests and TLS failures are permanent.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Content could not be parsed.
    ///
    /// Raised for documentation pages without usable structure and for
    /// backend responses that do not contain the expected payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Cache or batch state persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or incomplete.
    ///
    /// Fatal at startup: a run aborts before any URL is processed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or invalid.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generation backend returned unusable output after its own retries.
    ///
    /// Scoped to the URL being processed; sibling URLs in a batch continue.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A generation or execution backend could not serve the request.
    ///
    /// Fallback wrappers absorb this variant and switch to the next backend.
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend that failed.
        backend: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The query engine rejected or failed a query.
    #[error("Engine error ({status}): {reason}")]
    Engine {
        /// HTTP status returned by the engine.
        status: u16,
        /// Reason reported by the engine.
        reason: String,
    },

    /// An illegal batch state transition was requested.
    #[error("Invalid state transition: {0}")]
    State(String),

    /// The backend does not implement the requested capability.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Engine errors with a 5xx status and unavailable backends are treated
    /// as transient. Configuration and generation failures never are.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) | Self::BackendUnavailable { .. } => true,
            Self::Engine { status, .. } => *status >= 500,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Generation(_) => "generation",
            Self::BackendUnavailable { .. } => "backend",
            Self::Engine { .. } => "engine",
            Self::State(_) => "state",
            Self::Unsupported(_) => "unsupported",
            Self::Other(_) => "other",
        }
    }

    /// Whether this error should abort the whole run rather than a single URL.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;

    #[test]
    fn test_error_categories() {
        let cases = vec![
            (Error::Io(io::Error::other("test")), "io"),
            (Error::Parse("test".to_string()), "parse"),
            (Error::Storage("test".to_string()), "storage"),
            (Error::Config("test".to_string()), "config"),
            (Error::NotFound("test".to_string()), "not_found"),
            (Error::InvalidUrl("test".to_string()), "invalid_url"),
            (Error::Timeout("test".to_string()), "timeout"),
            (Error::Serialization("test".to_string()), "serialization"),
            (Error::Generation("test".to_string()), "generation"),
            (
                Error::BackendUnavailable {
                    backend: "agent".to_string(),
                    reason: "down".to_string(),
                },
                "backend",
            ),
            (
                Error::Engine {
                    status: 400,
                    reason: "bad".to_string(),
                },
                "engine",
            ),
            (Error::State("test".to_string()), "state"),
            (Error::Unsupported("test".to_string()), "unsupported"),
            (Error::Other("test".to_string()), "other"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.category(), expected);
        }
    }

    #[test]
    fn test_error_recoverability() {
        let recoverable = vec![
            Error::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Error::Timeout("request timeout".to_string()),
            Error::BackendUnavailable {
                backend: "agent".to_string(),
                reason: "refused".to_string(),
            },
            Error::Engine {
                status: 503,
                reason: "unavailable".to_string(),
            },
        ];
        let permanent = vec![
            Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            Error::Config("missing key".to_string()),
            Error::Generation("empty".to_string()),
            Error::Engine {
                status: 400,
                reason: "parsing_exception".to_string(),
            },
        ];

        for error in recoverable {
            assert!(error.is_recoverable(), "Expected {error:?} to be recoverable");
        }
        for error in permanent {
            assert!(!error.is_recoverable(), "Expected {error:?} to be permanent");
        }
    }

    #[test]
    fn test_only_config_is_fatal() {
        assert!(Error::Config("no api key".to_string()).is_fatal());
        assert!(!Error::Generation("empty".to_string()).is_fatal());
        assert!(!Error::NotFound("page".to_string()).is_fatal());
    }

    #[test]
    fn test_structured_variant_display() {
        let err = Error::Engine {
            status: 400,
            reason: "Unknown column [foo]".to_string(),
        };
        assert_eq!(err.to_string(), "Engine error (400): Unknown column [foo]");

        let err = Error::BackendUnavailable {
            backend: "agent".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("'agent'"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.category(), "serialization");
    }

    proptest! {
        #[test]
        fn test_generation_error_with_arbitrary_messages(msg in r".{0,200}") {
            let error = Error::Generation(msg.clone());
            let rendered = error.to_string();

            prop_assert!(rendered.contains("Generation failed"));
            prop_assert!(rendered.contains(&msg));
            prop_assert!(!error.is_recoverable());
        }
    }
}
