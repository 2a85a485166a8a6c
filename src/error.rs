//! Centralized error handling for the ingestion and gold pipeline.
//!
//! Errors fall into two families, and callers treat them differently:
//!
//! - **Per-file errors** ([`PipelineError::Load`], [`PipelineError::DuplicateFile`])
//!   are scoped to one raw extract. The ingestion driver reports them and moves
//!   on to the next file.
//! - **Fatal errors** ([`PipelineError::SchemaIntegrity`],
//!   [`PipelineError::MissingReference`], [`PipelineError::Config`]) mean the
//!   reference data or the setup is wrong. They propagate to the top and abort
//!   the transformation run.
//!
//! ```
//! use finledger::error::PipelineError;
//!
//! let err = PipelineError::SchemaIntegrity {
//!     context: "gl_to_compass".to_owned(),
//!     detail: "G/L Account 400000 maps to 2 rows".to_owned(),
//! };
//! assert!(err.is_fatal());
//! ```
//!
//! Unmatched lookups and unparseable dates are deliberately *not* errors; they
//! resolve to nulls in the gold rows.

use std::fmt;

/// Main error type for finledger operations.
#[derive(Debug)]
pub enum PipelineError {
    /// I/O errors (reading extracts, writing partitions)
    Io(std::io::Error),

    /// Polars errors (parsing, casting, joins)
    DataProcessing(String),

    /// Warehouse (SQLite) errors
    Database(String),

    /// Configuration errors
    Config(String),

    /// The file name is already present in the ingestion ledger
    DuplicateFile { filename: String },

    /// One raw file could not be loaded; the batch continues
    Load { filename: String, reason: String },

    /// A join or uniqueness contract on reference data was violated
    SchemaIntegrity { context: String, detail: String },

    /// A reference table or one of its required columns is absent
    MissingReference(String),

    /// Generic error with context
    Other(String),
}

impl PipelineError {
    /// Whether this error must abort the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SchemaIntegrity { .. } | Self::MissingReference(_) | Self::Config(_)
        )
    }

    pub(crate) fn load(filename: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Load {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn integrity(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaIntegrity {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Database(msg) => write!(f, "Database error: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::DuplicateFile { filename } => {
                write!(f, "File already ingested: {filename}")
            }
            Self::Load { filename, reason } => write!(f, "Failed to load {filename}: {reason}"),
            Self::SchemaIntegrity { context, detail } => {
                write!(f, "Schema integrity violated in {context}: {detail}")
            }
            Self::MissingReference(msg) => write!(f, "Missing reference data: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

/// Result type alias for finledger operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: PipelineError = e.into();
            PipelineError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: PipelineError = e.into();
            PipelineError::Other(format!("{}: {}", f(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::load("ACT_2024_03.csv", "column not found");
        assert_eq!(
            err.to_string(),
            "Failed to load ACT_2024_03.csv: column not found"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::integrity("wbs", "dup").is_fatal());
        assert!(PipelineError::MissingReference("meta_signatures".to_owned()).is_fatal());
        assert!(!PipelineError::load("a.csv", "bad").is_fatal());
        assert!(
            !PipelineError::DuplicateFile {
                filename: "a.csv".to_owned()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file.txt",
        ));

        let result: Result<()> = result.context("Failed to read extract");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read extract")
        );
    }
}
