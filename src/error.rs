//! Error types for api-harvest
//!
//! Only setup and data problems surface as [`Error`]. A request that fails on the
//! wire, answers with a non-200 status or carries an undecodable body is not an
//! error: it is recorded in its [`FetchResult`](crate::types::FetchResult) and ends
//! up on the failure list.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for api-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for api-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "token_file")
        key: Option<String>,
    },

    /// A relation name that is not part of the relation table
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// A resource kind name that is not part of the resource chain
    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    /// The table has no column the relation reads its ids from
    #[error("relation '{relation}' needs column '{column}', which the table does not have")]
    MissingColumn {
        /// Relation being derived
        relation: String,
        /// Column the relation reads
        column: String,
    },

    /// A cell that cannot be turned into an endpoint id
    #[error("row {row}: value {value} in column '{column}' is not a usable id")]
    InvalidId {
        /// Column the value was read from
        column: String,
        /// Zero-based row index in the table
        row: usize,
        /// The offending value, rendered as JSON
        value: String,
    },

    /// A line of an identifier list that is not an absolute URL
    #[error("{}:{line}: invalid endpoint: {reason}", .path.display())]
    InvalidEndpoint {
        /// Identifier list file
        path: PathBuf,
        /// One-based line number
        line: usize,
        /// Parser message
        reason: String,
    },

    /// A table with no columns cannot be written as CSV
    #[error("table for {} has no columns", .0.display())]
    EmptyTable(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error (client construction; per-request failures are data)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The run was stopped by a termination signal before it finished
    #[error("run interrupted")]
    Interrupted,

}

impl Error {
    /// Shorthand for a configuration error tied to a config key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error is a setup defect that must abort the run
    ///
    /// Configuration errors are distinct from data errors such as
    /// [`Error::MissingColumn`], which depend on what the server returned.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::UnknownRelation(_) | Error::UnknownResource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::config("empty", "token_file").is_configuration());
        assert!(Error::UnknownRelation("owners".into()).is_configuration());
        assert!(Error::UnknownResource("audiences".into()).is_configuration());

        let data_error = Error::MissingColumn {
            relation: "variations".into(),
            column: "variation_ids".into(),
        };
        assert!(!data_error.is_configuration());
        assert!(!Error::Interrupted.is_configuration());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::MissingColumn {
            relation: "stats".into(),
            column: "id".into(),
        };
        assert_eq!(
            err.to_string(),
            "relation 'stats' needs column 'id', which the table does not have"
        );

        let err = Error::InvalidEndpoint {
            path: PathBuf::from("urls/projects.url"),
            line: 3,
            reason: "relative URL without a base".into(),
        };
        assert_eq!(
            err.to_string(),
            "urls/projects.url:3: invalid endpoint: relative URL without a base"
        );

        let err = Error::config("token file is empty", "token_file");
        assert_eq!(err.to_string(), "configuration error: token file is empty");
    }

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }

        match open_missing() {
            Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
