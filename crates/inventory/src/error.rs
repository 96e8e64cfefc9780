//! Error types for inventory operations.
//!
//! Every error maps to an [`ErrorKind`] so callers can decide whether a
//! failure aborts the whole run, only the current server slot, or nothing.

use thiserror::Error;

/// Broad categories of inventory failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed operator input (unknown OS, empty field, bad table name)
    Validation,
    /// An existing record would be silently overwritten
    Conflict,
    /// A lookup found nothing (or nothing unambiguous)
    NotFound,
    /// The backing store failed a round-trip
    Store,
}

impl ErrorKind {
    /// Get a short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not found",
            Self::Store => "store",
        }
    }
}

/// Errors that can occur while reading, writing or reconciling records.
#[derive(Debug, Error)]
pub enum Error {
    /// OS type outside the supported set
    #[error("unsupported OS type '{value}' (expected one of: {expected})")]
    UnsupportedOs {
        /// The rejected value as entered
        value: String,
        /// Comma-separated list of supported values
        expected: String,
    },

    /// A required field is empty or malformed
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// A "new" server reuses an instance id that is already stored
    #[error("instance {instance_id} is already registered as '{server_name}'")]
    Conflict {
        /// The reused instance id
        instance_id: String,
        /// Name of the stored server owning it
        server_name: String,
    },

    /// A "new" server reuses a name owned by another instance
    #[error("server name '{server_name}' is already used by instance {instance_id}")]
    NameTaken {
        /// The reused server name
        server_name: String,
        /// Instance currently owning that name
        instance_id: String,
    },

    /// No stored server matches the requested name
    #[error("no stored server named '{0}'")]
    NotFound(String),

    /// Several stored servers share the requested name
    #[error("server name '{server_name}' matches {count} stored servers; rename one before selecting it")]
    Ambiguous {
        /// The ambiguous name
        server_name: String,
        /// Number of matching records
        count: usize,
    },

    /// Transport or database failure against the record store
    #[error("store error during {operation} ({key}): {message}")]
    Store {
        /// Operation that failed (get_server, put_status, ...)
        operation: &'static str,
        /// Record key involved, or the table name for scans
        key: String,
        /// Underlying error message
        message: String,
    },

    /// A stored row could not be decoded into a record
    #[error("malformed record {key}: {message}")]
    Corrupt {
        /// Record key of the bad row
        key: String,
        /// Why it was rejected
        message: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedOs { .. } | Error::InvalidField { .. } => ErrorKind::Validation,
            Error::Conflict { .. } | Error::NameTaken { .. } => ErrorKind::Conflict,
            Error::NotFound(_) | Error::Ambiguous { .. } => ErrorKind::NotFound,
            Error::Store { .. } | Error::Corrupt { .. } => ErrorKind::Store,
        }
    }

    /// Build a store error for a failed round-trip.
    pub fn store(operation: &'static str, key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Store {
            operation,
            key: key.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = Error::Conflict {
            instance_id: "i-1".into(),
            server_name: "web-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(Error::NotFound("db-1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::store("put_status", "i-1/SOFTWARE#docker", "timeout").kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_store_error_message_names_key() {
        let err = Error::store("put_server", "i-1/SERVER", "disk I/O error");
        let msg = err.to_string();
        assert!(msg.contains("put_server"));
        assert!(msg.contains("i-1/SERVER"));
        assert!(msg.contains("disk I/O error"));
    }
}
