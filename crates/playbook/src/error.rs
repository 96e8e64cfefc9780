//! Error types for planning and running playbooks.
//!
//! [`Error`] covers everything that stops a run before the external tool is
//! invoked. [`ToolError`] is kept apart so an invocation failure is never
//! confused with a per-server install failure.

use inventory::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating, reconciling or planning a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Store or reconciliation failure that aborts the run
    #[error(transparent)]
    Inventory(#[from] inventory::Error),

    /// A server slot failed validation
    #[error("server {} ('{server_name}'): {source}", .slot + 1)]
    InvalidSlot {
        /// Zero-based slot index
        slot: usize,
        /// Name entered for the slot
        server_name: String,
        /// Underlying validation error
        #[source]
        source: inventory::Error,
    },

    /// Requested software is not in the catalog
    #[error("unknown software for '{server_name}': {} (available: {available})", .names.join(", "))]
    UnknownSoftware {
        /// Server the selection was made for
        server_name: String,
        /// Names not found in the catalog
        names: Vec<String>,
        /// Comma-separated catalog
        available: String,
    },

    /// Two different instances ended up with the same host name in one plan
    #[error("server name '{server_name}' is used by both {first} and {second}")]
    DuplicateServerName {
        server_name: String,
        first: String,
        second: String,
    },

    /// Nothing was selected anywhere
    #[error("no software selected for any server")]
    EmptyPlan,

    /// The roles directory does not exist
    #[error("roles directory not found: {}", .0.display())]
    CatalogNotFound(PathBuf),

    /// Descriptor serialization failed
    #[error("failed to render descriptors: {0}")]
    Render(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Inventory(e) => e.kind(),
            Error::InvalidSlot { source, .. } => source.kind(),
            Error::UnknownSoftware { .. }
            | Error::DuplicateServerName { .. }
            | Error::EmptyPlan
            | Error::CatalogNotFound(_) => ErrorKind::Validation,
            Error::Render(_) | Error::Io(_) => ErrorKind::Store,
        }
    }
}

/// Result type for playbook operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of the external tool invocation as a whole.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Descriptors could not be written where the tool expects them
    #[error("could not prepare descriptors: {0}")]
    Prepare(String),

    /// The tool could not be started
    #[error("failed to execute {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited with a status that carries no per-target result
    #[error("{command} exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Exited {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool finished but its output could not be mapped to servers
    #[error("could not determine outcomes from {command} output: {message}")]
    Unparseable { command: String, message: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
    match last {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}
