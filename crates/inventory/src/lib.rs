//! # inventory
//!
//! Server inventory and install-status tracking.
//!
//! This crate provides:
//! - Record types for servers and per-software install outcomes
//! - The [`RecordStore`] trait with SQLite and in-memory implementations
//! - Reconciliation of operator-declared servers against stored ones
//!
//! ## Example
//!
//! ```no_run
//! use inventory::{reconcile, NewServer, RecordStore, SlotRequest, SqliteStore};
//! use std::path::Path;
//!
//! let store = SqliteStore::open(Path::new("inventory.db"), "ansible-inventory")?;
//!
//! let slot = SlotRequest::New(NewServer {
//!     server_name: "web-1".into(),
//!     instance_id: "i-0123456789abcdef0".into(),
//!     region: "ap-south-1".into(),
//!     os_type: "ubuntu".into(),
//!     transport_log_bucket: None,
//! })
//! .validate()?;
//!
//! let outcome = reconcile(&store, &[slot])?;
//! println!("{} created, {} rejected", outcome.created(), outcome.rejected.len());
//! # Ok::<(), inventory::Error>(())
//! ```

mod error;
pub mod reconcile;
pub mod store;
mod types;

pub use error::{Error, ErrorKind, Result};
pub use reconcile::{
    ReconciledServer, Reconciliation, Resolution, ServerSlot, SlotRejection, SlotRequest,
    reconcile,
};
pub use store::{MemoryStore, RecordStore, SqliteStore};
pub use store::sqlite::DEFAULT_TABLE;
pub use types::{
    InstallStatus, InstallStatusRecord, NewServer, OsType, RecordKind, ServerRecord, record_key,
};
