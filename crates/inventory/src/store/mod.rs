//! Record store abstraction.
//!
//! The [`RecordStore`] trait is the only way the rest of the system touches
//! persisted inventory. Implementations:
//! - [`SqliteStore`]: a single wide table keyed by `(instance_id, record_kind)`
//! - [`MemoryStore`]: in-process map, for tests and dry runs
//!
//! Every call is an independent round-trip. Implementations must not cache:
//! reconciliation re-reads current state before each decision.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{InstallStatusRecord, ServerRecord};

/// Typed get/put/scan operations over server and install-status records.
pub trait RecordStore {
    /// Fetch the server record for an instance, `None` if absent.
    fn get_server(&self, instance_id: &str) -> Result<Option<ServerRecord>>;

    /// Insert or fully replace a server record.
    fn put_server(&self, record: &ServerRecord) -> Result<()>;

    /// Scan every server record. Order is unspecified.
    fn list_servers(&self) -> Result<Vec<ServerRecord>>;

    /// Insert or overwrite the status for `(instance_id, software_name)`.
    fn put_status(&self, record: &InstallStatusRecord) -> Result<()>;

    /// Fetch the last recorded status for a pair, `None` if never recorded.
    fn get_status(&self, instance_id: &str, software_name: &str)
    -> Result<Option<InstallStatusRecord>>;

    /// Scan every status record, including ones whose server is gone.
    fn list_statuses(&self) -> Result<Vec<InstallStatusRecord>>;

    /// Find stored servers carrying `server_name`.
    ///
    /// More than one match means the store predates name uniqueness.
    fn find_servers_by_name(&self, server_name: &str) -> Result<Vec<ServerRecord>> {
        Ok(self
            .list_servers()?
            .into_iter()
            .filter(|s| s.server_name == server_name)
            .collect())
    }
}
