//! Inventory reconciliation.
//!
//! Turns operator-declared server slots into stored [`ServerRecord`]s:
//! - `New` slots are checked against the store and written immediately, so
//!   a later slot in the same run can already select them as existing.
//! - `Existing` slots are resolved by exact name against current store state.
//!
//! A conflict or failed lookup rejects only its slot. A failed write aborts
//! the whole reconciliation, since later slots may depend on it.

use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::types::{NewServer, ServerRecord};
use std::fmt;

/// Operator intent for one server slot, as entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotRequest {
    New(NewServer),
    Existing { server_name: String },
}

impl SlotRequest {
    /// Validate field shapes without touching the store.
    pub fn validate(&self) -> Result<ServerSlot> {
        match self {
            SlotRequest::New(input) => Ok(ServerSlot::New(input.validate()?)),
            SlotRequest::Existing { server_name } => {
                let name = server_name.trim();
                if name.is_empty() {
                    return Err(Error::InvalidField {
                        field: "server_name",
                        message: "must not be empty".to_string(),
                    });
                }
                Ok(ServerSlot::Existing {
                    server_name: name.to_string(),
                })
            }
        }
    }

    /// Name the operator typed for this slot.
    pub fn server_name(&self) -> &str {
        match self {
            SlotRequest::New(input) => input.server_name.trim(),
            SlotRequest::Existing { server_name } => server_name.trim(),
        }
    }
}

/// A validated server slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSlot {
    New(ServerRecord),
    Existing { server_name: String },
}

impl ServerSlot {
    pub fn server_name(&self) -> &str {
        match self {
            ServerSlot::New(record) => &record.server_name,
            ServerSlot::Existing { server_name } => server_name,
        }
    }
}

/// How a slot was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Newly written to the store during this run
    Created,
    /// Looked up from an existing record
    Resolved,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Created => f.write_str("new"),
            Resolution::Resolved => f.write_str("existing"),
        }
    }
}

/// A slot that ended up with a usable server record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledServer {
    /// Index of the slot in the request
    pub slot: usize,
    pub record: ServerRecord,
    pub resolution: Resolution,
}

/// A slot that could not be satisfied.
#[derive(Debug)]
pub struct SlotRejection {
    pub slot: usize,
    pub server_name: String,
    pub error: Error,
}

/// Outcome of reconciling all slots of a run.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub servers: Vec<ReconciledServer>,
    pub rejected: Vec<SlotRejection>,
}

impl Reconciliation {
    pub fn created(&self) -> usize {
        self.count(Resolution::Created)
    }

    pub fn resolved(&self) -> usize {
        self.count(Resolution::Resolved)
    }

    /// Find the server accepted for a slot.
    pub fn for_slot(&self, slot: usize) -> Option<&ReconciledServer> {
        self.servers.iter().find(|s| s.slot == slot)
    }

    fn count(&self, resolution: Resolution) -> usize {
        self.servers
            .iter()
            .filter(|s| s.resolution == resolution)
            .count()
    }
}

/// Reconcile validated slots against the store, in order.
///
/// Returns `Err` only when writing a new server record fails.
pub fn reconcile<S: RecordStore + ?Sized>(store: &S, slots: &[ServerSlot]) -> Result<Reconciliation> {
    let mut outcome = Reconciliation::default();

    for (index, slot) in slots.iter().enumerate() {
        let result = match slot {
            ServerSlot::New(record) => create(store, record),
            ServerSlot::Existing { server_name } => resolve(store, server_name),
        };

        match result {
            Ok(Step::Accepted(record, resolution)) => {
                log::debug!(
                    "Slot {}: {} {} ({})",
                    index + 1,
                    resolution,
                    record.server_name,
                    record.instance_id
                );
                outcome.servers.push(ReconciledServer {
                    slot: index,
                    record,
                    resolution,
                });
            }
            Ok(Step::Rejected(error)) => {
                log::debug!("Slot {} rejected: {}", index + 1, error);
                outcome.rejected.push(SlotRejection {
                    slot: index,
                    server_name: slot.server_name().to_string(),
                    error,
                });
            }
            Err(fatal) => return Err(fatal),
        }
    }

    Ok(outcome)
}

enum Step {
    Accepted(ServerRecord, Resolution),
    Rejected(Error),
}

fn create<S: RecordStore + ?Sized>(store: &S, record: &ServerRecord) -> Result<Step> {
    match store.get_server(&record.instance_id) {
        Ok(Some(existing)) => {
            return Ok(Step::Rejected(Error::Conflict {
                instance_id: existing.instance_id,
                server_name: existing.server_name,
            }));
        }
        Ok(None) => {}
        Err(e) => return Ok(Step::Rejected(e)),
    }

    match store.find_servers_by_name(&record.server_name) {
        Ok(owners) => {
            if let Some(owner) = owners
                .into_iter()
                .find(|s| s.instance_id != record.instance_id)
            {
                return Ok(Step::Rejected(Error::NameTaken {
                    server_name: record.server_name.clone(),
                    instance_id: owner.instance_id,
                }));
            }
        }
        Err(e) => return Ok(Step::Rejected(e)),
    }

    store.put_server(record)?;
    Ok(Step::Accepted(record.clone(), Resolution::Created))
}

fn resolve<S: RecordStore + ?Sized>(store: &S, server_name: &str) -> Result<Step> {
    let mut matches = match store.find_servers_by_name(server_name) {
        Ok(matches) => matches,
        Err(e) => return Ok(Step::Rejected(e)),
    };

    let step = match matches.len() {
        0 => Step::Rejected(Error::NotFound(server_name.to_string())),
        1 => Step::Accepted(matches.remove(0), Resolution::Resolved),
        count => Step::Rejected(Error::Ambiguous {
            server_name: server_name.to_string(),
            count,
        }),
    };
    Ok(step)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::types::{InstallStatusRecord, OsType};

    fn record(id: &str, name: &str) -> ServerRecord {
        ServerRecord {
            instance_id: id.into(),
            server_name: name.into(),
            region: "ap-south-1".into(),
            os_type: OsType::Ubuntu,
            transport_log_bucket: None,
        }
    }

    fn existing(name: &str) -> ServerSlot {
        ServerSlot::Existing {
            server_name: name.into(),
        }
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(MemoryStore);

    impl RecordStore for ReadOnlyStore {
        fn get_server(&self, instance_id: &str) -> Result<Option<ServerRecord>> {
            self.0.get_server(instance_id)
        }
        fn put_server(&self, record: &ServerRecord) -> Result<()> {
            Err(Error::store("put_server", record.key(), "access denied"))
        }
        fn list_servers(&self) -> Result<Vec<ServerRecord>> {
            self.0.list_servers()
        }
        fn put_status(&self, record: &InstallStatusRecord) -> Result<()> {
            Err(Error::store("put_status", record.key(), "access denied"))
        }
        fn get_status(&self, id: &str, sw: &str) -> Result<Option<InstallStatusRecord>> {
            self.0.get_status(id, sw)
        }
        fn list_statuses(&self) -> Result<Vec<InstallStatusRecord>> {
            self.0.list_statuses()
        }
    }

    #[test]
    fn test_new_server_is_written_immediately() {
        let store = MemoryStore::new();
        let outcome = reconcile(&store, &[ServerSlot::New(record("i-1", "web-1"))]).unwrap();

        assert_eq!(outcome.created(), 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(store.get_server("i-1").unwrap(), Some(record("i-1", "web-1")));
    }

    #[test]
    fn test_new_server_with_existing_instance_id_conflicts() {
        let store = MemoryStore::new();
        store.put_server(&record("i-1", "web-1")).unwrap();

        let outcome = reconcile(&store, &[ServerSlot::New(record("i-1", "web-2"))]).unwrap();

        assert!(outcome.servers.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].error.kind(), ErrorKind::Conflict);
        // stored metadata untouched
        assert_eq!(store.get_server("i-1").unwrap().unwrap().server_name, "web-1");
    }

    #[test]
    fn test_new_server_with_taken_name_conflicts() {
        let store = MemoryStore::new();
        store.put_server(&record("i-1", "web-1")).unwrap();

        let outcome = reconcile(&store, &[ServerSlot::New(record("i-2", "web-1"))]).unwrap();

        assert!(matches!(outcome.rejected[0].error, Error::NameTaken { .. }));
        assert!(store.get_server("i-2").unwrap().is_none());
    }

    #[test]
    fn test_existing_server_resolves_by_name() {
        let store = MemoryStore::new();
        store.put_server(&record("i-7", "db-1")).unwrap();

        let outcome = reconcile(&store, &[existing("db-1")]).unwrap();

        assert_eq!(outcome.resolved(), 1);
        assert_eq!(outcome.servers[0].record.instance_id, "i-7");
        assert_eq!(outcome.servers[0].resolution, Resolution::Resolved);
    }

    #[test]
    fn test_existing_server_miss_rejects_only_that_slot() {
        let store = MemoryStore::new();
        store.put_server(&record("i-7", "db-1")).unwrap();

        let outcome = reconcile(&store, &[existing("nope"), existing("db-1")]).unwrap();

        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].slot, 0);
        assert!(matches!(outcome.rejected[0].error, Error::NotFound(_)));
        assert_eq!(outcome.for_slot(1).unwrap().record.instance_id, "i-7");
    }

    #[test]
    fn test_later_slot_can_select_server_created_earlier() {
        let store = MemoryStore::new();
        let slots = [ServerSlot::New(record("i-1", "web-1")), existing("web-1")];

        let outcome = reconcile(&store, &slots).unwrap();

        assert_eq!(outcome.created(), 1);
        assert_eq!(outcome.resolved(), 1);
        assert_eq!(outcome.servers[1].record.instance_id, "i-1");
    }

    #[test]
    fn test_duplicate_new_slots_conflict_on_second() {
        let store = MemoryStore::new();
        let slots = [
            ServerSlot::New(record("i-1", "web-1")),
            ServerSlot::New(record("i-1", "web-1")),
        ];

        let outcome = reconcile(&store, &slots).unwrap();

        assert_eq!(outcome.created(), 1);
        assert_eq!(outcome.rejected[0].slot, 1);
        assert_eq!(outcome.rejected[0].error.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_ambiguous_legacy_names() {
        let store = MemoryStore::new();
        store.put_server(&record("i-1", "app")).unwrap();
        store.put_server(&record("i-2", "app")).unwrap();

        let outcome = reconcile(&store, &[existing("app")]).unwrap();

        assert!(matches!(
            outcome.rejected[0].error,
            Error::Ambiguous { count: 2, .. }
        ));
    }

    #[test]
    fn test_failed_write_aborts() {
        let store = ReadOnlyStore(MemoryStore::new());
        let err = reconcile(&store, &[ServerSlot::New(record("i-1", "web-1"))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_slot_request_validate() {
        let slot = SlotRequest::Existing {
            server_name: "  db-1 ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(slot.server_name(), "db-1");

        let err = SlotRequest::New(NewServer {
            server_name: "web-1".into(),
            instance_id: "i-1".into(),
            region: "ap-south-1".into(),
            os_type: "solaris".into(),
            transport_log_bucket: None,
        })
        .validate()
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
