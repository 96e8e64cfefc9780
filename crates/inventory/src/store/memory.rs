//! In-process record store.

use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::types::{InstallStatusRecord, RecordKind, ServerRecord};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum Item {
    Server(ServerRecord),
    Status(InstallStatusRecord),
}

/// Record store backed by a map keyed like the real table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<(String, RecordKind), Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of both kinds.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove a server record, leaving its status records behind.
    pub fn remove_server(&self, instance_id: &str) -> Option<ServerRecord> {
        match self
            .lock()
            .remove(&(instance_id.to_string(), RecordKind::Server))
        {
            Some(Item::Server(record)) => Some(record),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, RecordKind), Item>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RecordStore for MemoryStore {
    fn get_server(&self, instance_id: &str) -> Result<Option<ServerRecord>> {
        match self.lock().get(&(instance_id.to_string(), RecordKind::Server)) {
            Some(Item::Server(record)) => Ok(Some(record.clone())),
            Some(Item::Status(_)) => Err(Error::Corrupt {
                key: format!("{instance_id}/SERVER"),
                message: "status item stored under server key".to_string(),
            }),
            None => Ok(None),
        }
    }

    fn put_server(&self, record: &ServerRecord) -> Result<()> {
        self.lock().insert(
            (record.instance_id.clone(), RecordKind::Server),
            Item::Server(record.clone()),
        );
        Ok(())
    }

    fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        Ok(self
            .lock()
            .values()
            .filter_map(|item| match item {
                Item::Server(record) => Some(record.clone()),
                Item::Status(_) => None,
            })
            .collect())
    }

    fn put_status(&self, record: &InstallStatusRecord) -> Result<()> {
        self.lock().insert(
            (record.instance_id.clone(), record.kind()),
            Item::Status(record.clone()),
        );
        Ok(())
    }

    fn get_status(
        &self,
        instance_id: &str,
        software_name: &str,
    ) -> Result<Option<InstallStatusRecord>> {
        let key = (
            instance_id.to_string(),
            RecordKind::Software(software_name.to_string()),
        );
        match self.lock().get(&key) {
            Some(Item::Status(record)) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    fn list_statuses(&self) -> Result<Vec<InstallStatusRecord>> {
        Ok(self
            .lock()
            .values()
            .filter_map(|item| match item {
                Item::Status(record) => Some(record.clone()),
                Item::Server(_) => None,
            })
            .collect())
    }
}
