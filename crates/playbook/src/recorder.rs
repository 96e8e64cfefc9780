//! Execution status recording.
//!
//! After the tool has run, every (server, software) pair in the plan gets
//! exactly one status write. Pairs without a reported outcome are recorded as
//! failures. A failed write is collected and the sweep carries on.

use crate::plan::RunPlan;
use crate::tool::ToolReport;
use inventory::{InstallStatus, InstallStatusRecord, RecordStore};

/// A status write that did not reach the store.
#[derive(Debug)]
pub struct StatusWriteError {
    pub instance_id: String,
    pub server_name: String,
    pub software: String,
    pub error: inventory::Error,
}

/// Recorded outcome of one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    pub server_name: String,
    pub instance_id: String,
    pub software: String,
    pub status: InstallStatus,
}

/// Result of one recording sweep.
#[derive(Debug, Default)]
pub struct RecordSummary {
    pub results: Vec<PairResult>,
    pub write_errors: Vec<StatusWriteError>,
}

impl RecordSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Every write reached the store.
    pub fn is_clean(&self) -> bool {
        self.write_errors.is_empty()
    }

    /// Results for one server, in plan order.
    pub fn for_server<'a>(&'a self, instance_id: &'a str) -> impl Iterator<Item = &'a PairResult> {
        self.results
            .iter()
            .filter(move |r| r.instance_id == instance_id)
    }
}

/// Write one status record per planned pair.
///
/// `report` is `None` when the tool invocation failed outright; every pair is
/// then recorded as a failure.
pub fn record_outcomes<S: RecordStore + ?Sized>(
    store: &S,
    plan: &RunPlan,
    report: Option<&ToolReport>,
) -> RecordSummary {
    let mut summary = RecordSummary::default();

    for (server, software) in plan.pairs() {
        let status = report
            .and_then(|r| r.outcome(&server.server_name, software))
            .unwrap_or(InstallStatus::Failure);

        let record = InstallStatusRecord::now(&server.instance_id, software, status);
        match store.put_status(&record) {
            Ok(()) => log::debug!("Recorded {} = {status}", record.key()),
            Err(error) => {
                log::warn!("Failed to record {}: {error}", record.key());
                summary.write_errors.push(StatusWriteError {
                    instance_id: server.instance_id.clone(),
                    server_name: server.server_name.clone(),
                    software: software.to_string(),
                    error,
                });
            }
        }

        summary.results.push(PairResult {
            server_name: server.server_name.clone(),
            instance_id: server.instance_id.clone(),
            software: software.to_string(),
            status,
        });
    }

    summary
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::plan::RunPlanBuilder;
    use inventory::{MemoryStore, OsType, ServerRecord};

    fn server(id: &str, name: &str) -> ServerRecord {
        ServerRecord {
            instance_id: id.into(),
            server_name: name.into(),
            region: "ap-south-1".into(),
            os_type: OsType::Debian,
            transport_log_bucket: None,
        }
    }

    fn plan() -> RunPlan {
        let catalog = Catalog::from_names(["docker", "nginx"]);
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "web-1"), "docker, nginx").unwrap();
        builder.add(&server("i-2", "web-2"), "nginx").unwrap();
        builder.build()
    }

    /// Store that refuses status writes for one software item.
    struct FlakyStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    impl RecordStore for FlakyStore {
        fn get_server(&self, id: &str) -> inventory::Result<Option<ServerRecord>> {
            self.inner.get_server(id)
        }
        fn put_server(&self, record: &ServerRecord) -> inventory::Result<()> {
            self.inner.put_server(record)
        }
        fn list_servers(&self) -> inventory::Result<Vec<ServerRecord>> {
            self.inner.list_servers()
        }
        fn put_status(&self, record: &InstallStatusRecord) -> inventory::Result<()> {
            if record.software_name == self.reject {
                return Err(inventory::Error::store("put_status", record.key(), "throttled"));
            }
            self.inner.put_status(record)
        }
        fn get_status(&self, id: &str, sw: &str) -> inventory::Result<Option<InstallStatusRecord>> {
            self.inner.get_status(id, sw)
        }
        fn list_statuses(&self) -> inventory::Result<Vec<InstallStatusRecord>> {
            self.inner.list_statuses()
        }
    }

    #[test]
    fn test_missing_outcome_is_failure() {
        let store = MemoryStore::new();
        let report = ToolReport::new(Some(0)).with_outcome("web-1", "docker", InstallStatus::Success);

        let summary = record_outcomes(&store, &plan(), Some(&report));

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 2);
        assert_eq!(
            store.get_status("i-1", "nginx").unwrap().unwrap().status,
            InstallStatus::Failure
        );
    }

    #[test]
    fn test_no_report_fails_every_pair() {
        let store = MemoryStore::new();
        let summary = record_outcomes(&store, &plan(), None);

        assert_eq!(summary.failed(), 3);
        assert_eq!(store.list_statuses().unwrap().len(), 3);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_write_error_does_not_stop_sweep() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            reject: "docker",
        };

        let summary = record_outcomes(&store, &plan(), None);

        assert_eq!(summary.write_errors.len(), 1);
        assert_eq!(summary.write_errors[0].software, "docker");
        assert!(!summary.is_clean());
        // both nginx pairs still written
        assert_eq!(store.list_statuses().unwrap().len(), 2);
        assert_eq!(summary.results.len(), 3);
    }

    #[test]
    fn test_for_server() {
        let store = MemoryStore::new();
        let summary = record_outcomes(&store, &plan(), None);
        assert_eq!(summary.for_server("i-1").count(), 2);
        assert_eq!(summary.for_server("i-2").count(), 1);
    }
}
