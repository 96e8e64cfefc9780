//! Run pipeline.
//!
//! A run goes through two phases:
//!
//! 1. [`prepare`] validates all input, reconciles servers (committing new
//!    server records), builds the plan and generates descriptors
//! 2. [`PreparedRun::execute`] invokes the tool once and records one status
//!    per planned pair
//!
//! Callers may stop between the phases (for example to ask for
//! confirmation). Nothing beyond the server records has been written then.

use crate::catalog::Catalog;
use crate::descriptor::{DescriptorOptions, Descriptors};
use crate::error::{Error, Result, ToolError};
use crate::plan::{RunPlan, RunPlanBuilder};
use crate::recorder::{RecordSummary, record_outcomes};
use crate::tool::{ExternalTool, ToolReport};
use inventory::{Reconciliation, RecordStore, ServerRecord, SlotRequest, reconcile};
use std::collections::BTreeSet;

/// One server slot and the raw software selection for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRequest {
    pub slot: SlotRequest,
    /// Comma-separated software names as entered
    pub software: String,
    /// Session log bucket for this run only, used when the stored record
    /// has none. Never written to the store.
    pub session_bucket: Option<String>,
}

/// Everything the operator declared for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub servers: Vec<ServerRequest>,
}

impl RunRequest {
    /// Append a slot and return it for further adjustment.
    pub fn push(&mut self, slot: SlotRequest, software: impl Into<String>) -> &mut ServerRequest {
        self.servers.push(ServerRequest {
            slot,
            software: software.into(),
            session_bucket: None,
        });
        let last = self.servers.len() - 1;
        &mut self.servers[last]
    }
}

/// A validated, reconciled and planned run, ready to execute.
#[derive(Debug)]
pub struct PreparedRun {
    pub reconciliation: Reconciliation,
    pub plan: RunPlan,
    pub descriptors: Descriptors,
}

/// Outcome of an executed run.
#[derive(Debug)]
pub struct RunReport {
    pub reconciliation: Reconciliation,
    pub plan: RunPlan,
    pub summary: RecordSummary,
    /// Per-pair outcomes as reported by the tool
    pub tool_report: Option<ToolReport>,
    /// Set when the invocation failed as a whole
    pub tool_error: Option<ToolError>,
    /// Whether the tool was started at all
    pub invoked: bool,
}

impl RunReport {
    /// False when a status write or the tool invocation failed.
    pub fn is_success(&self) -> bool {
        self.summary.is_clean() && self.tool_error.is_none()
    }

    pub fn servers_processed(&self) -> usize {
        self.plan.entries().len()
    }
}

/// Validate input, reconcile servers and build the plan.
///
/// Validation covers every slot and every selection before anything is
/// written, so an unknown OS or software name leaves the store untouched.
pub fn prepare<S: RecordStore + ?Sized>(
    store: &S,
    catalog: &Catalog,
    request: &RunRequest,
    options: &DescriptorOptions,
) -> Result<PreparedRun> {
    let mut slots = Vec::with_capacity(request.servers.len());
    let mut selections: Vec<BTreeSet<String>> = Vec::with_capacity(request.servers.len());

    for (index, server) in request.servers.iter().enumerate() {
        let slot = server
            .slot
            .validate()
            .map_err(|source| Error::InvalidSlot {
                slot: index,
                server_name: server.slot.server_name().to_string(),
                source,
            })?;
        selections.push(catalog.parse_selection(slot.server_name(), &server.software)?);
        slots.push(slot);
    }

    if selections.iter().all(BTreeSet::is_empty) {
        return Err(Error::EmptyPlan);
    }

    let reconciliation = reconcile(store, &slots)?;
    log::info!(
        "Reconciled {} servers ({} new, {} existing, {} rejected)",
        slots.len(),
        reconciliation.created(),
        reconciliation.resolved(),
        reconciliation.rejected.len()
    );

    let mut builder = RunPlanBuilder::new(catalog);
    for server in &reconciliation.servers {
        let bucket = request.servers[server.slot].session_bucket.as_deref();
        let record = with_session_bucket(&server.record, bucket);
        builder.add_selection(&record, selections[server.slot].clone())?;
    }
    let plan = builder.build();
    let descriptors = Descriptors::generate(&plan, options);

    Ok(PreparedRun {
        reconciliation,
        plan,
        descriptors,
    })
}

/// Copy of `record` carrying `bucket` when it has none of its own.
fn with_session_bucket(record: &ServerRecord, bucket: Option<&str>) -> ServerRecord {
    let mut record = record.clone();
    let Some(bucket) = bucket.map(str::trim).filter(|b| !b.is_empty()) else {
        return record;
    };
    match &record.transport_log_bucket {
        None => {
            log::debug!(
                "Using session bucket {bucket} for {} in this run",
                record.server_name
            );
            record.transport_log_bucket = Some(bucket.to_string());
        }
        Some(stored) if stored != bucket => log::warn!(
            "Keeping stored bucket {stored} for {}, ignoring {bucket}",
            record.server_name
        ),
        Some(_) => {}
    }
    record
}

impl PreparedRun {
    /// Invoke the tool once and record every planned pair.
    ///
    /// The tool is skipped when the plan is empty, which happens when every
    /// slot with a selection was rejected.
    pub fn execute<S, T>(self, store: &S, tool: &T) -> RunReport
    where
        S: RecordStore + ?Sized,
        T: ExternalTool + ?Sized,
    {
        let (tool_report, tool_error, invoked) = if self.plan.is_empty() {
            log::info!("Nothing to install, skipping {}", tool.name());
            (None, None, false)
        } else {
            match tool.execute(&self.descriptors) {
                Ok(report) => (Some(report), None, true),
                Err(e) => {
                    log::warn!("{} failed: {e}", tool.name());
                    (None, Some(e), true)
                }
            }
        };

        let summary = record_outcomes(store, &self.plan, tool_report.as_ref());

        RunReport {
            reconciliation: self.reconciliation,
            plan: self.plan,
            summary,
            tool_report,
            tool_error,
            invoked,
        }
    }
}

/// Prepare and execute in one go.
pub fn run<S, T>(
    store: &S,
    catalog: &Catalog,
    request: &RunRequest,
    options: &DescriptorOptions,
    tool: &T,
) -> Result<RunReport>
where
    S: RecordStore + ?Sized,
    T: ExternalTool + ?Sized,
{
    Ok(prepare(store, catalog, request, options)?.execute(store, tool))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::{ErrorKind, MemoryStore, NewServer, OsType, ServerRecord};
    use std::cell::Cell;

    struct CountingTool {
        calls: Cell<usize>,
    }

    impl ExternalTool for CountingTool {
        fn name(&self) -> &str {
            "counting"
        }

        fn execute(&self, descriptors: &Descriptors) -> std::result::Result<ToolReport, ToolError> {
            self.calls.set(self.calls.get() + 1);
            let mut report = ToolReport::new(Some(0));
            for (host, sw) in descriptors.pairs() {
                report.set(host, sw, inventory::InstallStatus::Success);
            }
            Ok(report)
        }
    }

    fn catalog() -> Catalog {
        Catalog::from_names(["docker", "nginx"])
    }

    fn new_slot(id: &str, name: &str) -> SlotRequest {
        SlotRequest::New(NewServer {
            server_name: name.into(),
            instance_id: id.into(),
            region: "ap-south-1".into(),
            os_type: "ubuntu".into(),
            transport_log_bucket: None,
        })
    }

    #[test]
    fn test_invalid_slot_aborts_before_writes() {
        let store = MemoryStore::new();
        let mut request = RunRequest::default();
        request.push(new_slot("i-1", "web-1"), "docker");
        request.push(
            SlotRequest::New(NewServer {
                os_type: "windows".into(),
                ..NewServer::default()
            }),
            "docker",
        );

        let err = prepare(&store, &catalog(), &request, &DescriptorOptions::default()).unwrap_err();

        assert!(matches!(err, Error::InvalidSlot { slot: 1, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_selection_everywhere() {
        let store = MemoryStore::new();
        let mut request = RunRequest::default();
        request.push(new_slot("i-1", "web-1"), " ");

        let err = prepare(&store, &catalog(), &request, &DescriptorOptions::default()).unwrap_err();

        assert!(matches!(err, Error::EmptyPlan));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejected_slot_does_not_fail_run() {
        let store = MemoryStore::new();
        store
            .put_server(&ServerRecord {
                instance_id: "i-1".into(),
                server_name: "web-1".into(),
                region: "ap-south-1".into(),
                os_type: OsType::Ubuntu,
                transport_log_bucket: None,
            })
            .unwrap();

        let mut request = RunRequest::default();
        request.push(new_slot("i-1", "web-9"), "docker");
        request.push(new_slot("i-2", "web-2"), "nginx");
        let tool = CountingTool { calls: Cell::new(0) };

        let report = run(&store, &catalog(), &request, &DescriptorOptions::default(), &tool).unwrap();

        assert_eq!(report.reconciliation.rejected.len(), 1);
        assert_eq!(report.reconciliation.rejected[0].error.kind(), ErrorKind::Conflict);
        assert_eq!(report.servers_processed(), 1);
        assert_eq!(report.summary.succeeded(), 1);
        assert!(report.is_success());
        assert_eq!(tool.calls.get(), 1);
    }

    #[test]
    fn test_session_bucket_fills_missing_only() {
        let mut record = ServerRecord {
            instance_id: "i-1".into(),
            server_name: "db-1".into(),
            region: "eu-west-1".into(),
            os_type: OsType::Centos,
            transport_log_bucket: None,
        };

        let filled = with_session_bucket(&record, Some(" ssm-logs "));
        assert_eq!(filled.transport_log_bucket.as_deref(), Some("ssm-logs"));
        assert_eq!(with_session_bucket(&record, Some("  ")).transport_log_bucket, None);

        record.transport_log_bucket = Some("stored".into());
        let kept = with_session_bucket(&record, Some("ssm-logs"));
        assert_eq!(kept.transport_log_bucket.as_deref(), Some("stored"));
    }

    #[test]
    fn test_all_slots_rejected_skips_tool() {
        let store = MemoryStore::new();
        let mut request = RunRequest::default();
        request.push(
            SlotRequest::Existing {
                server_name: "ghost".into(),
            },
            "docker",
        );
        let tool = CountingTool { calls: Cell::new(0) };

        let report = run(&store, &catalog(), &request, &DescriptorOptions::default(), &tool).unwrap();

        assert!(!report.invoked);
        assert_eq!(tool.calls.get(), 0);
        assert!(report.summary.results.is_empty());
        assert!(report.is_success());
    }
}
