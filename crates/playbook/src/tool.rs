//! External tool capability.
//!
//! The configuration-management tool is reached through [`ExternalTool`], so
//! the run pipeline never depends on a particular CLI and tests can swap in a
//! fake.

use crate::descriptor::{Descriptors, play_name};
use crate::error::ToolError;
use crate::recap::Transcript;
use inventory::InstallStatus;
use std::collections::{BTreeMap, BTreeSet};

/// Per-(host, software) outcomes reported by one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolReport {
    /// Process exit code, when the tool ran as a process
    pub exit_code: Option<i32>,
    outcomes: BTreeMap<(String, String), InstallStatus>,
}

impl ToolReport {
    pub fn new(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            outcomes: BTreeMap::new(),
        }
    }

    /// Record the outcome for a (host, software) pair.
    pub fn with_outcome(mut self, host: &str, software: &str, status: InstallStatus) -> Self {
        self.set(host, software, status);
        self
    }

    pub fn set(&mut self, host: &str, software: &str, status: InstallStatus) {
        self.outcomes
            .insert((host.to_string(), software.to_string()), status);
    }

    /// Reported outcome for a pair, if the tool said anything about it.
    pub fn outcome(&self, host: &str, software: &str) -> Option<InstallStatus> {
        self.outcomes
            .get(&(host.to_string(), software.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Map a parsed transcript back onto the pairs the descriptors addressed.
    ///
    /// Per pair, in order:
    /// 1. host missing from the recap: failure
    /// 2. host recap has no failed or unreachable task: success
    /// 3. a failed task was attributed to the pair: failure
    /// 4. any task ran for the pair: success
    /// 5. otherwise the play never reached the host: failure
    pub fn from_transcript(
        transcript: &Transcript,
        descriptors: &Descriptors,
        exit_code: Option<i32>,
    ) -> Self {
        let known: BTreeSet<&str> = descriptors
            .tasks
            .software
            .iter()
            .map(String::as_str)
            .collect();
        let plays: BTreeMap<String, &str> = known.iter().map(|sw| (play_name(sw), *sw)).collect();

        let mut failed: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();

        for event in &transcript.events {
            let by_role = event
                .role
                .as_deref()
                .and_then(|r| known.get(r).copied());
            let by_play = event
                .play
                .as_deref()
                .and_then(|p| plays.get(p).copied());
            let Some(software) = by_role.or(by_play) else {
                continue;
            };

            let key = (event.host.as_str(), software);
            if event.kind.is_failure() {
                failed.insert(key);
            } else {
                seen.insert(key);
            }
        }

        let mut report = Self::new(exit_code);
        for (host, software) in descriptors.pairs() {
            let status = match transcript.recap.get(host) {
                None => InstallStatus::Failure,
                Some(recap) if recap.is_clean() => InstallStatus::Success,
                Some(_) if failed.contains(&(host, software)) => InstallStatus::Failure,
                Some(_) if seen.contains(&(host, software)) => InstallStatus::Success,
                Some(_) => InstallStatus::Failure,
            };
            report.set(host, software, status);
        }
        report
    }
}

/// A configuration-management tool that can apply descriptors.
pub trait ExternalTool {
    /// Short name for messages.
    fn name(&self) -> &str;

    /// Run once against the descriptors, blocking until done.
    ///
    /// `Err` means the invocation as a whole failed and no per-target
    /// outcome is available.
    fn execute(&self, descriptors: &Descriptors) -> Result<ToolReport, ToolError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::descriptor::DescriptorOptions;
    use crate::plan::RunPlanBuilder;
    use inventory::{OsType, ServerRecord};

    fn server(id: &str, name: &str) -> ServerRecord {
        ServerRecord {
            instance_id: id.into(),
            server_name: name.into(),
            region: "ap-south-1".into(),
            os_type: OsType::Ubuntu,
            transport_log_bucket: None,
        }
    }

    fn descriptors() -> Descriptors {
        let catalog = Catalog::from_names(["docker", "nginx"]);
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "web-1"), "docker, nginx").unwrap();
        builder.add(&server("i-2", "db-1"), "docker, nginx").unwrap();
        builder.add(&server("i-3", "cache-1"), "nginx").unwrap();
        Descriptors::generate(&builder.build(), &DescriptorOptions::default())
    }

    const OUTPUT: &str = "\
PLAY [Install docker] **********************************************************

TASK [Gathering Facts] *********************************************************
ok: [web-1]
ok: [db-1]

TASK [docker : Install packages] ***********************************************
changed: [web-1]
fatal: [db-1]: FAILED! => {\"msg\": \"no package docker-ce\"}

PLAY [Install nginx] ***********************************************************

TASK [Gathering Facts] *********************************************************
ok: [web-1]
ok: [cache-1]

TASK [nginx : Install packages] ************************************************
changed: [web-1]
ok: [cache-1]

PLAY RECAP *********************************************************************
cache-1                    : ok=2    changed=0    unreachable=0    failed=0    skipped=0    rescued=0    ignored=0
db-1                       : ok=1    changed=0    unreachable=0    failed=1    skipped=0    rescued=0    ignored=0
web-1                      : ok=4    changed=2    unreachable=0    failed=0    skipped=0    rescued=0    ignored=0
";

    #[test]
    fn test_from_transcript() {
        let report =
            ToolReport::from_transcript(&Transcript::parse(OUTPUT), &descriptors(), Some(2));

        assert_eq!(report.len(), 5);
        assert_eq!(report.outcome("web-1", "docker"), Some(InstallStatus::Success));
        assert_eq!(report.outcome("web-1", "nginx"), Some(InstallStatus::Success));
        assert_eq!(report.outcome("cache-1", "nginx"), Some(InstallStatus::Success));
        assert_eq!(report.outcome("db-1", "docker"), Some(InstallStatus::Failure));
        // db-1 dropped out after the docker play failed
        assert_eq!(report.outcome("db-1", "nginx"), Some(InstallStatus::Failure));
        assert_eq!(report.exit_code, Some(2));
    }

    #[test]
    fn test_host_missing_from_recap_fails() {
        let output = "PLAY RECAP ****\nweb-1 : ok=2 changed=0 unreachable=0 failed=0\n";
        let report = ToolReport::from_transcript(&Transcript::parse(output), &descriptors(), Some(0));

        assert_eq!(report.outcome("web-1", "docker"), Some(InstallStatus::Success));
        assert_eq!(report.outcome("db-1", "docker"), Some(InstallStatus::Failure));
        assert_eq!(report.outcome("cache-1", "nginx"), Some(InstallStatus::Failure));
    }

    #[test]
    fn test_with_outcome() {
        let report = ToolReport::new(Some(0)).with_outcome("web-1", "docker", InstallStatus::Success);
        assert_eq!(report.outcome("web-1", "docker"), Some(InstallStatus::Success));
        assert_eq!(report.outcome("web-1", "nginx"), None);
    }
}
