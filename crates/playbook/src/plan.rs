//! Run plan construction.
//!
//! A [`RunPlan`] maps each reconciled server to the set of software it should
//! receive. Entries are unique per instance id and keep the order in which
//! servers were first added; a server added twice gets the union of both
//! selections.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use inventory::ServerRecord;
use std::collections::BTreeSet;

/// One server and the software requested for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub server: ServerRecord,
    pub software: BTreeSet<String>,
}

/// Servers mapped to requested software for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    entries: Vec<PlanEntry>,
    union: BTreeSet<String>,
}

impl RunPlan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Distinct software requested anywhere in the plan.
    pub fn catalog_union(&self) -> &BTreeSet<String> {
        &self.union
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (server, software) pairs.
    pub fn pair_count(&self) -> usize {
        self.entries.iter().map(|e| e.software.len()).sum()
    }

    /// Every (server, software) pair, in plan order.
    pub fn pairs(&self) -> impl Iterator<Item = (&ServerRecord, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.software.iter().map(move |sw| (&e.server, sw.as_str())))
    }
}

/// Incrementally builds a [`RunPlan`] against a catalog.
#[derive(Debug)]
pub struct RunPlanBuilder<'a> {
    catalog: &'a Catalog,
    entries: Vec<PlanEntry>,
}

impl<'a> RunPlanBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            entries: Vec::new(),
        }
    }

    /// Add a server with a raw, comma-separated selection.
    pub fn add(&mut self, server: &ServerRecord, raw: &str) -> Result<&mut Self> {
        let selection = self.catalog.parse_selection(&server.server_name, raw)?;
        self.add_selection(server, selection)
    }

    /// Add a server with an already parsed selection.
    ///
    /// Names are checked against the catalog again so no plan can reference
    /// a role that does not exist.
    pub fn add_selection(
        &mut self,
        server: &ServerRecord,
        selection: BTreeSet<String>,
    ) -> Result<&mut Self> {
        let selection = self.catalog.validate(&server.server_name, selection)?;

        for software in &selection {
            if !self.catalog.supports(software, server.os_type) {
                log::warn!(
                    "Role {software} has no task file for {} (needed by {})",
                    server.os_type,
                    server.server_name
                );
            }
        }

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.server.instance_id == server.instance_id)
        {
            log::debug!("Merging selection for {}", server.server_name);
            entry.software.extend(selection);
            return Ok(self);
        }

        if let Some(other) = self
            .entries
            .iter()
            .find(|e| e.server.server_name == server.server_name)
        {
            return Err(Error::DuplicateServerName {
                server_name: server.server_name.clone(),
                first: other.server.instance_id.clone(),
                second: server.instance_id.clone(),
            });
        }

        self.entries.push(PlanEntry {
            server: server.clone(),
            software: selection,
        });
        Ok(self)
    }

    /// Finish the plan. Servers with nothing selected are dropped.
    pub fn build(self) -> RunPlan {
        let entries: Vec<PlanEntry> = self
            .entries
            .into_iter()
            .filter(|e| {
                if e.software.is_empty() {
                    log::debug!("Dropping {} from plan (nothing selected)", e.server.server_name);
                }
                !e.software.is_empty()
            })
            .collect();

        let union = entries
            .iter()
            .flat_map(|e| e.software.iter().cloned())
            .collect();

        RunPlan { entries, union }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::OsType;

    fn catalog() -> Catalog {
        Catalog::from_names(["docker", "grafana", "nginx"])
    }

    fn server(id: &str, name: &str) -> ServerRecord {
        ServerRecord {
            instance_id: id.into(),
            server_name: name.into(),
            region: "ap-south-1".into(),
            os_type: OsType::Ubuntu,
            transport_log_bucket: None,
        }
    }

    #[test]
    fn test_plan_union_and_pairs() {
        let catalog = catalog();
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "web-1"), "docker, nginx").unwrap();
        builder.add(&server("i-2", "web-2"), "nginx").unwrap();
        let plan = builder.build();

        assert_eq!(plan.entries().len(), 2);
        assert_eq!(plan.pair_count(), 3);
        assert_eq!(
            plan.catalog_union().iter().collect::<Vec<_>>(),
            vec!["docker", "nginx"]
        );
        let pairs: Vec<_> = plan.pairs().map(|(s, sw)| (s.server_name.as_str(), sw)).collect();
        assert_eq!(
            pairs,
            vec![("web-1", "docker"), ("web-1", "nginx"), ("web-2", "nginx")]
        );
    }

    #[test]
    fn test_same_server_twice_collapses() {
        let catalog = catalog();
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "web-1"), "docker").unwrap();
        builder.add(&server("i-1", "web-1"), "nginx, docker").unwrap();
        let plan = builder.build();

        assert_eq!(plan.entries().len(), 1);
        assert_eq!(plan.entries()[0].software.len(), 2);
    }

    #[test]
    fn test_unknown_software_fails() {
        let catalog = catalog();
        let mut builder = RunPlanBuilder::new(&catalog);
        let err = builder.add(&server("i-1", "web-1"), "dockerr").unwrap_err();
        assert!(matches!(err, Error::UnknownSoftware { .. }));
    }

    #[test]
    fn test_duplicate_name_different_instance() {
        let catalog = catalog();
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "app"), "docker").unwrap();
        let err = builder.add(&server("i-2", "app"), "nginx").unwrap_err();
        assert!(matches!(err, Error::DuplicateServerName { .. }));
    }

    #[test]
    fn test_empty_selection_dropped() {
        let catalog = catalog();
        let mut builder = RunPlanBuilder::new(&catalog);
        builder.add(&server("i-1", "web-1"), " , ").unwrap();
        builder.add(&server("i-2", "web-2"), "grafana").unwrap();
        let plan = builder.build();

        assert_eq!(plan.entries().len(), 1);
        assert_eq!(plan.entries()[0].server.server_name, "web-2");
    }

    #[test]
    fn test_empty_builder_gives_empty_plan() {
        let catalog = catalog();
        let plan = RunPlanBuilder::new(&catalog).build();
        assert!(plan.is_empty());
        assert_eq!(plan.pair_count(), 0);
    }
}
