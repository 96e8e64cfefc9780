//! Descriptor generation.
//!
//! Turns a [`RunPlan`] into the two artifacts the external tool consumes:
//!
//! - a **target descriptor** (Ansible inventory) with one host per server and
//!   one group per requested software item
//! - a **task descriptor** (playbook) with one play per software item in the
//!   catalog union
//!
//! Generation is a pure data transform. Serialization to YAML is a separate
//! step ([`Descriptors::render`]), so the same structures can be inspected in
//! tests or handed to a different serializer.

use crate::error::Result;
use crate::plan::RunPlan;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection method written for every host.
pub const DEFAULT_CONNECTION: &str = "aws_ssm";

/// Role task file selected per host at execution time.
pub const TASKS_FROM: &str = "{{ os_type }}.yml";

/// Prefix of the inventory group for each software item.
///
/// Keeps groups apart from host names and from the reserved `all` and
/// `ungrouped` groups.
pub const GROUP_PREFIX: &str = "software_";

/// Knobs that shape the generated descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorOptions {
    /// Value of `ansible_connection`
    pub connection: String,
    /// Whether plays escalate privileges
    pub become_root: bool,
}

impl Default for DescriptorOptions {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION.to_string(),
            become_root: true,
        }
    }
}

// ============================================================================
// Target descriptor
// ============================================================================

/// Connection variables for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostVars {
    pub ansible_host: String,
    pub ansible_connection: String,
    pub ansible_aws_ssm_region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansible_aws_ssm_bucket_name: Option<String>,
    pub os_type: String,
}

/// Hosts and per-software groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Host name to connection variables
    pub hosts: BTreeMap<String, HostVars>,
    /// Software name to the hosts that requested it
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl TargetDescriptor {
    /// Whether `host` is a member of the group for `software`.
    pub fn in_group(&self, host: &str, software: &str) -> bool {
        self.groups
            .get(software)
            .is_some_and(|members| members.contains(host))
    }
}

// ============================================================================
// Task descriptor
// ============================================================================

/// Ordered, deduplicated software to install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub software: Vec<String>,
    pub become_root: bool,
}

/// Inventory group holding the hosts that requested `software`.
pub fn group_name(software: &str) -> String {
    format!("{GROUP_PREFIX}{software}")
}

/// Name of the play that installs `software`.
pub fn play_name(software: &str) -> String {
    format!("Install {software}")
}

// ============================================================================
// Descriptors
// ============================================================================

/// Both generated artifacts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub target: TargetDescriptor,
    pub tasks: TaskDescriptor,
}

impl Descriptors {
    /// Build descriptors from a plan.
    pub fn generate(plan: &RunPlan, options: &DescriptorOptions) -> Self {
        let mut target = TargetDescriptor::default();

        for entry in plan.entries() {
            let server = &entry.server;
            target.hosts.insert(
                server.server_name.clone(),
                HostVars {
                    ansible_host: server.instance_id.clone(),
                    ansible_connection: options.connection.clone(),
                    ansible_aws_ssm_region: server.region.clone(),
                    ansible_aws_ssm_bucket_name: server.transport_log_bucket.clone(),
                    os_type: server.os_type.to_string(),
                },
            );
            for software in &entry.software {
                target
                    .groups
                    .entry(software.clone())
                    .or_default()
                    .insert(server.server_name.clone());
            }
        }

        let tasks = TaskDescriptor {
            software: plan.catalog_union().iter().cloned().collect(),
            become_root: options.become_root,
        };

        Self { target, tasks }
    }

    /// Every (host, software) pair addressed by the descriptors.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.target.groups.iter().flat_map(|(software, hosts)| {
            hosts
                .iter()
                .map(move |host| (host.as_str(), software.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.software.is_empty()
    }

    /// Serialize both descriptors to YAML.
    pub fn render(&self) -> Result<Rendered> {
        let inventory = serde_yaml::to_string(&InventoryFile::from(&self.target))?;
        let plays: Vec<Play<'_>> = self
            .tasks
            .software
            .iter()
            .map(|sw| Play::new(sw, self.tasks.become_root))
            .collect();
        let playbook = serde_yaml::to_string(&plays)?;
        Ok(Rendered {
            inventory,
            playbook,
        })
    }
}

/// Serialized descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub inventory: String,
    pub playbook: String,
}

impl Rendered {
    /// Write both files into `dir`, replacing previous versions.
    ///
    /// Returns the inventory and playbook paths.
    pub fn write_to(
        &self,
        dir: &Path,
        inventory_file: &str,
        playbook_file: &str,
    ) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir)?;
        let inventory = dir.join(inventory_file);
        let playbook = dir.join(playbook_file);
        fs::write(&inventory, &self.inventory)?;
        fs::write(&playbook, &self.playbook)?;
        log::debug!(
            "Wrote {} and {}",
            inventory.display(),
            playbook.display()
        );
        Ok((inventory, playbook))
    }
}

// ----------------------------------------------------------------------------
// Serialized shapes
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct InventoryFile<'a> {
    all: AllGroup<'a>,
}

#[derive(Serialize)]
struct AllGroup<'a> {
    hosts: &'a BTreeMap<String, HostVars>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, ChildGroup<'a>>,
}

#[derive(Serialize)]
struct ChildGroup<'a> {
    hosts: BTreeMap<&'a str, NoVars>,
}

#[derive(Serialize)]
struct NoVars {}

impl<'a> From<&'a TargetDescriptor> for InventoryFile<'a> {
    fn from(target: &'a TargetDescriptor) -> Self {
        let children = target
            .groups
            .iter()
            .map(|(software, hosts)| {
                let hosts = hosts.iter().map(|h| (h.as_str(), NoVars {})).collect();
                (group_name(software), ChildGroup { hosts })
            })
            .collect();
        Self {
            all: AllGroup {
                hosts: &target.hosts,
                children,
            },
        }
    }
}

#[derive(Serialize)]
struct Play<'a> {
    name: String,
    hosts: String,
    #[serde(rename = "become")]
    become_root: bool,
    tasks: Vec<RoleTask<'a>>,
}

#[derive(Serialize)]
struct RoleTask<'a> {
    name: String,
    include_role: IncludeRole<'a>,
}

#[derive(Serialize)]
struct IncludeRole<'a> {
    name: &'a str,
    tasks_from: &'static str,
}

impl<'a> Play<'a> {
    fn new(software: &'a str, become_root: bool) -> Self {
        Self {
            name: play_name(software),
            hosts: group_name(software),
            become_root,
            tasks: vec![RoleTask {
                name: play_name(software),
                include_role: IncludeRole {
                    name: software,
                    tasks_from: TASKS_FROM,
                },
            }],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
