//! # playbook
//!
//! Plans and executes software installs across an inventory of servers.
//!
//! This crate provides:
//! - [`Catalog`]: the installable software, discovered from a roles directory
//! - [`RunPlanBuilder`]: validated server-to-software plans
//! - [`Descriptors`]: generated Ansible inventory and playbook
//! - [`ExternalTool`] with the [`AnsibleTool`] implementation
//! - [`record_outcomes`]: per-pair status write-back
//! - [`prepare`] / [`PreparedRun::execute`]: the whole pipeline
//!
//! ## Example
//!
//! ```no_run
//! use inventory::{SlotRequest, SqliteStore};
//! use playbook::{AnsibleTool, Catalog, DescriptorOptions, RunRequest, prepare};
//! use std::path::Path;
//!
//! let store = SqliteStore::open(Path::new("inventory.db"), "ansible-inventory")?;
//! let catalog = Catalog::discover(Path::new("roles"))?;
//!
//! let mut request = RunRequest::default();
//! request.push(
//!     SlotRequest::Existing { server_name: "db-1".into() },
//!     "grafana",
//! );
//!
//! let prepared = prepare(&store, &catalog, &request, &DescriptorOptions::default())?;
//! let report = prepared.execute(&store, &AnsibleTool::new("."));
//! println!("{} succeeded, {} failed", report.summary.succeeded(), report.summary.failed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ansible;
pub mod catalog;
pub mod descriptor;
mod error;
pub mod plan;
pub mod recap;
pub mod recorder;
pub mod run;
pub mod tool;

pub use ansible::AnsibleTool;
pub use catalog::Catalog;
pub use descriptor::{DescriptorOptions, Descriptors, Rendered};
pub use error::{Error, Result, ToolError};
pub use plan::{PlanEntry, RunPlan, RunPlanBuilder};
pub use recorder::{PairResult, RecordSummary, StatusWriteError, record_outcomes};
pub use run::{PreparedRun, RunReport, RunRequest, ServerRequest, prepare, run};
pub use tool::{ExternalTool, ToolReport};
