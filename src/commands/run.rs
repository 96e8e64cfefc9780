use anyhow::{Context as _, Result};
use colored::Colorize;
use dialoguer::Confirm;
use inventory::{RecordStore, Reconciliation, Resolution};
use playbook::{
    Catalog, Descriptors, ExternalTool, PreparedRun, RunReport, ToolError, ToolReport,
};

use crate::Context;
use crate::cli::RunArgs;
use crate::commands::open_store;
use crate::progress;
use crate::prompt;
use crate::request;
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let store = open_store(ctx)?;
    let roles_dir = ctx.config.roles_dir();
    let catalog = Catalog::discover(&roles_dir)
        .with_context(|| format!("Could not read software catalog from {}", roles_dir.display()))?;
    if catalog.is_empty() {
        anyhow::bail!("No roles found in {}", roles_dir.display());
    }
    log::info!("Catalog: {}", catalog.available());

    let request = match &args.from {
        Some(path) => request::load(path)?,
        None => {
            let stored = store.list_servers().context("Could not list servers")?;
            prompt::collect_request(&stored, &catalog)?
        }
    };

    let prepared = playbook::prepare(&store, &catalog, &request, &ctx.config.descriptor_options())
        .context("Run aborted")?;

    print_plan(&prepared);

    let tool = ctx.config.ansible_tool();
    if ctx.verbose > 0 {
        ui::kv("Command", &tool.command_line());
    }
    if !prepared.plan.is_empty() && !args.yes {
        let proceed = Confirm::new()
            .with_prompt(format!("Run {}?", tool.command_line()))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            ui::info("Aborted before running Ansible. Servers registered above are kept.");
            return Ok(());
        }
    }

    let spinning = Spinning {
        inner: &tool,
        label: tool.command_line(),
        quiet: ctx.quiet,
    };
    let report = prepared.execute(&store, &spinning);
    if report.invoked {
        ui::dim(&format!(
            "Descriptors written to {}",
            ctx.config.work_dir().display()
        ));
    }

    print_summary(&report);
    ui::kv(
        "Inventory",
        &format!(
            "{} (table {})",
            ctx.config.store_path()?.display(),
            store.table()
        ),
    );

    if !report.is_success() {
        anyhow::bail!("Run finished with errors");
    }
    Ok(())
}

/// Shows a spinner while the wrapped tool runs.
struct Spinning<'a, T: ExternalTool> {
    inner: &'a T,
    label: String,
    quiet: bool,
}

impl<T: ExternalTool> ExternalTool for Spinning<'_, T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn execute(&self, descriptors: &Descriptors) -> Result<ToolReport, ToolError> {
        let pb = progress::spinner(&format!("Running {}", self.label), self.quiet);
        let result = self.inner.execute(descriptors);
        match &result {
            Ok(report) => progress::finish_success(
                &pb,
                &format!("{} finished (exit {})", self.name(), exit_text(report.exit_code)),
            ),
            Err(_) => progress::finish_error(&pb, &format!("{} failed", self.name())),
        }
        result
    }
}

fn exit_text(code: Option<i32>) -> String {
    code.map_or_else(|| "-".to_string(), |c| c.to_string())
}

// ============================================================================
// Output
// ============================================================================

fn print_plan(prepared: &PreparedRun) {
    print_rejections(&prepared.reconciliation);

    if prepared.plan.is_empty() {
        ui::warn("No servers left to run against.");
        return;
    }

    ui::section(&format!(
        "Plan ({})",
        ui::count(prepared.plan.entries().len(), "server")
    ));
    for entry in prepared.plan.entries() {
        let server = &entry.server;
        let resolution = resolution_of(&prepared.reconciliation, &server.instance_id);
        println!(
            "  {} ({}, {}) {}",
            server.server_name.bold(),
            resolution,
            server.instance_id,
            entry
                .software
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
                .cyan()
        );
    }
    ui::kv("Roles", &prepared.descriptors.tasks.software.join(", "));
}

fn print_rejections(reconciliation: &Reconciliation) {
    if reconciliation.rejected.is_empty() {
        return;
    }
    ui::section("Skipped servers");
    for rejection in &reconciliation.rejected {
        ui::warn(&format!(
            "server {} '{}' ({}): {}",
            rejection.slot + 1,
            rejection.server_name,
            rejection.error.kind().label(),
            rejection.error
        ));
    }
}

fn resolution_of(reconciliation: &Reconciliation, instance_id: &str) -> String {
    let mut kinds: Vec<Resolution> = reconciliation
        .servers
        .iter()
        .filter(|s| s.record.instance_id == instance_id)
        .map(|s| s.resolution)
        .collect();
    kinds.dedup();
    if kinds.contains(&Resolution::Created) {
        Resolution::Created.to_string()
    } else {
        Resolution::Resolved.to_string()
    }
}

fn print_summary(report: &RunReport) {
    ui::header("Summary");

    for entry in report.plan.entries() {
        let server = &entry.server;
        println!(
            "  {} ({}): {}",
            server.server_name.bold(),
            resolution_of(&report.reconciliation, &server.instance_id),
            server.instance_id
        );
        for result in report.summary.for_server(&server.instance_id) {
            println!("    {} {}", ui::status_mark(result.status), result.software);
        }
    }

    println!();
    ui::kv("Servers processed", &report.servers_processed().to_string());
    ui::kv(
        "Installs",
        &format!(
            "{} succeeded, {} failed",
            report.summary.succeeded().to_string().green(),
            failed_text(report.summary.failed())
        ),
    );
    if !report.reconciliation.rejected.is_empty() {
        ui::kv(
            "Skipped servers",
            &report.reconciliation.rejected.len().to_string().yellow().to_string(),
        );
    }

    match (&report.tool_error, report.invoked) {
        (Some(err), _) => {
            ui::kv("Ansible", &"could not determine outcomes".red().to_string());
            ui::error(&err.to_string());
        }
        (None, true) => {
            let exit = report
                .tool_report
                .as_ref()
                .map_or_else(|| "-".to_string(), |r| exit_text(r.exit_code));
            ui::kv("Ansible", &format!("completed (exit {exit})"));
        }
        (None, false) => ui::kv("Ansible", &"not run".dimmed().to_string()),
    }

    if !report.summary.write_errors.is_empty() {
        ui::kv(
            "Store write errors",
            &report.summary.write_errors.len().to_string().red().to_string(),
        );
        for failure in &report.summary.write_errors {
            ui::error(&format!(
                "{} / {} ({}): {}",
                failure.server_name, failure.software, failure.instance_id, failure.error
            ));
        }
    }
}

fn failed_text(failed: usize) -> String {
    if failed > 0 {
        failed.to_string().red().to_string()
    } else {
        failed.to_string().dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::{OsType, ReconciledServer, ServerRecord};

    fn reconciled(id: &str, resolution: Resolution) -> ReconciledServer {
        ReconciledServer {
            slot: 0,
            record: ServerRecord {
                instance_id: id.into(),
                server_name: "web-1".into(),
                region: "ap-south-1".into(),
                os_type: OsType::Ubuntu,
                transport_log_bucket: None,
            },
            resolution,
        }
    }

    #[test]
    fn test_resolution_prefers_created() {
        let reconciliation = Reconciliation {
            servers: vec![
                reconciled("i-1", Resolution::Created),
                reconciled("i-1", Resolution::Resolved),
                reconciled("i-2", Resolution::Resolved),
            ],
            rejected: Vec::new(),
        };
        assert_eq!(resolution_of(&reconciliation, "i-1"), "new");
        assert_eq!(resolution_of(&reconciliation, "i-2"), "existing");
    }

    #[test]
    fn test_exit_text() {
        assert_eq!(exit_text(Some(2)), "2");
        assert_eq!(exit_text(None), "-");
    }
}
