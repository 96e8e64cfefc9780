use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use inventory::{InstallStatus, InstallStatusRecord, RecordStore, ServerRecord};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::StatusArgs;
use crate::commands::open_store;
use crate::ui;

/// One install outcome joined with its server, if the server still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct StatusRow {
    server_name: Option<String>,
    instance_id: String,
    software_name: String,
    status: InstallStatus,
    installed_at: DateTime<Utc>,
}

pub fn run(ctx: &Context, args: StatusArgs) -> Result<()> {
    let store = open_store(ctx)?;
    let servers = store.list_servers().context("Could not list servers")?;
    let statuses = store
        .list_statuses()
        .context("Could not list install statuses")?;

    let rows = build_rows(&servers, statuses, args.server.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        ui::info("No install outcomes recorded yet.");
        return Ok(());
    }

    ui::header("Install Status");
    let mut current: Option<&str> = None;
    for row in &rows {
        if current != Some(row.instance_id.as_str()) {
            current = Some(row.instance_id.as_str());
            let title = match &row.server_name {
                Some(name) => format!("{name} ({})", row.instance_id),
                None => format!("{} ({})", row.instance_id, "unregistered".yellow()),
            };
            ui::section(&title);
        }
        println!(
            "  {} {:<20} {}",
            ui::status_mark(row.status),
            row.software_name,
            row.installed_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed()
        );
    }

    let failed = rows.iter().filter(|r| !r.status.is_success()).count();
    println!();
    ui::kv(
        "Total",
        &format!(
            "{}, {} failed",
            ui::count(rows.len(), "record"),
            if failed > 0 {
                failed.to_string().red()
            } else {
                failed.to_string().dimmed()
            }
        ),
    );
    Ok(())
}

/// Join statuses to servers, optionally keeping only one server name.
///
/// Statuses whose server record is gone are kept with no name.
fn build_rows(
    servers: &[ServerRecord],
    statuses: Vec<InstallStatusRecord>,
    server: Option<&str>,
) -> Result<Vec<StatusRow>> {
    let names: BTreeMap<&str, &str> = servers
        .iter()
        .map(|s| (s.instance_id.as_str(), s.server_name.as_str()))
        .collect();

    let wanted: Option<Vec<&str>> = match server {
        Some(name) => {
            let ids: Vec<&str> = servers
                .iter()
                .filter(|s| s.server_name == name)
                .map(|s| s.instance_id.as_str())
                .collect();
            if ids.is_empty() {
                anyhow::bail!("No server named '{name}' in the inventory");
            }
            Some(ids)
        }
        None => None,
    };

    let mut rows: Vec<StatusRow> = statuses
        .into_iter()
        .filter(|s| {
            wanted
                .as_ref()
                .is_none_or(|ids| ids.contains(&s.instance_id.as_str()))
        })
        .map(|s| StatusRow {
            server_name: names.get(s.instance_id.as_str()).map(|n| (*n).to_string()),
            instance_id: s.instance_id,
            software_name: s.software_name,
            status: s.status,
            installed_at: s.installed_at,
        })
        .collect();

    rows.sort_by(|a, b| {
        let a_key = (a.server_name.is_none(), a.server_name.as_deref(), &a.instance_id);
        let b_key = (b.server_name.is_none(), b.server_name.as_deref(), &b.instance_id);
        a_key
            .cmp(&b_key)
            .then_with(|| a.software_name.cmp(&b.software_name))
    });
    Ok(rows)
}
