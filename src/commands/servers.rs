use anyhow::{Context as _, Result};
use colored::Colorize;
use inventory::{RecordStore, ServerRecord};

use crate::Context;
use crate::commands::open_store;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let store = open_store(ctx)?;
    let mut servers = store.list_servers().context("Could not list servers")?;
    sort_servers(&mut servers);

    if servers.is_empty() {
        ui::info("No servers in the inventory yet. Add one with 'fleetbook run'.");
        return Ok(());
    }

    ui::header(&format!("Servers ({})", servers.len()));
    let width = servers
        .iter()
        .map(|s| s.server_name.chars().count())
        .max()
        .unwrap_or(0);

    for server in &servers {
        let bucket = server
            .transport_log_bucket
            .as_deref()
            .map(|b| format!(" logs: {b}"))
            .unwrap_or_default();
        println!(
            "  {}  {}  {} {}{}",
            format!("{:<width$}", server.server_name).bold(),
            server.instance_id,
            server.region.dimmed(),
            server.os_type.to_string().cyan(),
            bucket.dimmed(),
        );
    }
    Ok(())
}

/// Order by name, then instance id for legacy duplicate names.
fn sort_servers(servers: &mut [ServerRecord]) {
    servers.sort_by(|a, b| {
        a.server_name
            .cmp(&b.server_name)
            .then_with(|| a.instance_id.cmp(&b.instance_id))
    });
}
