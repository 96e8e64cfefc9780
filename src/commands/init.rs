use anyhow::{Context as _, Result};

use crate::Context;
use crate::commands::open_store;
use crate::config::Config;
use crate::ui;

/// Create the store (and its table) plus a config file with defaults.
pub fn run(ctx: &Context) -> Result<()> {
    ui::header("fleetbook init");

    let config_path = Config::path()?;
    if config_path.exists() {
        ui::info(&format!("Config already exists: {}", config_path.display()));
    } else {
        ctx.config.save_to(&config_path)?;
        ui::success(&format!("Wrote {}", config_path.display()));
    }

    let store = open_store(ctx)?;
    let (servers, statuses) = store.counts().context("Could not read store")?;
    ui::success(&format!(
        "Inventory ready: {} (table {})",
        ctx.config.store_path()?.display(),
        store.table()
    ));
    ui::kv("Servers", &servers.to_string());
    ui::kv("Install records", &statuses.to_string());

    let roles_dir = ctx.config.roles_dir();
    if !roles_dir.is_dir() {
        ui::warn(&format!(
            "Roles directory {} does not exist yet",
            roles_dir.display()
        ));
    }
    Ok(())
}
