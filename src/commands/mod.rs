pub mod catalog;
pub mod init;
pub mod run;
pub mod servers;
pub mod status;

use crate::Context;
use anyhow::{Context as _, Result};
use inventory::SqliteStore;

/// Open the configured inventory store, creating it when missing.
pub fn open_store(ctx: &Context) -> Result<SqliteStore> {
    let path = ctx.config.store_path()?;
    let table = &ctx.config.store.table;
    log::debug!("Opening store {} (table {table})", path.display());
    SqliteStore::open(&path, table)
        .with_context(|| format!("Could not open inventory store {}", path.display()))
}
