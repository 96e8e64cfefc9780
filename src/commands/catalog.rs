use anyhow::{Context as _, Result};
use colored::Colorize;
use playbook::Catalog;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let roles_dir = ctx.config.roles_dir();
    let catalog = Catalog::discover(&roles_dir)
        .with_context(|| format!("Could not read software catalog from {}", roles_dir.display()))?;

    if catalog.is_empty() {
        ui::warn(&format!("No roles with a tasks/ directory in {}", roles_dir.display()));
        return Ok(());
    }

    ui::header(&format!("Software Catalog ({})", catalog.len()));
    ui::kv("Roles", &roles_dir.display().to_string());
    println!();

    for name in catalog.names() {
        let variants = catalog
            .os_variants(name)
            .map(|v| v.iter().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        if variants.is_empty() {
            println!("  {} {}", name.bold(), "(no task files)".yellow());
        } else {
            println!("  {} {}", name.bold(), variants.dimmed());
        }
    }
    Ok(())
}
