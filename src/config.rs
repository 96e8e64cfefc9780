//! fleetbook configuration (`<config_dir>/config.toml`).
//!
//! The file is optional. Missing sections and keys fall back to defaults that
//! match running `ansible-playbook` from a directory containing `roles/`.

use crate::paths;
use anyhow::{Context, Result};
use playbook::{AnsibleTool, DescriptorOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Database file name inside the state directory
pub const DEFAULT_DB_FILE: &str = "inventory.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub ansible: AnsibleConfig,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file; defaults to `<state_dir>/inventory.db`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: inventory::DEFAULT_TABLE.to_string(),
        }
    }
}

// ============================================================================
// Ansible
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnsibleConfig {
    pub command: String,
    /// Relative paths resolve against `work_dir`
    pub roles_dir: String,
    pub work_dir: String,
    pub connection: String,
    #[serde(rename = "become")]
    pub become_root: bool,
    pub inventory_file: String,
    pub playbook_file: String,
}

impl Default for AnsibleConfig {
    fn default() -> Self {
        Self {
            command: playbook::ansible::DEFAULT_COMMAND.to_string(),
            roles_dir: "roles".to_string(),
            work_dir: ".".to_string(),
            connection: playbook::descriptor::DEFAULT_CONNECTION.to_string(),
            become_root: true,
            inventory_file: "inventory.yml".to_string(),
            playbook_file: "main.yml".to_string(),
        }
    }
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store: Option<PathBuf>,
    pub roles_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
}

impl Config {
    /// Path of the config file
    pub fn path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load the config file, or defaults when it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Could not serialize config")?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(store) = &overrides.store {
            self.store.path = Some(store.display().to_string());
        }
        if let Some(roles) = &overrides.roles_dir {
            self.ansible.roles_dir = roles.display().to_string();
        }
        if let Some(work) = &overrides.work_dir {
            self.ansible.work_dir = work.display().to_string();
        }
    }

    /// Resolved database file
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(paths::expand(path)),
            None => Ok(paths::state_dir()?.join(DEFAULT_DB_FILE)),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        paths::expand(&self.ansible.work_dir)
    }

    /// Resolved roles directory
    pub fn roles_dir(&self) -> PathBuf {
        let roles = paths::expand(&self.ansible.roles_dir);
        if roles.is_absolute() {
            roles
        } else {
            self.work_dir().join(roles)
        }
    }

    pub fn descriptor_options(&self) -> DescriptorOptions {
        DescriptorOptions {
            connection: self.ansible.connection.clone(),
            become_root: self.ansible.become_root,
        }
    }

    pub fn ansible_tool(&self) -> AnsibleTool {
        AnsibleTool::new(self.work_dir())
            .with_command(&self.ansible.command)
            .with_roles_dir(self.roles_dir())
            .with_files(&self.ansible.inventory_file, &self.ansible.playbook_file)
    }
}

// ============================================================================
// Tests
// ============================================================================
