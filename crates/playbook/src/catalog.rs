//! Software catalog.
//!
//! The catalog is the closed set of software that can be requested. It is
//! sourced from a roles directory: every `roles/<name>/` with a `tasks/`
//! subdirectory is a software item, and each `tasks/<os>.yml` inside it is an
//! OS-specific variant.

use crate::error::{Error, Result};
use inventory::OsType;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use walkdir::WalkDir;

/// Delimiter between software names in operator input.
pub const SELECTION_DELIMITER: char = ',';

/// The set of installable software items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    /// Build a catalog from role names, with no OS variant information.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|n| (n.into(), BTreeSet::new()))
                .collect(),
        }
    }

    /// Scan a roles directory.
    pub fn discover(roles_dir: &Path) -> Result<Self> {
        if !roles_dir.is_dir() {
            return Err(Error::CatalogNotFound(roles_dir.to_path_buf()));
        }

        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(roles_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let tasks_dir = entry.path().join("tasks");
            if !tasks_dir.is_dir() {
                log::debug!("Skipping {} (no tasks directory)", entry.path().display());
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            let variants = task_variants(&tasks_dir);
            log::debug!("Found role {name} ({} OS variants)", variants.len());
            entries.insert(name, variants);
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Software names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// OS task variants shipped by a role.
    pub fn os_variants(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(name)
    }

    /// Whether a role ships a task file for `os`.
    ///
    /// Catalogs built without variant information support every OS.
    pub fn supports(&self, name: &str, os: OsType) -> bool {
        match self.entries.get(name) {
            Some(variants) => variants.is_empty() || variants.contains(os.as_str()),
            None => false,
        }
    }

    /// Comma-separated list of names, for messages.
    pub fn available(&self) -> String {
        self.names().collect::<Vec<_>>().join(", ")
    }

    /// Parse a free-form selection and check every name against the catalog.
    ///
    /// Names are split on commas, trimmed and lowercased; duplicates collapse.
    pub fn parse_selection(&self, server_name: &str, raw: &str) -> Result<BTreeSet<String>> {
        self.validate(server_name, split_selection(raw))
    }

    /// Check already-split names against the catalog.
    pub fn validate<I>(&self, server_name: &str, names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut selected = BTreeSet::new();
        let mut unknown = Vec::new();

        for name in names {
            if self.contains(&name) {
                selected.insert(name);
            } else if !unknown.contains(&name) {
                unknown.push(name);
            }
        }

        if !unknown.is_empty() {
            return Err(Error::UnknownSoftware {
                server_name: server_name.to_string(),
                names: unknown,
                available: self.available(),
            });
        }
        Ok(selected)
    }
}

/// Split operator input into normalized software names.
pub fn split_selection(raw: &str) -> Vec<String> {
    raw.split(SELECTION_DELIMITER)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn task_variants(tasks_dir: &Path) -> BTreeSet<String> {
    WalkDir::new(tasks_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.strip_suffix(".yml").map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        Catalog::from_names(["docker", "grafana", "nginx"])
    }

    fn role(root: &Path, name: &str, variants: &[&str]) {
        let tasks = root.join(name).join("tasks");
        fs::create_dir_all(&tasks).unwrap();
        for os in variants {
            fs::write(tasks.join(format!("{os}.yml")), "---\n").unwrap();
        }
    }

    #[test]
    fn test_split_selection() {
        assert_eq!(
            split_selection(" Docker, nginx ,,  "),
            vec!["docker".to_string(), "nginx".to_string()]
        );
        assert!(split_selection("").is_empty());
    }

    #[test]
    fn test_parse_selection_dedups() {
        let selected = catalog()
            .parse_selection("web-1", "nginx, docker, NGINX")
            .unwrap();
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec!["docker", "nginx"]);
    }

    #[test]
    fn test_parse_selection_rejects_unknown() {
        let err = catalog()
            .parse_selection("web-1", "dockerr, nginx, dockerr")
            .unwrap_err();
        match err {
            Error::UnknownSoftware { names, available, .. } => {
                assert_eq!(names, vec!["dockerr"]);
                assert_eq!(available, "docker, grafana, nginx");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_discover_roles() {
        let tmp = TempDir::new().unwrap();
        role(tmp.path(), "nginx", &["ubuntu", "centos"]);
        role(tmp.path(), "docker", &["ubuntu"]);
        fs::create_dir_all(tmp.path().join("notes")).unwrap();
        fs::write(tmp.path().join("README.md"), "roles").unwrap();

        let catalog = Catalog::discover(tmp.path()).unwrap();

        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["docker", "nginx"]);
        assert!(catalog.supports("nginx", OsType::Centos));
        assert!(!catalog.supports("docker", OsType::Centos));
        assert!(!catalog.supports("redis", OsType::Ubuntu));
    }

    #[test]
    fn test_discover_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = Catalog::discover(&tmp.path().join("roles")).unwrap_err();
        assert!(matches!(err, Error::CatalogNotFound(_)));
    }

    #[test]
    fn test_catalog_without_variants_supports_all() {
        assert!(catalog().supports("docker", OsType::Amazonlinux2023));
    }
}
