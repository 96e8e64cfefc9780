//! Interactive collection of a run request.

use crate::ui;
use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{Input, Select};
use inventory::{NewServer, OsType, ServerRecord, SlotRequest};
use playbook::catalog::split_selection;
use playbook::{Catalog, RunRequest};
use std::collections::BTreeMap;

const SLOT_KINDS: [&str; 2] = ["new", "existing"];

/// Upper bound on servers declared in one interactive run.
const MAX_SERVERS: usize = 200;

/// Ask for servers, then for the software to install on each.
///
/// `stored` holds the servers in the store when the run started. Servers
/// declared as new earlier in the same session can also be picked as
/// existing. An existing server without a session log bucket gets asked for
/// one that applies to this run only.
pub fn collect_request(stored: &[ServerRecord], catalog: &Catalog) -> Result<RunRequest> {
    ui::section("Servers");

    let count: usize = Input::new()
        .with_prompt("Number of target servers")
        .validate_with(|n: &usize| validate_count(*n))
        .interact_text()
        .context("Failed to read server count")?;

    let stored_names: Vec<String> = stored.iter().map(|s| s.server_name.clone()).collect();
    let mut buckets = bucket_presence(stored);
    let mut slots = Vec::new();
    let mut declared: Vec<String> = Vec::new();

    for index in 0..count {
        println!();
        println!("{}", format!("Server {}", index + 1).bold());
        let slot = loop {
            let kind = Select::new()
                .with_prompt("New or existing server?")
                .items(&SLOT_KINDS)
                .default(0)
                .interact()
                .context("Failed to read server kind")?;

            if kind == 0 {
                break ask_new_server()?;
            }

            let choices = existing_choices(&stored_names, &declared);
            if choices.is_empty() {
                ui::warn("No existing servers in the inventory. Add this one as new.");
                continue;
            }
            break ask_existing_server(&choices)?;
        };
        if let SlotRequest::New(server) = &slot {
            buckets.insert(
                server.server_name.clone(),
                has_bucket(server.transport_log_bucket.as_deref()),
            );
        }
        declared.push(slot.server_name().to_string());
        slots.push(slot);
    }

    ui::section("Software");
    ui::kv("Available", &catalog.available());

    let mut request = RunRequest::default();
    for slot in slots {
        let software: String = Input::new()
            .with_prompt(format!("Software for {} (comma-separated)", slot.server_name()))
            .allow_empty(true)
            .interact_text()
            .context("Failed to read software selection")?;

        let session_bucket = match &slot {
            SlotRequest::Existing { server_name }
                if !split_selection(&software).is_empty()
                    && !buckets.get(server_name).copied().unwrap_or(false) =>
            {
                ask_session_bucket(server_name)?
            }
            _ => None,
        };
        request.push(slot, software).session_bucket = session_bucket;
    }

    Ok(request)
}

fn ask_new_server() -> Result<SlotRequest> {
    let server_name = ask_token("Server name")?;
    let instance_id = ask_token("Instance ID")?;
    let region = ask_token("Region")?;

    let os_names: Vec<&str> = OsType::ALL.iter().map(OsType::as_str).collect();
    let os_index = Select::new()
        .with_prompt("OS type")
        .items(&os_names)
        .default(0)
        .interact()
        .context("Failed to read OS type")?;

    let bucket: String = Input::new()
        .with_prompt("Session log bucket (empty for none)")
        .allow_empty(true)
        .interact_text()
        .context("Failed to read bucket name")?;

    Ok(SlotRequest::New(NewServer {
        server_name,
        instance_id,
        region,
        os_type: os_names[os_index].to_string(),
        transport_log_bucket: Some(bucket),
    }))
}

fn ask_existing_server(choices: &[String]) -> Result<SlotRequest> {
    let index = Select::new()
        .with_prompt("Existing server")
        .items(choices)
        .default(0)
        .interact()
        .context("Failed to read server selection")?;
    Ok(SlotRequest::Existing {
        server_name: choices[index].clone(),
    })
}

fn ask_session_bucket(server_name: &str) -> Result<Option<String>> {
    let bucket: String = Input::new()
        .with_prompt(format!(
            "Session log bucket for {server_name}, this run only (empty for none)"
        ))
        .allow_empty(true)
        .interact_text()
        .context("Failed to read bucket name")?;
    let bucket = bucket.trim();
    Ok((!bucket.is_empty()).then(|| bucket.to_string()))
}

/// Whether every stored server with a given name has a session log bucket.
fn bucket_presence(stored: &[ServerRecord]) -> BTreeMap<String, bool> {
    let mut presence: BTreeMap<String, bool> = BTreeMap::new();
    for server in stored {
        let has = has_bucket(server.transport_log_bucket.as_deref());
        presence
            .entry(server.server_name.clone())
            .and_modify(|all| *all &= has)
            .or_insert(has);
    }
    presence
}

fn has_bucket(bucket: Option<&str>) -> bool {
    bucket.is_some_and(|b| !b.trim().is_empty())
}

fn validate_count(n: usize) -> Result<(), String> {
    if n == 0 {
        Err("Enter a positive number".to_string())
    } else if n > MAX_SERVERS {
        Err(format!("At most {MAX_SERVERS} servers per run"))
    } else {
        Ok(())
    }
}

/// Ask for a non-empty value without whitespace.
fn ask_token(prompt: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(prompt)
        .validate_with(|value: &String| validate_token(value))
        .interact_text()
        .with_context(|| format!("Failed to read {}", prompt.to_lowercase()))
        .map(|value| value.trim().to_string())
}

fn validate_token(value: &str) -> Result<(), &'static str> {
    let value = value.trim();
    if value.is_empty() {
        Err("Must not be empty")
    } else if value.chars().any(char::is_whitespace) {
        Err("Must not contain spaces")
    } else {
        Ok(())
    }
}

/// Sorted, deduplicated names selectable as existing servers.
fn existing_choices(stored: &[String], declared: &[String]) -> Vec<String> {
    let mut names: Vec<String> = stored.iter().chain(declared).cloned().collect();
    names.sort();
    names.dedup();
    names
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_choices_include_declared() {
        let stored = vec!["db-1".to_string(), "app".to_string()];
        let declared = vec!["web-1".to_string(), "db-1".to_string()];
        assert_eq!(existing_choices(&stored, &declared), vec!["app", "db-1", "web-1"]);
        assert!(existing_choices(&[], &[]).is_empty());
    }

    #[test]
    fn test_bucket_presence() {
        let server = |id: &str, name: &str, bucket: Option<&str>| ServerRecord {
            instance_id: id.into(),
            server_name: name.into(),
            region: "ap-south-1".into(),
            os_type: OsType::Ubuntu,
            transport_log_bucket: bucket.map(str::to_string),
        };
        let stored = [
            server("i-1", "web-1", Some("ssm-logs")),
            server("i-2", "db-1", None),
            server("i-3", "app", Some("ssm-logs")),
            server("i-4", "app", None),
        ];

        let presence = bucket_presence(&stored);
        assert_eq!(presence.get("web-1"), Some(&true));
        assert_eq!(presence.get("db-1"), Some(&false));
        assert_eq!(presence.get("app"), Some(&false));
        assert!(!has_bucket(Some("  ")));
    }

    #[test]
    fn test_validate_count() {
        assert!(validate_count(0).is_err());
        assert!(validate_count(1).is_ok());
        assert!(validate_count(MAX_SERVERS).is_ok());
        assert!(validate_count(99_999_999_999).is_err());
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token(" i-0abc ").is_ok());
        assert!(validate_token("   ").is_err());
        assert!(validate_token("web 1").is_err());
    }
}
