//! Run requests read from a TOML file (`fleetbook run --from`).
//!
//! ```toml
//! [[server]]
//! kind = "new"
//! server_name = "web-1"
//! instance_id = "i-0123456789abcdef0"
//! region = "ap-south-1"
//! os_type = "ubuntu"
//! transport_log_bucket = "ssm-session-logs"
//! software = ["docker", "nginx"]
//!
//! [[server]]
//! kind = "existing"
//! server_name = "db-1"
//! software = "grafana"
//! ```
//!
//! On an `existing` entry, `transport_log_bucket` applies to this run only
//! and only when the stored server has no bucket.

use anyhow::{Context, Result};
use inventory::{NewServer, SlotRequest};
use playbook::{RunRequest, ServerRequest};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestFile {
    #[serde(rename = "server", default)]
    servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SlotKind {
    New,
    Existing,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerEntry {
    kind: SlotKind,
    server_name: String,
    #[serde(default)]
    instance_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    os_type: Option<String>,
    #[serde(default)]
    transport_log_bucket: Option<String>,
    #[serde(default)]
    software: Software,
}

/// Either `"docker, nginx"` or `["docker", "nginx"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Software {
    Joined(String),
    List(Vec<String>),
}

impl Default for Software {
    fn default() -> Self {
        Self::Joined(String::new())
    }
}

impl Software {
    fn into_raw(self) -> String {
        match self {
            Self::Joined(raw) => raw,
            Self::List(names) => names.join(","),
        }
    }
}

impl ServerEntry {
    fn into_request(self) -> ServerRequest {
        let mut session_bucket = None;
        let slot = match self.kind {
            SlotKind::New => SlotRequest::New(NewServer {
                server_name: self.server_name,
                instance_id: self.instance_id.unwrap_or_default(),
                region: self.region.unwrap_or_default(),
                os_type: self.os_type.unwrap_or_default(),
                transport_log_bucket: self.transport_log_bucket,
            }),
            SlotKind::Existing => {
                session_bucket = self.transport_log_bucket;
                if self.instance_id.is_some() || self.region.is_some() || self.os_type.is_some() {
                    log::warn!(
                        "Ignoring server fields for existing server '{}'",
                        self.server_name
                    );
                }
                SlotRequest::Existing {
                    server_name: self.server_name,
                }
            }
        };
        ServerRequest {
            slot,
            software: self.software.into_raw(),
            session_bucket,
        }
    }
}

/// Parse a request from TOML text
pub fn parse(content: &str) -> Result<RunRequest> {
    let file: RequestFile = toml::from_str(content).context("Invalid request file")?;
    Ok(RunRequest {
        servers: file.servers.into_iter().map(ServerEntry::into_request).collect(),
    })
}

/// Load a request file
pub fn load(path: &Path) -> Result<RunRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let request = parse(&content).with_context(|| format!("In {}", path.display()))?;
    if request.servers.is_empty() {
        anyhow::bail!("{} declares no [[server]] entries", path.display());
    }
    log::debug!(
        "Loaded {} server slots from {}",
        request.servers.len(),
        path.display()
    );
    Ok(request)
}

// ============================================================================
// Tests
// ============================================================================
