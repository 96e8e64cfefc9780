//! Record types stored in the inventory table.
//!
//! Both record kinds share the partition key `instance_id`; the sort key
//! (`record_kind`) is `SERVER` for server metadata and `SOFTWARE#<name>` for
//! install outcomes.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sort-key value for server records.
pub const SERVER_KIND: &str = "SERVER";

/// Sort-key prefix for install-status records.
pub const SOFTWARE_KIND_PREFIX: &str = "SOFTWARE#";

// ============================================================================
// OS Type
// ============================================================================

/// Operating systems a server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Ubuntu,
    Centos,
    Debian,
    Amazonlinux,
    Amazonlinux2023,
}

impl OsType {
    /// All supported values, in prompt order.
    pub const ALL: [OsType; 5] = [
        OsType::Ubuntu,
        OsType::Centos,
        OsType::Debian,
        OsType::Amazonlinux,
        OsType::Amazonlinux2023,
    ];

    /// Lowercase identifier, also the name of the role task file (`<os>.yml`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu",
            Self::Centos => "centos",
            Self::Debian => "debian",
            Self::Amazonlinux => "amazonlinux",
            Self::Amazonlinux2023 => "amazonlinux2023",
        }
    }

    fn expected() -> String {
        Self::ALL
            .iter()
            .map(OsType::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|os| os.as_str() == normalized)
            .ok_or_else(|| Error::UnsupportedOs {
                value: s.trim().to_string(),
                expected: Self::expected(),
            })
    }
}

// ============================================================================
// Record Kind
// ============================================================================

/// Sort-key discriminator of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Server,
    Software(String),
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str(SERVER_KIND),
            Self::Software(name) => write!(f, "{SOFTWARE_KIND_PREFIX}{name}"),
        }
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == SERVER_KIND {
            return Ok(Self::Server);
        }
        match s.strip_prefix(SOFTWARE_KIND_PREFIX) {
            Some(name) if !name.is_empty() => Ok(Self::Software(name.to_string())),
            _ => Err(Error::InvalidField {
                field: "record_kind",
                message: format!("'{s}' is neither {SERVER_KIND} nor {SOFTWARE_KIND_PREFIX}<name>"),
            }),
        }
    }
}

/// Render a composite key for messages and logs.
pub fn record_key(instance_id: &str, kind: &RecordKind) -> String {
    format!("{instance_id}/{kind}")
}

// ============================================================================
// Server Record
// ============================================================================

/// A managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Stable cloud instance identifier (partition key)
    pub instance_id: String,
    /// Operator-assigned name, unique across stored servers
    pub server_name: String,
    /// Cloud region the instance lives in
    pub region: String,
    /// Operating system, selects the role task variant
    pub os_type: OsType,
    /// Bucket the transport uses for session transfer/logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_log_bucket: Option<String>,
}

impl ServerRecord {
    /// Composite key of this record.
    pub fn key(&self) -> String {
        record_key(&self.instance_id, &RecordKind::Server)
    }
}

/// Raw operator input for a server declared as new.
///
/// Nothing here is trusted until [`NewServer::validate`] turns it into a
/// [`ServerRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServer {
    pub server_name: String,
    pub instance_id: String,
    pub region: String,
    pub os_type: String,
    #[serde(default)]
    pub transport_log_bucket: Option<String>,
}

impl NewServer {
    /// Check every field and build the record to store.
    pub fn validate(&self) -> Result<ServerRecord> {
        let server_name = required("server_name", &self.server_name)?;
        if server_name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidField {
                field: "server_name",
                message: format!("'{server_name}' must not contain whitespace"),
            });
        }
        let instance_id = required("instance_id", &self.instance_id)?;
        if instance_id.chars().any(char::is_whitespace) {
            return Err(Error::InvalidField {
                field: "instance_id",
                message: format!("'{instance_id}' must not contain whitespace"),
            });
        }
        let region = required("region", &self.region)?;
        let os_type: OsType = self.os_type.parse()?;

        let transport_log_bucket = self
            .transport_log_bucket
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);

        Ok(ServerRecord {
            instance_id,
            server_name,
            region,
            os_type,
            transport_log_bucket,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidField {
            field,
            message: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// Install Status Record
// ============================================================================

/// Outcome of installing one software item on one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Success,
    Failure,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            // older rows written by the script used "failed"
            "failure" | "failed" => Ok(Self::Failure),
            other => Err(Error::InvalidField {
                field: "status",
                message: format!("unknown install status '{other}'"),
            }),
        }
    }
}

/// Last known install outcome for an (instance, software) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallStatusRecord {
    pub instance_id: String,
    pub software_name: String,
    pub installed_at: DateTime<Utc>,
    pub status: InstallStatus,
}

impl InstallStatusRecord {
    /// Build a record stamped with the current time.
    pub fn now(instance_id: &str, software_name: &str, status: InstallStatus) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            software_name: software_name.to_string(),
            installed_at: Utc::now(),
            status,
        }
    }

    /// Sort-key of this record.
    pub fn kind(&self) -> RecordKind {
        RecordKind::Software(self.software_name.clone())
    }

    /// Composite key of this record.
    pub fn key(&self) -> String {
        record_key(&self.instance_id, &self.kind())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewServer {
        NewServer {
            server_name: " web-1 ".into(),
            instance_id: "i-0abc".into(),
            region: "ap-south-1".into(),
            os_type: "Ubuntu".into(),
            transport_log_bucket: Some("  ".into()),
        }
    }

    #[test]
    fn test_os_type_parse() {
        assert_eq!("ubuntu".parse::<OsType>().unwrap(), OsType::Ubuntu);
        assert_eq!(" AmazonLinux2023 ".parse::<OsType>().unwrap(), OsType::Amazonlinux2023);
        let err = "windows".parse::<OsType>().unwrap_err();
        assert!(err.to_string().contains("windows"));
        assert!(err.to_string().contains("amazonlinux2023"));
    }

    #[test]
    fn test_record_kind_roundtrip() {
        assert_eq!("SERVER".parse::<RecordKind>().unwrap(), RecordKind::Server);
        assert_eq!(
            "SOFTWARE#nginx".parse::<RecordKind>().unwrap(),
            RecordKind::Software("nginx".into())
        );
        assert_eq!(RecordKind::Software("docker".into()).to_string(), "SOFTWARE#docker");
        assert!("SOFTWARE#".parse::<RecordKind>().is_err());
        assert!("USER".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_new_server_validate_normalizes() {
        let record = input().validate().unwrap();
        assert_eq!(record.server_name, "web-1");
        assert_eq!(record.os_type, OsType::Ubuntu);
        assert_eq!(record.transport_log_bucket, None);
        assert_eq!(record.key(), "i-0abc/SERVER");
    }

    #[test]
    fn test_new_server_validate_rejects() {
        let mut bad_os = input();
        bad_os.os_type = "windows".into();
        assert!(matches!(bad_os.validate(), Err(Error::UnsupportedOs { .. })));

        let mut no_id = input();
        no_id.instance_id = "   ".into();
        assert!(matches!(
            no_id.validate(),
            Err(Error::InvalidField { field: "instance_id", .. })
        ));

        let mut spaced = input();
        spaced.server_name = "web 1".into();
        assert!(matches!(
            spaced.validate(),
            Err(Error::InvalidField { field: "server_name", .. })
        ));
    }

    #[test]
    fn test_install_status_parse_accepts_legacy_value() {
        assert_eq!("failed".parse::<InstallStatus>().unwrap(), InstallStatus::Failure);
        assert_eq!("success".parse::<InstallStatus>().unwrap(), InstallStatus::Success);
        assert!("pending".parse::<InstallStatus>().is_err());
    }
}
