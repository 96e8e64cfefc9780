//! SQLite-backed record store.
//!
//! One table holds both record kinds, keyed by `(instance_id, record_kind)`
//! like the wide-column table the inventory was first kept in. Columns that
//! do not apply to a kind are NULL.

use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::types::{
    InstallStatus, InstallStatusRecord, OsType, RecordKind, SERVER_KIND, SOFTWARE_KIND_PREFIX,
    ServerRecord, record_key,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

/// Default table name.
pub const DEFAULT_TABLE: &str = "ansible-inventory";

/// Record store persisted in a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
    table: String,
}

impl SqliteStore {
    /// Open or create the store at `db_path`, creating `table` if missing.
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::store("open", db_path.display().to_string(), e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::store("open", db_path.display().to_string(), e))?;
        let store = Self {
            conn,
            table: table.to_string(),
        };
        store.init_schema()?;
        log::debug!("Opened record store {} (table {})", db_path.display(), table);
        Ok(store)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory().map_err(|e| Error::store("open", ":memory:", e))?;
        let store = Self {
            conn,
            table: table.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Count rows of each kind: (servers, statuses).
    pub fn counts(&self) -> Result<(u64, u64)> {
        let sql = format!(
            "SELECT
                COALESCE(SUM(CASE WHEN record_kind = ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN record_kind LIKE ?2 THEN 1 ELSE 0 END), 0)
             FROM \"{}\"",
            self.table
        );
        let (servers, statuses): (i64, i64) = self
            .conn
            .query_row(
                &sql,
                params![SERVER_KIND, format!("{SOFTWARE_KIND_PREFIX}%")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::store("count", self.table.clone(), e))?;
        Ok((servers as u64, statuses as u64))
    }

    fn init_schema(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                instance_id TEXT NOT NULL,
                record_kind TEXT NOT NULL,
                server_name TEXT,
                region TEXT,
                os_type TEXT,
                transport_log_bucket TEXT,
                software_name TEXT,
                installed_at TEXT,
                status TEXT,
                PRIMARY KEY (instance_id, record_kind)
            );",
            self.table
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| Error::store("create_table", self.table.clone(), e))
    }
}

impl RecordStore for SqliteStore {
    fn get_server(&self, instance_id: &str) -> Result<Option<ServerRecord>> {
        let key = record_key(instance_id, &RecordKind::Server);
        let sql = format!(
            "SELECT instance_id, server_name, region, os_type, transport_log_bucket
             FROM \"{}\" WHERE instance_id = ?1 AND record_kind = ?2",
            self.table
        );
        let row = self
            .conn
            .query_row(&sql, params![instance_id, SERVER_KIND], raw_server)
            .optional()
            .map_err(|e| Error::store("get_server", key, e))?;

        row.map(RawServer::decode).transpose()
    }

    fn put_server(&self, record: &ServerRecord) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\"
                (instance_id, record_kind, server_name, region, os_type, transport_log_bucket)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.table
        );
        self.conn
            .execute(
                &sql,
                params![
                    record.instance_id,
                    SERVER_KIND,
                    record.server_name,
                    record.region,
                    record.os_type.as_str(),
                    record.transport_log_bucket,
                ],
            )
            .map_err(|e| Error::store("put_server", record.key(), e))?;
        log::debug!("Stored server {} ({})", record.server_name, record.key());
        Ok(())
    }

    fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        let sql = format!(
            "SELECT instance_id, server_name, region, os_type, transport_log_bucket
             FROM \"{}\" WHERE record_kind = ?1",
            self.table
        );
        let scan_err = |e: rusqlite::Error| Error::store("list_servers", self.table.clone(), e);

        let mut stmt = self.conn.prepare(&sql).map_err(scan_err)?;
        let rows = stmt
            .query_map([SERVER_KIND], raw_server)
            .map_err(scan_err)?;

        let mut servers = Vec::new();
        for row in rows {
            match row.map_err(scan_err)?.decode() {
                Ok(record) => servers.push(record),
                Err(e) => log::warn!("Skipping server row: {e}"),
            }
        }
        Ok(servers)
    }

    fn put_status(&self, record: &InstallStatusRecord) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO \"{}\"
                (instance_id, record_kind, software_name, installed_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        self.conn
            .execute(
                &sql,
                params![
                    record.instance_id,
                    record.kind().to_string(),
                    record.software_name,
                    record
                        .installed_at
                        .to_rfc3339_opts(SecondsFormat::Secs, true),
                    record.status.as_str(),
                ],
            )
            .map_err(|e| Error::store("put_status", record.key(), e))?;
        log::debug!("Recorded {} = {}", record.key(), record.status);
        Ok(())
    }

    fn get_status(
        &self,
        instance_id: &str,
        software_name: &str,
    ) -> Result<Option<InstallStatusRecord>> {
        let kind = RecordKind::Software(software_name.to_string());
        let key = record_key(instance_id, &kind);
        let sql = format!(
            "SELECT instance_id, record_kind, software_name, installed_at, status
             FROM \"{}\" WHERE instance_id = ?1 AND record_kind = ?2",
            self.table
        );
        let row = self
            .conn
            .query_row(&sql, params![instance_id, kind.to_string()], raw_status)
            .optional()
            .map_err(|e| Error::store("get_status", key, e))?;

        row.map(RawStatus::decode).transpose()
    }

    fn list_statuses(&self) -> Result<Vec<InstallStatusRecord>> {
        let sql = format!(
            "SELECT instance_id, record_kind, software_name, installed_at, status
             FROM \"{}\" WHERE record_kind LIKE ?1",
            self.table
        );
        let scan_err = |e: rusqlite::Error| Error::store("list_statuses", self.table.clone(), e);

        let mut stmt = self.conn.prepare(&sql).map_err(scan_err)?;
        let rows = stmt
            .query_map([format!("{SOFTWARE_KIND_PREFIX}%")], raw_status)
            .map_err(scan_err)?;

        let mut statuses = Vec::new();
        for row in rows {
            match row.map_err(scan_err)?.decode() {
                Ok(record) => statuses.push(record),
                Err(e) => log::warn!("Skipping status row: {e}"),
            }
        }
        Ok(statuses)
    }

    fn find_servers_by_name(&self, server_name: &str) -> Result<Vec<ServerRecord>> {
        let sql = format!(
            "SELECT instance_id, server_name, region, os_type, transport_log_bucket
             FROM \"{}\" WHERE record_kind = ?1 AND server_name = ?2",
            self.table
        );
        let scan_err = |e: rusqlite::Error| Error::store("find_servers_by_name", server_name, e);

        let mut stmt = self.conn.prepare(&sql).map_err(scan_err)?;
        let rows = stmt
            .query_map(params![SERVER_KIND, server_name], raw_server)
            .map_err(scan_err)?;

        let mut servers = Vec::new();
        for row in rows {
            servers.push(row.map_err(scan_err)?.decode()?);
        }
        Ok(servers)
    }
}

// ============================================================================
// Row decoding
// ============================================================================

/// Server row as stored, before validation.
struct RawServer {
    instance_id: String,
    server_name: Option<String>,
    region: Option<String>,
    os_type: Option<String>,
    transport_log_bucket: Option<String>,
}

fn raw_server(row: &Row<'_>) -> rusqlite::Result<RawServer> {
    Ok(RawServer {
        instance_id: row.get(0)?,
        server_name: row.get(1)?,
        region: row.get(2)?,
        os_type: row.get(3)?,
        transport_log_bucket: row.get(4)?,
    })
}

impl RawServer {
    fn decode(self) -> Result<ServerRecord> {
        let key = record_key(&self.instance_id, &RecordKind::Server);
        let corrupt = |message: String| Error::Corrupt {
            key: key.clone(),
            message,
        };

        let os_raw = self
            .os_type
            .ok_or_else(|| corrupt("missing os_type".to_string()))?;
        let os_type: OsType = os_raw.parse().map_err(|e: Error| corrupt(e.to_string()))?;

        Ok(ServerRecord {
            server_name: self
                .server_name
                .ok_or_else(|| corrupt("missing server_name".to_string()))?,
            region: self
                .region
                .ok_or_else(|| corrupt("missing region".to_string()))?,
            os_type,
            transport_log_bucket: self.transport_log_bucket.filter(|b| !b.is_empty()),
            instance_id: self.instance_id,
        })
    }
}

/// Status row as stored, before validation.
struct RawStatus {
    instance_id: String,
    record_kind: String,
    software_name: Option<String>,
    installed_at: Option<String>,
    status: Option<String>,
}

fn raw_status(row: &Row<'_>) -> rusqlite::Result<RawStatus> {
    Ok(RawStatus {
        instance_id: row.get(0)?,
        record_kind: row.get(1)?,
        software_name: row.get(2)?,
        installed_at: row.get(3)?,
        status: row.get(4)?,
    })
}

impl RawStatus {
    fn decode(self) -> Result<InstallStatusRecord> {
        let key = format!("{}/{}", self.instance_id, self.record_kind);
        let corrupt = |message: String| Error::Corrupt {
            key: key.clone(),
            message,
        };

        let software_name = match self.record_kind.parse::<RecordKind>() {
            Ok(RecordKind::Software(name)) => name,
            _ => return Err(corrupt("not a software record".to_string())),
        };
        if let Some(column) = &self.software_name
            && column != &software_name
        {
            return Err(corrupt(format!(
                "software_name '{column}' disagrees with key"
            )));
        }

        let installed_raw = self
            .installed_at
            .ok_or_else(|| corrupt("missing installed_at".to_string()))?;
        let installed_at = DateTime::parse_from_rfc3339(&installed_raw)
            .map_err(|e| corrupt(format!("bad installed_at '{installed_raw}': {e}")))?
            .with_timezone(&Utc);

        let status: InstallStatus = self
            .status
            .ok_or_else(|| corrupt("missing status".to_string()))?
            .parse()
            .map_err(|e: Error| corrupt(e.to_string()))?;

        Ok(InstallStatusRecord {
            instance_id: self.instance_id,
            software_name,
            installed_at,
            status,
        })
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidField {
            field: "table",
            message: format!("'{table}' may only contain letters, digits, '_', '-' and '.'"),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
