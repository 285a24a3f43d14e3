//! Relational metadata store backed by SQLite.
//!
//! Identifiers come from `INTEGER PRIMARY KEY` columns, which SQLite assigns
//! as the current maximum plus one. Every write runs in a `BEGIN IMMEDIATE`
//! transaction so that the duplicate check and the insert happen under the
//! database write lock; concurrent writers in other connections wait up to
//! the configured busy timeout and then fail with `StoreBusy`.

use super::{format_timestamp, parse_timestamp, MetadataStore};
use crate::error::{Error, Result};
use crate::model::{CloneFilter, CloneRecord, Host, Image, NewClone, NewImage};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS SchemaMeta (
    Key   TEXT PRIMARY KEY,
    Value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Host (
    HostID    INTEGER PRIMARY KEY,
    HostName  TEXT NOT NULL UNIQUE COLLATE NOCASE,
    IPAddress TEXT NOT NULL DEFAULT '',
    FQDN      TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS Image (
    ImageID           INTEGER PRIMARY KEY,
    ImageName         TEXT NOT NULL,
    ImageLocation     TEXT NOT NULL UNIQUE,
    SizeMB            INTEGER NOT NULL DEFAULT 0,
    DatabaseName      TEXT NOT NULL COLLATE NOCASE,
    DatabaseTimestamp TEXT,
    CreatedOn         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS IX_Image_DatabaseName ON Image (DatabaseName, CreatedOn);

CREATE TABLE IF NOT EXISTS Clone (
    CloneID       INTEGER PRIMARY KEY,
    ImageID       INTEGER NOT NULL REFERENCES Image (ImageID),
    HostID        INTEGER NOT NULL REFERENCES Host (HostID),
    CloneLocation TEXT NOT NULL,
    AccessPath    TEXT NOT NULL,
    SqlInstance   TEXT NOT NULL COLLATE NOCASE,
    DatabaseName  TEXT NOT NULL COLLATE NOCASE,
    IsEnabled     INTEGER NOT NULL DEFAULT 1,
    UNIQUE (SqlInstance, DatabaseName),
    UNIQUE (HostID, CloneLocation)
);
"#;

const CLONE_RECORD_SELECT: &str = "SELECT c.CloneID, c.CloneLocation, c.AccessPath, c.SqlInstance, \
     c.DatabaseName, c.IsEnabled, i.ImageID, i.ImageName, i.ImageLocation, h.HostName \
     FROM Clone c \
     JOIN Image i ON i.ImageID = c.ImageID \
     JOIN Host h ON h.HostID = c.HostID";

const IMAGE_SELECT: &str = "SELECT ImageID, ImageName, ImageLocation, SizeMB, DatabaseName, \
     DatabaseTimestamp, CreatedOn FROM Image";

/// SQLite-backed registry.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and its schema.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("SQLite journal_mode is '{}', expected wal", mode);
        }
        Self::configure(conn, path.to_path_buf(), busy_timeout)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, PathBuf::from(":memory:"), Duration::from_secs(5))
    }

    fn configure(conn: Connection, db_path: PathBuf, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.initialize()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned {
            context: format!("sqlite connection {}", self.db_path.display()),
        })
    }

    /// Stored schema version, if the schema exists.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.connection()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT Value FROM SchemaMeta WHERE Key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Map lock contention to `StoreBusy`; everything else stays a SQLite error.
    fn map_busy(&self, err: rusqlite::Error) -> Error {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Error::StoreBusy {
                path: self.db_path.display().to_string(),
            },
            _ => Error::Sqlite(err),
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
    )
}

fn map_host(row: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        host_id: row.get(0)?,
        host_name: row.get(1)?,
        ip_address: row.get(2)?,
        fqdn: row.get(3)?,
    })
}

/// Raw image row; timestamps are parsed after the query.
struct ImageRow {
    image_id: i64,
    image_name: String,
    image_location: String,
    size_mb: i64,
    database_name: String,
    database_timestamp: Option<String>,
    created_on: String,
}

fn map_image_row(row: &Row<'_>) -> rusqlite::Result<ImageRow> {
    Ok(ImageRow {
        image_id: row.get(0)?,
        image_name: row.get(1)?,
        image_location: row.get(2)?,
        size_mb: row.get(3)?,
        database_name: row.get(4)?,
        database_timestamp: row.get(5)?,
        created_on: row.get(6)?,
    })
}

impl TryFrom<ImageRow> for Image {
    type Error = Error;

    fn try_from(row: ImageRow) -> Result<Self> {
        Ok(Image {
            image_id: row.image_id,
            image_name: row.image_name,
            image_location: row.image_location,
            size_mb: u64::try_from(row.size_mb).unwrap_or(0),
            database_name: row.database_name,
            database_timestamp: row
                .database_timestamp
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            created_on: parse_timestamp(&row.created_on)?,
        })
    }
}

fn map_clone_record(row: &Row<'_>) -> rusqlite::Result<CloneRecord> {
    Ok(CloneRecord {
        clone_id: row.get(0)?,
        clone_location: row.get(1)?,
        access_path: row.get(2)?,
        sql_instance: row.get(3)?,
        database_name: row.get(4)?,
        is_enabled: row.get(5)?,
        image_id: row.get(6)?,
        image_name: row.get(7)?,
        image_location: row.get(8)?,
        host_name: row.get(9)?,
    })
}

impl MetadataStore for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO SchemaMeta (Key, Value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn resolve_host_by_name(&self, name: &str) -> Result<Option<Host>> {
        let conn = self.connection()?;
        let host = conn
            .query_row(
                "SELECT HostID, HostName, IPAddress, FQDN FROM Host WHERE HostName = ?1",
                params![name],
                map_host,
            )
            .optional()?;
        Ok(host)
    }

    fn create_host(&self, host_name: &str, ip_address: &str, fqdn: &str) -> Result<Host> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.map_busy(e))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT HostID FROM Host WHERE HostName = ?1",
                params![host_name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::DuplicateHost {
                name: host_name.to_string(),
            });
        }

        tx.execute(
            "INSERT INTO Host (HostName, IPAddress, FQDN) VALUES (?1, ?2, ?3)",
            params![host_name, ip_address, fqdn],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateHost {
                    name: host_name.to_string(),
                }
            } else {
                Error::Sqlite(e)
            }
        })?;
        let host_id = tx.last_insert_rowid();
        tx.commit().map_err(|e| self.map_busy(e))?;

        log::info!("Registered host {} as {}", host_name, host_id);
        Ok(Host {
            host_id,
            host_name: host_name.to_string(),
            ip_address: ip_address.to_string(),
            fqdn: fqdn.to_string(),
        })
    }

    fn list_hosts(&self) -> Result<Vec<Host>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT HostID, HostName, IPAddress, FQDN FROM Host ORDER BY HostID")?;
        let hosts = stmt
            .query_map([], map_host)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hosts)
    }

    fn register_image(&self, new: &NewImage) -> Result<Image> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.map_busy(e))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT ImageID FROM Image WHERE ImageLocation = ?1",
                params![new.image_location],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::DuplicateImage {
                location: new.image_location.clone(),
            });
        }

        tx.execute(
            "INSERT INTO Image (ImageName, ImageLocation, SizeMB, DatabaseName, DatabaseTimestamp, CreatedOn) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.image_name,
                new.image_location,
                i64::try_from(new.size_mb).unwrap_or(i64::MAX),
                new.database_name,
                new.database_timestamp.as_ref().map(format_timestamp),
                format_timestamp(&new.created_on),
            ],
        )?;
        let image_id = tx.last_insert_rowid();
        tx.commit().map_err(|e| self.map_busy(e))?;

        Ok(Image {
            image_id,
            image_name: new.image_name.clone(),
            image_location: new.image_location.clone(),
            size_mb: new.size_mb,
            database_name: new.database_name.clone(),
            database_timestamp: new.database_timestamp,
            created_on: new.created_on,
        })
    }

    fn find_image_by_location(&self, location: &str) -> Result<Option<Image>> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                &format!("{} WHERE ImageLocation = ?1", IMAGE_SELECT),
                params![location],
                map_image_row,
            )
            .optional()?;
        row.map(Image::try_from).transpose()
    }

    fn latest_image_for_database(&self, database_name: &str) -> Result<Option<Image>> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                &format!(
                    "{} WHERE DatabaseName = ?1 ORDER BY CreatedOn DESC, ImageID DESC LIMIT 1",
                    IMAGE_SELECT
                ),
                params![database_name],
                map_image_row,
            )
            .optional()?;
        row.map(Image::try_from).transpose()
    }

    fn list_images(&self, database_name: Option<&str>) -> Result<Vec<Image>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE ?1 IS NULL OR DatabaseName = ?1 ORDER BY ImageID",
            IMAGE_SELECT
        ))?;
        let rows = stmt
            .query_map(params![database_name], map_image_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Image::try_from).collect()
    }

    fn list_clones(&self, filter: &CloneFilter) -> Result<Vec<CloneRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR h.HostName = ?1 COLLATE NOCASE) \
             AND (?2 IS NULL OR c.SqlInstance = ?2) \
             AND (?3 IS NULL OR c.DatabaseName = ?3) \
             AND (?4 IS NULL OR c.ImageID = ?4) \
             AND (?5 = 0 OR c.IsEnabled = 1) \
             ORDER BY c.CloneID",
            CLONE_RECORD_SELECT
        ))?;
        let records = stmt
            .query_map(
                params![
                    filter.host_name,
                    filter.sql_instance,
                    filter.database_name,
                    filter.image_id,
                    filter.enabled_only,
                ],
                map_clone_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn create_clone(&self, new: &NewClone) -> Result<CloneRecord> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.map_busy(e))?;

        let image_exists: Option<i64> = tx
            .query_row(
                "SELECT ImageID FROM Image WHERE ImageID = ?1",
                params![new.image_id],
                |row| row.get(0),
            )
            .optional()?;
        if image_exists.is_none() {
            return Err(Error::ImageNotFound {
                reference: format!("ImageID {}", new.image_id),
            });
        }
        let host_exists: Option<i64> = tx
            .query_row(
                "SELECT HostID FROM Host WHERE HostID = ?1",
                params![new.host_id],
                |row| row.get(0),
            )
            .optional()?;
        if host_exists.is_none() {
            return Err(Error::HostNotFound {
                name: format!("HostID {}", new.host_id),
            });
        }

        let duplicate = || Error::DuplicateClone {
            sql_instance: new.sql_instance.clone(),
            database: new.database_name.clone(),
            location: new.clone_location.clone(),
        };

        let existing: Option<i64> = tx
            .query_row(
                "SELECT CloneID FROM Clone \
                 WHERE (SqlInstance = ?1 AND DatabaseName = ?2) \
                    OR (HostID = ?3 AND CloneLocation = ?4) \
                 LIMIT 1",
                params![
                    new.sql_instance,
                    new.database_name,
                    new.host_id,
                    new.clone_location
                ],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(duplicate());
        }

        tx.execute(
            "INSERT INTO Clone (ImageID, HostID, CloneLocation, AccessPath, SqlInstance, DatabaseName, IsEnabled) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.image_id,
                new.host_id,
                new.clone_location,
                new.access_path,
                new.sql_instance,
                new.database_name,
                new.is_enabled,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate()
            } else {
                Error::Sqlite(e)
            }
        })?;
        let clone_id = tx.last_insert_rowid();

        let record = tx.query_row(
            &format!("{} WHERE c.CloneID = ?1", CLONE_RECORD_SELECT),
            params![clone_id],
            map_clone_record,
        )?;
        tx.commit().map_err(|e| self.map_busy(e))?;

        log::info!(
            "Registered clone {} for {}/{}",
            record.clone_id,
            record.sql_instance,
            record.database_name
        );
        Ok(record)
    }
}
