//! SQLite storage engine: schema, migrations, transactions, row access.
//!
//! One process instance is the database owner and opens the file
//! read-write; every other instance opens it read-only. WAL journaling
//! lets read transactions run concurrently with the owner's immediate-mode
//! write transaction; schema creation and migration run under an exclusive
//! transaction that blocks everything.
//!
//! ## Schema
//!
//! Five tables, preserved bit-for-bit for interop with pre-seeded
//! snapshots:
//!
//! ```text
//! admin   (key TEXT PRIMARY KEY, ival INTEGER, value BLOB)
//! issuers (groupid INTEGER, issuer_hash BLOB PRIMARY KEY)
//! groups  (groupid INTEGER PRIMARY KEY AUTOINCREMENT,
//!          flags INTEGER, format INTEGER, data BLOB)
//! serials (groupid INTEGER, serial BLOB, UNIQUE(groupid, serial))
//! hashes  (groupid INTEGER, sha256 BLOB, UNIQUE(groupid, sha256))
//! dates   (groupid INTEGER PRIMARY KEY, notbefore REAL, notafter REAL)
//! ```
//!
//! Deleting a group cascades to its `issuers`, `serials`, `hashes` and
//! `dates` rows; the cascade is explicit SQL inside the same transaction
//! (schema v7 dropped the legacy trigger).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, Once};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::config::RevocationConfig;
use crate::error::RevocationError;
use crate::types::{
    admin_keys, GroupFlags, RevocationFormat, MIN_SUPPORTED_SCHEMA_VERSION, SCHEMA_VERSION,
};

const SCHEMA_DDL: &str = "\
CREATE TABLE admin (
    key     TEXT PRIMARY KEY NOT NULL,
    ival    INTEGER NOT NULL DEFAULT 0,
    value   BLOB
);
CREATE TABLE issuers (
    groupid     INTEGER,
    issuer_hash BLOB PRIMARY KEY
);
CREATE INDEX issuer_idx ON issuers(issuer_hash);
CREATE TABLE groups (
    groupid INTEGER PRIMARY KEY AUTOINCREMENT,
    flags   INTEGER,
    format  INTEGER,
    data    BLOB
);
CREATE TABLE serials (
    groupid INTEGER NOT NULL,
    serial  BLOB NOT NULL,
    UNIQUE(groupid, serial)
);
CREATE TABLE hashes (
    groupid INTEGER NOT NULL,
    sha256  BLOB NOT NULL,
    UNIQUE(groupid, sha256)
);
CREATE TABLE dates (
    groupid   INTEGER PRIMARY KEY NOT NULL,
    notbefore REAL NOT NULL,
    notafter  REAL NOT NULL
);
";

/// A group row as read from the `groups` table.
#[derive(Debug, Clone)]
pub struct GroupRow {
    /// Surrogate group key.
    pub groupid: i64,
    /// Policy flag bitmask.
    pub flags: GroupFlags,
    /// Declared matching format.
    pub format: RevocationFormat,
    /// Opaque filter blob; populated only for [`RevocationFormat::Nto1`].
    pub data: Option<Vec<u8>>,
}

/// Connection factory and row-level access for the revocation database.
pub struct Store {
    path: PathBuf,
    /// Sole write connection; `None` for read-only instances.
    writer: Option<Mutex<Connection>>,
    /// Pool of read-only connections, checked out for the duration of one
    /// read transaction.
    readers: Mutex<Vec<Connection>>,
    schema_init: Once,
    schema_version: AtomicI64,
}

impl Store {
    /// Open (and for the owner, create or migrate) the database at
    /// `config.db_path`.
    ///
    /// If a deferred-rebuild marker was left by a previous corruption, or
    /// the schema is older than [`MIN_SUPPORTED_SCHEMA_VERSION`], the
    /// owner discards the file and recreates it from scratch.
    pub fn open(config: &RevocationConfig) -> Result<Self, RevocationError> {
        if config.owner {
            Self::open_owner(&config.db_path)
        } else {
            Self::open_read_only(&config.db_path)
        }
    }

    fn open_owner(path: &Path) -> Result<Self, RevocationError> {
        let marker = rebuild_marker_path(path);
        if marker.exists() {
            warn!(path = %path.display(), "rebuild marker present, discarding database");
            remove_database_files(path);
            let _ = std::fs::remove_file(&marker);
        }

        let fresh = !path.exists();
        let conn = Self::configure(Connection::open(path)?, false)?;

        let store = Self {
            path: path.to_path_buf(),
            writer: Some(Mutex::new(conn)),
            readers: Mutex::new(Vec::new()),
            schema_init: Once::new(),
            schema_version: AtomicI64::new(-1),
        };

        if fresh {
            store.create_schema()?;
        } else {
            match store.migrate() {
                Ok(()) => {},
                Err(e) if e.is_corruption() || matches!(e, RevocationError::UnsupportedSchema { .. }) => {
                    warn!(error = %e, "schema unusable, discarding and rebuilding database");
                    store.discard_and_recreate()?;
                },
                Err(e) => return Err(e),
            }
        }
        store.refresh_schema_version();
        Ok(store)
    }

    fn open_read_only(path: &Path) -> Result<Self, RevocationError> {
        // Verify the file opens at all; the connection joins the pool.
        let conn = Self::configure(
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?,
            true,
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: None,
            readers: Mutex::new(vec![conn]),
            schema_init: Once::new(),
            schema_version: AtomicI64::new(-1),
        })
    }

    fn configure(conn: Connection, read_only: bool) -> Result<Connection, rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        // WAL keeps readers unblocked while an immediate write is open.
        // Read-only connections must not attempt the switch: against a
        // rollback-journal file (vendor snapshots) it needs write access.
        if !read_only {
            let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get(0))?;
        }
        Ok(conn)
    }

    /// Whether this instance owns write access.
    pub fn is_owner(&self) -> bool {
        self.writer.is_some()
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ---- transactions -----------------------------------------------------

    /// Run `work` inside a read transaction on a pooled connection.
    pub fn with_read<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, RevocationError>,
    ) -> Result<T, RevocationError> {
        let conn = self.checkout_reader()?;
        let result = (|| {
            let tx = conn.unchecked_transaction()?;
            let value = work(&tx)?;
            tx.commit()?;
            Ok(value)
        })();
        self.checkin_reader(conn);
        result
    }

    /// Run `work` inside an immediate-mode write transaction. Commits only
    /// if `work` succeeds; any error rolls the whole transaction back.
    pub fn with_write<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, RevocationError>,
    ) -> Result<T, RevocationError> {
        self.with_write_behavior(TransactionBehavior::Immediate, work)
    }

    /// Run `work` inside an exclusive transaction (schema creation and
    /// migration only; blocks readers too).
    pub fn with_exclusive<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, RevocationError>,
    ) -> Result<T, RevocationError> {
        self.with_write_behavior(TransactionBehavior::Exclusive, work)
    }

    fn with_write_behavior<T>(
        &self,
        behavior: TransactionBehavior,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, RevocationError>,
    ) -> Result<T, RevocationError> {
        let writer = self.writer.as_ref().ok_or_else(|| RevocationError::Config {
            message: "read-only instance cannot write to the revocation database".into(),
        })?;
        let mut conn = writer.lock().map_err(|_| RevocationError::Corruption {
            message: "writer lock poisoned".into(),
        })?;
        let tx = conn.transaction_with_behavior(behavior)?;
        match work(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            },
            Err(e) => {
                // Dropping the transaction rolls it back.
                drop(tx);
                Err(e)
            },
        }
    }

    fn checkout_reader(&self) -> Result<Connection, RevocationError> {
        if let Ok(mut pool) = self.readers.lock() {
            if let Some(conn) = pool.pop() {
                return Ok(conn);
            }
        }
        Ok(Self::configure(
            Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?,
            true,
        )?)
    }

    fn checkin_reader(&self, conn: Connection) {
        if let Ok(mut pool) = self.readers.lock() {
            if pool.len() < 4 {
                pool.push(conn);
                return;
            }
        }
        // Pool full or lock poisoned; let the connection close.
    }

    /// Drop all pooled connections (explicit teardown for tests and
    /// snapshot installation).
    pub fn release_all_connections(&self) {
        if let Ok(mut pool) = self.readers.lock() {
            pool.clear();
        }
    }

    // ---- schema -----------------------------------------------------------

    fn create_schema(&self) -> Result<(), RevocationError> {
        info!(path = %self.path.display(), "creating revocation database schema");
        self.with_exclusive(|tx| {
            tx.execute_batch(SCHEMA_DDL)?;
            admin_set_int(tx, admin_keys::DB_VERSION, SCHEMA_VERSION)?;
            admin_set_int(tx, admin_keys::DB_FORMAT, i64::from(crate::types::WIRE_FORMAT_VERSION))?;
            admin_set_int(tx, admin_keys::VERSION, 0)?;
            Ok(())
        })
    }

    /// Apply ordered, idempotent migration steps up to [`SCHEMA_VERSION`].
    ///
    /// Each step raises `db_version` only after it fully succeeds. A
    /// schema older than the supported floor is not transformed in place:
    /// earlier layouts may carry silently-dropped rows from old bugs, so
    /// the whole file is rebuilt instead.
    fn migrate(&self) -> Result<(), RevocationError> {
        self.with_exclusive(|tx| {
            let current = admin_get_int(tx, admin_keys::DB_VERSION)?.unwrap_or(0);
            if current < MIN_SUPPORTED_SCHEMA_VERSION {
                return Err(RevocationError::UnsupportedSchema {
                    found: current,
                    minimum: MIN_SUPPORTED_SCHEMA_VERSION,
                });
            }
            if current >= SCHEMA_VERSION {
                return Ok(());
            }
            info!(from = current, to = SCHEMA_VERSION, "migrating revocation database schema");
            if current < 6 {
                migrate_v6(tx)?;
            }
            if current < 7 {
                migrate_v7(tx)?;
            }
            Ok(())
        })
    }

    fn discard_and_recreate(&self) -> Result<(), RevocationError> {
        let writer = self.writer.as_ref().ok_or_else(|| RevocationError::Config {
            message: "read-only instance cannot rebuild the revocation database".into(),
        })?;
        {
            let mut conn = writer.lock().map_err(|_| RevocationError::Corruption {
                message: "writer lock poisoned".into(),
            })?;
            self.release_all_connections();
            // Swap in a throwaway in-memory handle so the file closes
            // before deletion.
            *conn = Connection::open_in_memory()?;
            remove_database_files(&self.path);
            *conn = Self::configure(Connection::open(&self.path)?, false)?;
        }
        self.create_schema()
    }

    /// Write the deferred-rebuild marker consumed at next startup.
    pub fn request_rebuild(&self) {
        let marker = rebuild_marker_path(&self.path);
        if let Err(e) = std::fs::write(&marker, b"rebuild") {
            warn!(error = %e, "failed to write rebuild marker");
        }
    }

    /// Replace the database file with `snapshot` and reopen.
    ///
    /// Used when a local pre-seeded snapshot is newer than the current
    /// content; callers must hold no open transactions.
    pub fn install_snapshot(&self, snapshot: &Path) -> Result<(), RevocationError> {
        let writer = self.writer.as_ref().ok_or_else(|| RevocationError::Config {
            message: "read-only instance cannot install a snapshot".into(),
        })?;
        let mut conn = writer.lock().map_err(|_| RevocationError::Corruption {
            message: "writer lock poisoned".into(),
        })?;
        self.release_all_connections();
        *conn = Connection::open_in_memory()?;
        // The live file's WAL sidecars must go before the copy: a stale WAL
        // left behind would be recovered over the fresh snapshot on reopen.
        remove_database_files(&self.path);
        copy_database_files(snapshot, &self.path).map_err(|e| RevocationError::Corruption {
            message: format!("snapshot install failed: {e}"),
        })?;
        *conn = Self::configure(Connection::open(&self.path)?, false)?;
        drop(conn);
        self.refresh_schema_version();
        Ok(())
    }

    // ---- memoized schema version ------------------------------------------

    /// Schema version, memoized process-wide after the first successful
    /// read so the hot lookup path never pays a database round trip.
    pub fn schema_version(&self) -> i64 {
        self.schema_init.call_once(|| {
            let v = self.read_schema_version().unwrap_or(0);
            self.schema_version.store(v, Ordering::Release);
        });
        self.schema_version.load(Ordering::Acquire)
    }

    /// Re-read the schema version, synchronously after a local write or
    /// asynchronously on a cross-process change notification.
    pub fn refresh_schema_version(&self) {
        let v = self.read_schema_version().unwrap_or(0);
        self.schema_init.call_once(|| {});
        self.schema_version.store(v, Ordering::Release);
    }

    fn read_schema_version(&self) -> Option<i64> {
        self.with_read(|conn| Ok(admin_get_int(conn, admin_keys::DB_VERSION)?))
            .ok()
            .flatten()
    }

    // ---- admin convenience ------------------------------------------------

    /// Current content version (0 when the database has never been fed).
    pub fn content_version(&self) -> Result<u64, RevocationError> {
        self.with_read(|conn| {
            Ok(admin_get_int(conn, admin_keys::VERSION)?.unwrap_or(0).max(0) as u64)
        })
    }

    /// Wire format version the stored data was decoded from.
    pub fn wire_format(&self) -> Result<u32, RevocationError> {
        self.with_read(|conn| {
            Ok(admin_get_int(conn, admin_keys::DB_FORMAT)?.unwrap_or(0).max(0) as u32)
        })
    }

    /// Identity of the server the stored data came from.
    pub fn update_source(&self) -> Result<Option<String>, RevocationError> {
        self.with_read(|conn| {
            Ok(admin_get_blob(conn, admin_keys::DB_SOURCE)?
                .and_then(|b| String::from_utf8(b).ok()))
        })
    }

    /// Record the update-source server identity.
    pub fn set_update_source(&self, server: &str) -> Result<(), RevocationError> {
        self.with_write(|tx| admin_set_blob(tx, admin_keys::DB_SOURCE, server.as_bytes()))
    }

    /// Next scheduled update check, Unix seconds.
    pub fn next_update(&self) -> Result<Option<i64>, RevocationError> {
        self.with_read(|conn| Ok(admin_get_int(conn, admin_keys::CHECK_AGAIN)?))
    }

    /// Persist the next scheduled update check.
    pub fn set_next_update(&self, when: i64) -> Result<(), RevocationError> {
        self.with_write(|tx| admin_set_int(tx, admin_keys::CHECK_AGAIN, when))
    }
}

fn path_with_suffix(db: &Path, suffix: &str) -> PathBuf {
    let mut os = db.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Remove the database file along with its WAL sidecar files.
fn remove_database_files(db: &Path) {
    let _ = std::fs::remove_file(db);
    for suffix in ["-wal", "-shm"] {
        let _ = std::fs::remove_file(path_with_suffix(db, suffix));
    }
}

/// Copy a database file together with any WAL sidecars it carries.
fn copy_database_files(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::copy(src, dst)?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = path_with_suffix(src, suffix);
        if sidecar.exists() {
            std::fs::copy(&sidecar, path_with_suffix(dst, suffix))?;
        }
    }
    Ok(())
}

fn rebuild_marker_path(db: &Path) -> PathBuf {
    path_with_suffix(db, ".rebuild")
}

fn migrate_v6(tx: &Transaction<'_>) -> Result<(), RevocationError> {
    debug!("schema v6: adding date-constraint table");
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS dates (
            groupid   INTEGER PRIMARY KEY NOT NULL,
            notbefore REAL NOT NULL,
            notafter  REAL NOT NULL
        );",
    )?;
    admin_set_int(tx, admin_keys::DB_VERSION, 6)
}

fn migrate_v7(tx: &Transaction<'_>) -> Result<(), RevocationError> {
    debug!("schema v7: replacing trigger cascade with explicit deletes");
    tx.execute_batch("DROP TRIGGER IF EXISTS group_cascade_delete;")?;
    admin_set_int(tx, admin_keys::DB_VERSION, 7)
}

// ---- admin rows ------------------------------------------------------------

/// Read an integer admin value.
pub fn admin_get_int(conn: &Connection, key: &str) -> Result<Option<i64>, rusqlite::Error> {
    conn.prepare_cached("SELECT ival FROM admin WHERE key = ?1")?
        .query_row(params![key], |r| r.get(0))
        .optional()
}

/// Upsert an integer admin value.
pub fn admin_set_int(conn: &Connection, key: &str, ival: i64) -> Result<(), RevocationError> {
    conn.prepare_cached(
        "INSERT INTO admin (key, ival, value) VALUES (?1, ?2, NULL)
         ON CONFLICT(key) DO UPDATE SET ival = excluded.ival",
    )?
    .execute(params![key, ival])?;
    Ok(())
}

/// Read a blob admin value.
pub fn admin_get_blob(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>, rusqlite::Error> {
    conn.prepare_cached("SELECT value FROM admin WHERE key = ?1")?
        .query_row(params![key], |r| r.get(0))
        .optional()
}

/// Upsert a blob admin value.
pub fn admin_set_blob(conn: &Connection, key: &str, value: &[u8]) -> Result<(), RevocationError> {
    conn.prepare_cached(
        "INSERT INTO admin (key, ival, value) VALUES (?1, 0, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )?
    .execute(params![key, value])?;
    Ok(())
}

// ---- issuer / group rows ----------------------------------------------------

/// Resolve an issuer digest to its group id.
pub fn group_id_for_issuer(
    conn: &Connection,
    issuer_hash: &[u8],
) -> Result<Option<i64>, rusqlite::Error> {
    conn.prepare_cached("SELECT groupid FROM issuers WHERE issuer_hash = ?1")?
        .query_row(params![issuer_hash], |r| r.get(0))
        .optional()
}

/// Read a group row by id.
pub fn group_row(conn: &Connection, groupid: i64) -> Result<Option<GroupRow>, RevocationError> {
    let row = conn
        .prepare_cached("SELECT flags, format, data FROM groups WHERE groupid = ?1")?
        .query_row(params![groupid], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<Vec<u8>>>(2)?,
            ))
        })
        .optional()?;
    match row {
        None => Ok(None),
        Some((flags, format, data)) => {
            let format = RevocationFormat::from_i64(format).ok_or_else(|| {
                RevocationError::Corruption {
                    message: format!("group {groupid} has unknown format {format}"),
                }
            })?;
            Ok(Some(GroupRow {
                groupid,
                flags: GroupFlags::from_bits(flags.max(0) as u32),
                format,
                data,
            }))
        },
    }
}

/// Insert a new group row, returning its assigned id.
pub fn insert_group(
    conn: &Connection,
    flags: GroupFlags,
    format: RevocationFormat,
    data: Option<&[u8]>,
) -> Result<i64, RevocationError> {
    conn.prepare_cached("INSERT INTO groups (flags, format, data) VALUES (?1, ?2, ?3)")?
        .execute(params![i64::from(flags.bits()), format.as_i64(), data])?;
    Ok(conn.last_insert_rowid())
}

/// Update an existing group row in place.
pub fn update_group(
    conn: &Connection,
    groupid: i64,
    flags: GroupFlags,
    format: RevocationFormat,
    data: Option<&[u8]>,
) -> Result<(), RevocationError> {
    conn.prepare_cached("UPDATE groups SET flags = ?2, format = ?3, data = ?4 WHERE groupid = ?1")?
        .execute(params![groupid, i64::from(flags.bits()), format.as_i64(), data])?;
    Ok(())
}

/// Delete a group and, in the same transaction, every dependent row.
pub fn delete_group(conn: &Connection, groupid: i64) -> Result<(), RevocationError> {
    for sql in [
        "DELETE FROM serials WHERE groupid = ?1",
        "DELETE FROM hashes WHERE groupid = ?1",
        "DELETE FROM issuers WHERE groupid = ?1",
        "DELETE FROM dates WHERE groupid = ?1",
        "DELETE FROM groups WHERE groupid = ?1",
    ] {
        conn.prepare_cached(sql)?.execute(params![groupid])?;
    }
    Ok(())
}

/// Delete every group (full-update reset), cascading to all dependents.
pub fn delete_all_groups(conn: &Connection) -> Result<(), RevocationError> {
    conn.execute_batch(
        "DELETE FROM serials; DELETE FROM hashes; DELETE FROM issuers;
         DELETE FROM dates; DELETE FROM groups;",
    )?;
    Ok(())
}

/// Map an issuer digest to a group, replacing any previous mapping.
pub fn insert_issuer(
    conn: &Connection,
    groupid: i64,
    issuer_hash: &[u8],
) -> Result<(), RevocationError> {
    conn.prepare_cached("INSERT OR REPLACE INTO issuers (groupid, issuer_hash) VALUES (?1, ?2)")?
        .execute(params![groupid, issuer_hash])?;
    Ok(())
}

/// Remove every issuer mapping of a group (the issuer set is always
/// replaced, never merged).
pub fn delete_issuers_for_group(conn: &Connection, groupid: i64) -> Result<(), RevocationError> {
    conn.prepare_cached("DELETE FROM issuers WHERE groupid = ?1")?
        .execute(params![groupid])?;
    Ok(())
}

// ---- identifier rows --------------------------------------------------------

/// Insert a serial into a serial-list group.
pub fn insert_serial(conn: &Connection, groupid: i64, serial: &[u8]) -> Result<(), RevocationError> {
    conn.prepare_cached("INSERT OR IGNORE INTO serials (groupid, serial) VALUES (?1, ?2)")?
        .execute(params![groupid, serial])?;
    Ok(())
}

/// Remove a serial from a serial-list group.
pub fn delete_serial(conn: &Connection, groupid: i64, serial: &[u8]) -> Result<(), RevocationError> {
    conn.prepare_cached("DELETE FROM serials WHERE groupid = ?1 AND serial = ?2")?
        .execute(params![groupid, serial])?;
    Ok(())
}

/// Remove every serial of a group (wildcard delete).
pub fn delete_all_serials(conn: &Connection, groupid: i64) -> Result<(), RevocationError> {
    conn.prepare_cached("DELETE FROM serials WHERE groupid = ?1")?
        .execute(params![groupid])?;
    Ok(())
}

/// Exact serial membership test.
pub fn has_serial(conn: &Connection, groupid: i64, serial: &[u8]) -> Result<bool, rusqlite::Error> {
    conn.prepare_cached("SELECT 1 FROM serials WHERE groupid = ?1 AND serial = ?2")?
        .query_row(params![groupid, serial], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
}

/// Insert a certificate digest into a hash-list group.
pub fn insert_hash(conn: &Connection, groupid: i64, sha256: &[u8]) -> Result<(), RevocationError> {
    conn.prepare_cached("INSERT OR IGNORE INTO hashes (groupid, sha256) VALUES (?1, ?2)")?
        .execute(params![groupid, sha256])?;
    Ok(())
}

/// Remove a certificate digest from a hash-list group.
pub fn delete_hash(conn: &Connection, groupid: i64, sha256: &[u8]) -> Result<(), RevocationError> {
    conn.prepare_cached("DELETE FROM hashes WHERE groupid = ?1 AND sha256 = ?2")?
        .execute(params![groupid, sha256])?;
    Ok(())
}

/// Remove every digest of a group (wildcard delete).
pub fn delete_all_hashes(conn: &Connection, groupid: i64) -> Result<(), RevocationError> {
    conn.prepare_cached("DELETE FROM hashes WHERE groupid = ?1")?
        .execute(params![groupid])?;
    Ok(())
}

/// Exact digest membership test.
pub fn has_hash(conn: &Connection, groupid: i64, sha256: &[u8]) -> Result<bool, rusqlite::Error> {
    conn.prepare_cached("SELECT 1 FROM hashes WHERE groupid = ?1 AND sha256 = ?2")?
        .query_row(params![groupid, sha256], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
}

// ---- date constraints -------------------------------------------------------

/// Read a group's date constraints.
pub fn get_dates(conn: &Connection, groupid: i64) -> Result<Option<(f64, f64)>, rusqlite::Error> {
    conn.prepare_cached("SELECT notbefore, notafter FROM dates WHERE groupid = ?1")?
        .query_row(params![groupid], |r| Ok((r.get(0)?, r.get(1)?)))
        .optional()
}

/// Write (or replace) a group's date constraints.
pub fn set_dates(
    conn: &Connection,
    groupid: i64,
    notbefore: f64,
    notafter: f64,
) -> Result<(), RevocationError> {
    conn.prepare_cached("INSERT OR REPLACE INTO dates (groupid, notbefore, notafter) VALUES (?1, ?2, ?3)")?
        .execute(params![groupid, notbefore, notafter])?;
    Ok(())
}
