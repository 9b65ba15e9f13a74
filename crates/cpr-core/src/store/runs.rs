//! Run bookkeeping: the persisted source index and manifest of each run.
//!
//! Runs are never evicted by this crate; removing a run's documents is the
//! caller's job.

use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::CprResult;
use crate::models::{Manifest, SourceIndex};
use crate::store::layout::{read_document, write_atomic, CacheLayout};

pub trait RunStore: Send + Sync {
    fn get_source_index(&self, run_id: &str) -> CprResult<Option<SourceIndex>>;

    fn put_source_index(&self, run_id: &str, index: &SourceIndex) -> CprResult<()>;

    fn get_manifest(&self, run_id: &str) -> CprResult<Option<Manifest>>;

    /// Overwrites any previous manifest for `manifest.run_id`.
    fn put_manifest(&self, manifest: &Manifest) -> CprResult<()>;
}

fn not_found_as_none<T>(result: CprResult<T>) -> CprResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(crate::errors::CprError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

/// JSON documents under `runs/<run_id>/`, the layout external readers expect.
pub struct FsRunStore {
    layout: CacheLayout,
}

impl FsRunStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }
}

impl RunStore for FsRunStore {
    fn get_source_index(&self, run_id: &str) -> CprResult<Option<SourceIndex>> {
        let path = self.layout.source_index_path(run_id)?;
        match not_found_as_none(read_document(&path, "source index"))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_source_index(&self, run_id: &str, index: &SourceIndex) -> CprResult<()> {
        let path = self.layout.source_index_path(run_id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(index)?)
    }

    fn get_manifest(&self, run_id: &str) -> CprResult<Option<Manifest>> {
        let path = self.layout.manifest_path(run_id)?;
        match not_found_as_none(read_document(&path, "manifest"))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_manifest(&self, manifest: &Manifest) -> CprResult<()> {
        let path = self.layout.manifest_path(&manifest.run_id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(manifest)?)
    }
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

/// Current run store schema version.
pub const RUN_STORE_SCHEMA_VERSION: i64 = 1;

const RUN_STORE_SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS source_indexes (
        run_id TEXT PRIMARY KEY,
        root TEXT NOT NULL,
        document TEXT NOT NULL,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS manifests (
        run_id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
];

/// SQLite-backed run bookkeeping.
///
/// Each public method opens its own connection so the store can be shared
/// across threads without connection management.
pub struct SqliteRunStore {
    db_path: PathBuf,
}

impl SqliteRunStore {
    pub fn open(db_path: impl Into<PathBuf>) -> CprResult<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        if let Some(parent) = store.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = store.connect()?;
        for stmt in RUN_STORE_SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        migrate_schema(&conn)?;
        Ok(store)
    }

    fn connect(&self) -> CprResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn get_document(&self, table: &str, run_id: &str) -> CprResult<Option<String>> {
        let conn = self.connect()?;
        let sql = format!("SELECT document FROM {table} WHERE run_id = ?1;");
        Ok(conn
            .query_row(&sql, params![run_id], |row| row.get::<_, String>(0))
            .optional()?)
    }
}

fn get_schema_version(conn: &Connection) -> i64 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i64>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i64) -> CprResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![version.to_string()],
    )?;
    Ok(())
}

/// Run any pending schema migrations.
pub fn migrate_schema(conn: &Connection) -> CprResult<()> {
    let mut current = get_schema_version(conn);
    while current < RUN_STORE_SCHEMA_VERSION {
        let next = current + 1;
        // Version 1: initial schema created by RUN_STORE_SCHEMA_STATEMENTS.
        set_schema_version(conn, next)?;
        current = next;
    }
    Ok(())
}

impl RunStore for SqliteRunStore {
    fn get_source_index(&self, run_id: &str) -> CprResult<Option<SourceIndex>> {
        match self.get_document("source_indexes", run_id)? {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn put_source_index(&self, run_id: &str, index: &SourceIndex) -> CprResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO source_indexes(run_id, root, document) VALUES(?1, ?2, ?3) \
             ON CONFLICT(run_id) DO UPDATE SET root = excluded.root, \
             document = excluded.document, updated_at = CURRENT_TIMESTAMP;",
            params![run_id, index.root, serde_json::to_string(index)?],
        )?;
        Ok(())
    }

    fn get_manifest(&self, run_id: &str) -> CprResult<Option<Manifest>> {
        match self.get_document("manifests", run_id)? {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn put_manifest(&self, manifest: &Manifest) -> CprResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO manifests(run_id, document) VALUES(?1, ?2) \
             ON CONFLICT(run_id) DO UPDATE SET document = excluded.document, \
             updated_at = CURRENT_TIMESTAMP;",
            params![manifest.run_id, serde_json::to_string(manifest)?],
        )?;
        Ok(())
    }
}
