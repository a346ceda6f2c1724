//! Local SQLite ledger for the delivery board.
//!
//! Orders are never stored locally. The only durable rows are uploaded
//! proof assets whose order update failed and whose compensating delete
//! also failed; `cleanup` retries them later.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

const DB_FILE: &str = "delivery-board.db";

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Database connection plus the file it lives in.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// An uploaded asset that no order references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCleanup {
    pub id: String,
    pub asset_id: String,
    pub order_id: String,
    pub reason: String,
    pub recorded_at: String,
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Initialize the database at `{data_dir}/delivery-board.db`.
///
/// On open failure the file is deleted and opened again once; the ledger
/// only holds cleanup hints, so losing it is acceptable.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join(DB_FILE);
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// In-memory database with the full schema.
pub fn open_in_memory() -> Result<DbState> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&conn)?;
    Ok(DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pending_asset_cleanup (
            id TEXT PRIMARY KEY,
            asset_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_pending_asset_cleanup_asset
            ON pending_asset_cleanup(asset_id);
        INSERT INTO schema_version (version) VALUES (1);",
    )?;
    Ok(())
}

fn lock(db: &DbState) -> Result<std::sync::MutexGuard<'_, Connection>> {
    db.conn.lock().map_err(|e| Error::Database(e.to_string()))
}

/// Record an orphaned asset.
pub fn record_pending_cleanup(
    db: &DbState,
    asset_id: &str,
    order_id: &str,
    reason: &str,
) -> Result<PendingCleanup> {
    let entry = PendingCleanup {
        id: Uuid::new_v4().to_string(),
        asset_id: asset_id.to_string(),
        order_id: order_id.to_string(),
        reason: reason.to_string(),
        recorded_at: Utc::now().to_rfc3339(),
        attempts: 0,
        last_error: None,
    };
    let conn = lock(db)?;
    conn.execute(
        "INSERT INTO pending_asset_cleanup (id, asset_id, order_id, reason, recorded_at, attempts)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            entry.id,
            entry.asset_id,
            entry.order_id,
            entry.reason,
            entry.recorded_at
        ],
    )?;
    warn!(asset_id, order_id, "orphaned proof asset recorded for cleanup");
    Ok(entry)
}

/// All pending entries, oldest first.
pub fn list_pending_cleanup(db: &DbState) -> Result<Vec<PendingCleanup>> {
    let conn = lock(db)?;
    let mut stmt = conn.prepare(
        "SELECT id, asset_id, order_id, reason, recorded_at, attempts, last_error
         FROM pending_asset_cleanup
         ORDER BY recorded_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PendingCleanup {
            id: row.get(0)?,
            asset_id: row.get(1)?,
            order_id: row.get(2)?,
            reason: row.get(3)?,
            recorded_at: row.get(4)?,
            attempts: row.get(5)?,
            last_error: row.get(6)?,
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn remove_pending_cleanup(db: &DbState, id: &str) -> Result<()> {
    let conn = lock(db)?;
    conn.execute(
        "DELETE FROM pending_asset_cleanup WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Count a failed cleanup attempt against an entry.
pub fn mark_cleanup_attempt(db: &DbState, id: &str, error: &str) -> Result<()> {
    let conn = lock(db)?;
    conn.execute(
        "UPDATE pending_asset_cleanup
         SET attempts = attempts + 1, last_error = ?2
         WHERE id = ?1",
        params![id, error],
    )?;
    Ok(())
}
