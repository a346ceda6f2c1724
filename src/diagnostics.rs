//! Diagnostics for the delivery board.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Local health**: schema version and the orphaned-asset backlog
//! - **Logging**: console + daily rolling file, with old files pruned

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::db::{self, DbState};
use crate::error::Result;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 7;

/// Prefix of the rolling log files (`board.YYYY-MM-DD`).
const LOG_FILE_PREFIX: &str = "board";

const DEFAULT_FILTER: &str = "info,delivery_board_lib=debug";

pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

/// Local state summary: ledger location, schema version and how many
/// orphaned uploads are waiting for cleanup.
pub fn get_local_health(db: &DbState) -> Result<Value> {
    let schema_version: i64 = {
        let conn = db
            .conn
            .lock()
            .map_err(|e| crate::error::Error::Database(e.to_string()))?;
        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?
    };
    let pending = db::list_pending_cleanup(db)?;
    Ok(json!({
        "dbPath": db.db_path.display().to_string(),
        "schemaVersion": schema_version,
        "pendingAssetCleanup": pending.len(),
        "oldestPending": pending.first().map(|p| p.recorded_at.clone()),
    }))
}

/// Initialize structured logging (console + rolling file).
///
/// The file always records at the default filter; the console shows
/// warnings only unless `verbose`. `RUST_LOG` overrides both.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the process.
pub fn init_logging(log_dir: &Path, verbose: bool) -> WorkerGuard {
    let filter = |fallback: &str| {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    let console_filter = filter(if verbose { DEFAULT_FILTER } else { "warn" });

    prune_old_logs(log_dir);
    fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter(DEFAULT_FILTER));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(console_filter);

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with(&format!("{LOG_FILE_PREFIX}.")) {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Sort newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn about_info_has_required_fields() {
        let info = get_about_info();
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
        assert!(info.get("arch").is_some());
    }

    #[test]
    fn local_health_counts_pending_cleanup() {
        let db = db::open_in_memory().expect("db");
        db::record_pending_cleanup(&db, "5", "42", "test").expect("record");
        let health = get_local_health(&db).expect("health");
        assert_eq!(health["pendingAssetCleanup"], json!(1));
        assert_eq!(health["schemaVersion"], json!(1));
    }

    #[test]
    fn prune_keeps_newest_board_logs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = SystemTime::now();
        for day in 0..(MAX_LOG_FILES + 3) {
            let path = dir.path().join(format!("board.2026-01-{:02}", day + 1));
            let file = fs::File::create(&path).expect("create log");
            file.set_modified(now - Duration::from_secs(86_400 * (20 - day as u64)))
                .expect("set mtime");
        }
        fs::write(dir.path().join("notes.txt"), "keep me").expect("write");

        prune_old_logs(dir.path());

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .expect("read dir")
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), MAX_LOG_FILES + 1);
        assert!(remaining.contains(&"notes.txt".to_string()));
        assert!(!remaining.contains(&"board.2026-01-01".to_string()));
    }
}
