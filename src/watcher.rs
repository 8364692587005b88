use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::debounce::Debouncer;
use crate::types::Note;

/// Where the collection lives and how eagerly to look for changes.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub db_path: PathBuf,
    pub access_log_path: Option<PathBuf>,
    /// How often to stat the database files.
    pub poll: Duration,
    /// Quiet period after the last change before reloading.
    /// Joplin may write several times during a single save.
    pub quiet: Duration,
}

/// A fresh snapshot plus what changed since the previous one.
#[derive(Debug, Clone)]
pub struct CollectionUpdate {
    pub notes: Arc<Vec<Note>>,
    pub changed: Vec<Note>,
    pub deleted: Vec<String>,
    /// Pass back as `since_ms` on the next refresh.
    pub scan_timestamp: i64,
}

/// Load a snapshot and the delta since `since_ms`.
pub fn refresh(config: &WatchConfig, since_ms: i64) -> Result<CollectionUpdate> {
    let conn = crate::db::open_joplin_db(&config.db_path)?;
    let access = match &config.access_log_path {
        Some(path) => Some(crate::db::AccessLog::open(path)?),
        None => None,
    };
    let notes = crate::db::load_notes(&conn, access.as_ref())?;
    let changed = crate::db::get_notes_since(&conn, since_ms)?;
    let deleted = crate::db::get_deleted_note_ids_since(&conn, since_ms)?;

    let max_ts = changed.iter().map(|n| n.updated_time).max().unwrap_or(since_ms);
    // Step back 1ms so a note saved in the same millisecond as the boundary is
    // picked up again next time.
    let scan_timestamp = since_ms.max(max_ts.saturating_sub(1));

    // Changed notes carry no access stats; take them from the snapshot.
    let changed = changed
        .into_iter()
        .map(|c| notes.iter().find(|n| n.id == c.id).cloned().unwrap_or(c))
        .collect();

    Ok(CollectionUpdate {
        notes: Arc::new(notes),
        changed,
        deleted,
        scan_timestamp,
    })
}

/// Start polling the database for changes. Updates are sent on `tx`; the task ends
/// when the receiver is dropped.
pub fn spawn_collection_watcher(
    config: WatchConfig,
    since_ms: i64,
    tx: mpsc::Sender<CollectionUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        watch_loop(config, since_ms, tx).await;
    })
}

async fn watch_loop(config: WatchConfig, mut since_ms: i64, tx: mpsc::Sender<CollectionUpdate>) {
    let mut last_modified: Option<SystemTime> = None;
    let mut debounce = Debouncer::new(config.quiet);

    loop {
        tokio::time::sleep(config.poll).await;
        if tx.is_closed() {
            return;
        }

        let current = latest_mtime(&watched_files(&config));
        let (seen, changed) = detect_change(last_modified, current);
        last_modified = seen;

        let now = tokio::time::Instant::now().into_std();
        if changed {
            debounce.touch(now);
        }
        if !debounce.poll(now) {
            continue;
        }

        let worker_config = config.clone();
        let result =
            tokio::task::spawn_blocking(move || refresh(&worker_config, since_ms)).await;
        match result {
            Ok(Ok(update)) => {
                tracing::debug!(
                    "Collection refreshed: {} notes, {} changed, {} deleted",
                    update.notes.len(),
                    update.changed.len(),
                    update.deleted.len()
                );
                since_ms = update.scan_timestamp;
                if tx.send(update).await.is_err() {
                    return;
                }
            }
            Ok(Err(e)) => tracing::warn!("Collection refresh failed: {e}"),
            Err(e) => tracing::warn!("Collection refresh task failed: {e}"),
        }
    }
}

/// The database, its WAL (Joplin writes land there until a checkpoint) and the
/// access log, if any.
fn watched_files(config: &WatchConfig) -> Vec<PathBuf> {
    let mut wal = config.db_path.clone().into_os_string();
    wal.push("-wal");
    let mut files = vec![config.db_path.clone(), PathBuf::from(wal)];
    files.extend(config.access_log_path.iter().cloned());
    files
}

fn latest_mtime(paths: &[PathBuf]) -> Option<SystemTime> {
    paths
        .iter()
        .filter_map(|p| std::fs::metadata(Path::new(p)).and_then(|m| m.modified()).ok())
        .max()
}

/// Compare modification times. The first observation is a baseline, not a change.
fn detect_change(
    last: Option<SystemTime>,
    current: Option<SystemTime>,
) -> (Option<SystemTime>, bool) {
    match (last, current) {
        (None, Some(t)) => (Some(t), false),
        (Some(prev), Some(cur)) if cur != prev => (Some(cur), true),
        (prev, _) => (prev, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("note-discovery-{}-{name}", std::process::id()))
    }

    #[test]
    fn first_observation_is_a_baseline() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(detect_change(None, Some(t0)), (Some(t0), false));
        assert_eq!(detect_change(Some(t0), Some(t0)), (Some(t0), false));
        assert_eq!(detect_change(Some(t0), Some(t1)), (Some(t1), true));
        assert_eq!(detect_change(Some(t0), None), (Some(t0), false));
    }

    #[test]
    fn wal_and_access_log_are_watched() {
        let config = WatchConfig {
            db_path: PathBuf::from("/data/database.sqlite"),
            access_log_path: Some(PathBuf::from("/data/access.sqlite")),
            poll: Duration::from_secs(10),
            quiet: Duration::from_secs(5),
        };
        assert_eq!(
            watched_files(&config),
            [
                PathBuf::from("/data/database.sqlite"),
                PathBuf::from("/data/database.sqlite-wal"),
                PathBuf::from("/data/access.sqlite"),
            ]
        );
    }

    #[test]
    fn refresh_reports_snapshot_and_delta() {
        let db_path = temp_path("refresh.sqlite");
        let access_path = temp_path("refresh-access.sqlite");
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(&access_path);

        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (
                 id TEXT PRIMARY KEY, title TEXT, body TEXT,
                 created_time INTEGER, updated_time INTEGER,
                 is_conflict INTEGER DEFAULT 0, deleted_time INTEGER DEFAULT 0
             );
             INSERT INTO notes (id, title, body, created_time, updated_time) VALUES ('old', 'Old', '', 1, 100);
             INSERT INTO notes (id, title, body, created_time, updated_time) VALUES ('new', 'New', '', 2, 500);",
        )
        .unwrap();
        drop(conn);

        crate::db::AccessLog::open(&access_path)
            .unwrap()
            .record("new", 600)
            .unwrap();

        let config = WatchConfig {
            db_path: db_path.clone(),
            access_log_path: Some(access_path.clone()),
            poll: Duration::from_secs(10),
            quiet: Duration::from_secs(5),
        };
        let update = refresh(&config, 200).unwrap();
        assert_eq!(update.notes.len(), 2);
        assert_eq!(update.changed.len(), 1);
        assert_eq!(update.changed[0].id, "new");
        assert_eq!(update.changed[0].access_count, Some(1));
        assert!(update.deleted.is_empty());
        assert_eq!(update.scan_timestamp, 499);

        let quiet = refresh(&config, update.scan_timestamp).unwrap();
        assert_eq!(quiet.changed.len(), 1, "boundary note is re-checked");
        assert_eq!(quiet.scan_timestamp, 499);

        for path in [&db_path, &access_path] {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }
}
