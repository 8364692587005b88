use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::types::{title_from_markdown, Note};

/// Auto-detect the Joplin SQLite database path.
/// Returns None if not found; the caller should ask the user for a path.
pub fn detect_joplin_db_path() -> Option<PathBuf> {
    #[allow(unused_mut)]
    let mut candidates: Vec<PathBuf> = Vec::new();

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(PathBuf::from(&home).join(".config/joplin-desktop/database.sqlite"));
            candidates.push(PathBuf::from(&home).join(".config/joplin/database.sqlite"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(profile) = std::env::var("USERPROFILE") {
            candidates.push(PathBuf::from(&profile).join(".config").join("joplin-desktop").join("database.sqlite"));
        }
        // Older/portable installs.
        if let Ok(app_data) = std::env::var("APPDATA") {
            candidates.push(PathBuf::from(&app_data).join("Joplin").join("database.sqlite"));
        }
    }

    candidates.into_iter().find(|p| p.exists())
}

/// Open the Joplin SQLite database read-only.
/// WAL must be set before query_only; query_only blocks pragma writes too.
pub fn open_joplin_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open Joplin database at {}", path.display()))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA query_only = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(conn)
}

const NOTE_COLUMNS: &str = "id, title, body, created_time, updated_time";

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let body: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
    let stored_title: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
    let title = if stored_title.trim().is_empty() {
        title_from_markdown(&body).unwrap_or_default()
    } else {
        stored_title
    };
    Ok(Note {
        id: row.get(0)?,
        title,
        content: body,
        created_time: row.get(3)?,
        updated_time: row.get(4)?,
        access_count: None,
        last_accessed_time: None,
    })
}

fn query_notes<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(sql)?;
    let notes = stmt
        .query_map(params, row_to_note)?
        .filter_map(|r| {
            r.map_err(|e| tracing::warn!("Skipping malformed row: {e}"))
                .ok()
        })
        .collect();
    Ok(notes)
}

/// All live, non-conflict notes, most recently updated first.
pub fn get_all_notes(conn: &Connection) -> Result<Vec<Note>> {
    query_notes(
        conn,
        &format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE is_conflict = 0
               AND deleted_time = 0
             ORDER BY updated_time DESC"
        ),
        [],
    )
}

/// Notes updated after `since_ms` (Unix ms).
pub fn get_notes_since(conn: &Connection, since_ms: i64) -> Result<Vec<Note>> {
    query_notes(
        conn,
        &format!(
            "SELECT {NOTE_COLUMNS}
             FROM notes
             WHERE is_conflict = 0
               AND deleted_time = 0
               AND updated_time > ?1
             ORDER BY updated_time DESC"
        ),
        [since_ms],
    )
}

/// IDs of notes soft-deleted after `since_ms`.
/// Joplin sets deleted_time to a non-zero Unix ms timestamp on soft-delete.
pub fn get_deleted_note_ids_since(conn: &Connection, since_ms: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id
         FROM notes
         WHERE is_conflict = 0
           AND deleted_time > ?1",
    )?;
    let ids = stmt
        .query_map([since_ms], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(ids)
}

/// Snapshot of the collection with access statistics merged in.
pub fn load_notes(joplin: &Connection, access: Option<&AccessLog>) -> Result<Vec<Note>> {
    let mut notes = get_all_notes(joplin)?;
    if let Some(log) = access {
        log.apply_to(&mut notes)?;
    }
    Ok(notes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    pub access_count: u32,
    pub last_accessed_time: i64,
}

/// Writable store of how often and when each note was opened.
/// Kept apart from the Joplin database, which is only ever read.
pub struct AccessLog {
    conn: Connection,
}

impl AccessLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open access log at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS note_access (
                 note_id            TEXT PRIMARY KEY,
                 access_count       INTEGER NOT NULL DEFAULT 0,
                 last_accessed_time INTEGER NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }

    pub fn record(&self, note_id: &str, at_ms: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO note_access (note_id, access_count, last_accessed_time)
             VALUES (?1, 1, ?2)
             ON CONFLICT(note_id) DO UPDATE SET
                 access_count = access_count + 1,
                 last_accessed_time = max(last_accessed_time, excluded.last_accessed_time)",
            params![note_id, at_ms],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<HashMap<String, AccessStats>> {
        let mut stmt = self
            .conn
            .prepare("SELECT note_id, access_count, last_accessed_time FROM note_access")?;
        let stats = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    AccessStats {
                        access_count: row.get::<_, i64>(1)?.clamp(0, u32::MAX as i64) as u32,
                        last_accessed_time: row.get(2)?,
                    },
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(stats)
    }

    pub fn apply_to(&self, notes: &mut [Note]) -> Result<()> {
        let stats = self.stats()?;
        for note in notes.iter_mut() {
            if let Some(s) = stats.get(&note.id) {
                note.access_count = Some(s.access_count);
                note.last_accessed_time = Some(s.last_accessed_time);
            }
        }
        Ok(())
    }
}
