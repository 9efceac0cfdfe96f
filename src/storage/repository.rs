use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

// ── Bookmarks ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub stream_id: String,
    pub replication_key: String,
    pub value: String,
    pub updated_at: String,
}

pub fn get_bookmark(conn: &Connection, stream_id: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM bookmarks WHERE stream_id = ?1",
        params![stream_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_bookmark(
    conn: &Connection,
    stream_id: &str,
    replication_key: &str,
    value: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO bookmarks (stream_id, replication_key, value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![stream_id, replication_key, value],
    )?;
    Ok(())
}

pub fn list_bookmarks(conn: &Connection) -> Result<Vec<Bookmark>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT stream_id, replication_key, value, updated_at FROM bookmarks ORDER BY stream_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Bookmark {
            stream_id: row.get(0)?,
            replication_key: row.get(1)?,
            value: row.get(2)?,
            updated_at: row.get(3)?,
        })
    })?;
    rows.collect()
}

/// Returns true if a bookmark was removed.
pub fn delete_bookmark(conn: &Connection, stream_id: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM bookmarks WHERE stream_id = ?1",
        params![stream_id],
    )?;
    Ok(n > 0)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(())
}

// ── Sync Runs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub stream_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub range_start: String,
    pub range_end: String,
    pub rows_emitted: u64,
    pub windows_completed: u32,
    pub windows_total: u32,
    pub error_message: Option<String>,
}

pub fn insert_sync_run(
    conn: &Connection,
    stream_id: &str,
    range_start: &str,
    range_end: &str,
    windows_total: u32,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (stream_id, status, started_at, range_start, range_end, windows_total)
         VALUES (?1, 'running', datetime('now'), ?2, ?3, ?4)",
        params![stream_id, range_start, range_end, windows_total],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_sync_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    rows_emitted: u64,
    windows_completed: u32,
    error_message: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_runs SET
            status = ?2, completed_at = datetime('now'),
            rows_emitted = ?3, windows_completed = ?4,
            error_message = ?5
         WHERE id = ?1",
        params![
            run_id,
            status,
            rows_emitted as i64,
            windows_completed,
            error_message,
        ],
    )?;
    Ok(())
}

/// Most recent runs first.
pub fn list_sync_runs(
    conn: &Connection,
    stream_id: Option<&str>,
    limit: u32,
) -> Result<Vec<SyncRun>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, stream_id, status, started_at, completed_at, range_start, range_end,
                rows_emitted, windows_completed, windows_total, error_message
         FROM sync_runs
         WHERE ?1 IS NULL OR stream_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![stream_id, limit], |row| {
        Ok(SyncRun {
            id: row.get(0)?,
            stream_id: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            range_start: row.get(5)?,
            range_end: row.get(6)?,
            rows_emitted: row.get::<_, i64>(7)? as u64,
            windows_completed: row.get(8)?,
            windows_total: row.get(9)?,
            error_message: row.get(10)?,
        })
    })?;
    rows.collect()
}
