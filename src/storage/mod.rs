pub mod repository;

use std::path::PathBuf;

use rusqlite_migration::{Migrations, M};

use crate::catalog;
use crate::date_util::{format_timestamp, parse_timestamp};
use crate::error::{Error, Result};
use crate::sync::syncer::CURRENTLY_SYNCING_KEY;

/// Directory under the home directory holding extractor state.
pub const STATE_DIR: &str = ".appsflyer-extract";
pub const STATE_DB_FILE: &str = "state.db";

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode. Bookmarks, the currently-syncing marker and run history
/// all live here.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

/// `~/.appsflyer-extract/state.db`
pub fn default_path() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
        .join(STATE_DIR);
    Ok(dir.join(STATE_DB_FILE))
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))])
}

impl Database {
    /// Open the database at the default path, creating its directory.
    pub async fn open() -> Result<Self> {
        Self::open_at(default_path()?).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("cannot create {}: {e}", parent.display())))?;
        }

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        log::debug!("opened state database at {}", path.display());
        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            migrations().to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    // ── State inspection / overrides ──────────────────────────────

    pub async fn bookmarks(&self) -> Result<Vec<repository::Bookmark>> {
        Ok(self.reader.call(|conn| repository::list_bookmarks(conn)).await?)
    }

    /// Overwrite a stream's bookmark. Unlike a sync commit this may move the
    /// bookmark backwards, which is how a range is re-extracted.
    pub async fn set_bookmark(&self, stream_id: &str, value: &str) -> Result<()> {
        let stream = catalog::stream(stream_id)?;
        let value = format_timestamp(parse_timestamp(value)?);
        log::info!("stream={} bookmark set to {value}", stream.stream_id);
        let (stream_id, replication_key) = (stream.stream_id, stream.replication_key);
        self.writer
            .call(move |conn| repository::set_bookmark(conn, stream_id, replication_key, &value))
            .await?;
        Ok(())
    }

    /// Returns true if a bookmark was removed.
    pub async fn clear_bookmark(&self, stream_id: &str) -> Result<bool> {
        let stream_id = catalog::stream(stream_id)?.stream_id;
        Ok(self
            .writer
            .call(move |conn| repository::delete_bookmark(conn, stream_id))
            .await?)
    }

    /// Stream a previous run was working on when it stopped, if any.
    pub async fn currently_syncing(&self) -> Result<Option<String>> {
        Ok(self
            .reader
            .call(|conn| repository::get_config(conn, CURRENTLY_SYNCING_KEY))
            .await?)
    }

    pub async fn sync_runs(
        &self,
        stream_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<repository::SyncRun>> {
        let stream_id = stream_id.map(str::to_string);
        Ok(self
            .reader
            .call(move |conn| repository::list_sync_runs(conn, stream_id.as_deref(), limit))
            .await?)
    }
}
