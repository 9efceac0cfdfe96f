pub mod catalog;
pub mod config;
pub mod date_util;
pub mod error;
pub mod http;
pub mod storage;
pub mod sync;

pub use catalog::{ReportCategory, ReportDescriptor, StreamSpec};
pub use config::Config;
pub use error::{Error, Result};
pub use storage::Database;
pub use sync::emit::{JsonLinesSink, PassThroughTransform, RecordSink, RecordTransform};
pub use sync::window::TimeWindow;
pub use sync::{NoopProgress, SyncProgress, SyncReport, SyncStatus};

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::{Bookmark, SyncRun};

use sync::client::ReportClient;
use sync::syncer::{self, SyncContext};

/// Main entry point: state database plus the rate-limited report client.
pub struct Extractor {
    db: Database,
    client: ReportClient,
    config: Config,
}

impl Extractor {
    pub fn new(db: Database, client: ReportClient, config: Config) -> Self {
        Self { db, client, config }
    }

    /// Build the reqwest-backed client from `config`.
    pub fn from_config(db: Database, config: Config) -> Result<Self> {
        let client = ReportClient::from_config(&config)?;
        Ok(Self::new(db, client, config))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Streams to sync: `only` when non-empty, else the config's `reports`,
    /// else the default set.
    pub fn selected_streams(&self, only: &[String]) -> Result<Vec<&'static StreamSpec>> {
        if only.is_empty() {
            catalog::select_streams(self.config.reports.as_deref())
        } else {
            catalog::select_streams(Some(only))
        }
    }

    // ── Sync commands ──────────────────────────────────────────────

    pub async fn sync_streams(
        &self,
        streams: &[&'static StreamSpec],
        transform: &dyn RecordTransform,
        sink: &mut dyn RecordSink,
        progress: &dyn SyncProgress,
    ) -> Result<Vec<SyncReport>> {
        let ctx = SyncContext {
            db: &self.db,
            client: &self.client,
            config: &self.config,
            transform,
            progress,
        };
        syncer::sync_streams(&ctx, streams, sink).await
    }

    /// Sync the configured streams with the pass-through transform.
    pub async fn sync_all(
        &self,
        sink: &mut dyn RecordSink,
        progress: &dyn SyncProgress,
    ) -> Result<Vec<SyncReport>> {
        let streams = self.selected_streams(&[])?;
        self.sync_streams(&streams, &PassThroughTransform, sink, progress)
            .await
    }
}
