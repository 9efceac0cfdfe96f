pub mod client;
pub mod decoder;
pub mod emit;
pub mod rate_limit;
pub mod syncer;
pub mod window;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sync::window::TimeWindow;

/// Report returned after one stream has been synced.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub stream_id: String,
    pub status: SyncStatus,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub rows_emitted: u64,
    pub windows_completed: u32,
    pub windows_total: u32,
    /// Bookmark value after the run.
    pub bookmark: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    /// Value stored in `sync_runs.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Success => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Callbacks fired as a stream moves through its sync.
pub trait SyncProgress: Send + Sync {
    fn on_stream_start(
        &self,
        _stream_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _windows: usize,
    ) {
    }

    fn on_window_start(&self, _stream_id: &str, _index: usize, _total: usize, _window: &TimeWindow) {
    }

    fn on_window_complete(&self, _stream_id: &str, _index: usize, _total: usize, _rows: u64) {}

    fn on_stream_complete(&self, _report: &SyncReport) {}
}

pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
