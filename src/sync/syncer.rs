use chrono::{DateTime, Duration, Utc};

use crate::catalog::{StreamSpec, RAW_REPORTS_DEFAULT_LOOKBACK_DAYS};
use crate::config::Config;
use crate::date_util::{format_timestamp, parse_timestamp, truncate_to_midnight, truncate_to_minute};
use crate::error::Result;
use crate::storage::repository;
use crate::storage::Database;
use crate::sync::client::ReportClient;
use crate::sync::decoder::TableDecoder;
use crate::sync::emit::{RecordSink, RecordTransform};
use crate::sync::window::{plan_windows, TimeWindow};
use crate::sync::{SyncProgress, SyncReport, SyncStatus};

/// `app_config` key naming the stream a run is working on.
pub const CURRENTLY_SYNCING_KEY: &str = "currently_syncing";

/// Resume this far before the stored bookmark so rows stamped within the
/// bookmark's minute (sub-second precision is lost) are fetched again.
pub const BOOKMARK_REWIND_MINUTES: i64 = 1;

/// Everything a stream sync needs besides the stream and the sink.
pub struct SyncContext<'a> {
    pub db: &'a Database,
    pub client: &'a ReportClient,
    pub config: &'a Config,
    pub transform: &'a dyn RecordTransform,
    pub progress: &'a dyn SyncProgress,
}

/// Earliest time to request: the bookmark if there is one, else the configured
/// start date, else midnight `RAW_REPORTS_DEFAULT_LOOKBACK_DAYS` days ago;
/// then rewound by [`BOOKMARK_REWIND_MINUTES`].
pub fn resolve_start_time(
    config: &Config,
    bookmark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let default_start = match config.start_time()? {
        Some(start) => start,
        None => truncate_to_midnight(now) - Duration::days(RAW_REPORTS_DEFAULT_LOOKBACK_DAYS),
    };
    let start = bookmark.unwrap_or(default_start);
    Ok(start - Duration::minutes(BOOKMARK_REWIND_MINUTES))
}

pub fn resolve_end_time(config: &Config, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(config
        .end_time()?
        .unwrap_or_else(|| truncate_to_minute(now)))
}

pub async fn read_bookmark(db: &Database, stream_id: &str) -> Result<Option<DateTime<Utc>>> {
    let stream_id = stream_id.to_string();
    let value = db
        .reader()
        .call(move |conn| repository::get_bookmark(conn, &stream_id))
        .await?;
    value.as_deref().map(parse_timestamp).transpose()
}

/// Persist `value` as the stream's bookmark unless that would move it
/// backwards. Returns whether the bookmark was written.
pub async fn commit_bookmark(
    db: &Database,
    stream: &'static StreamSpec,
    value: DateTime<Utc>,
) -> Result<bool> {
    let stream_id = stream.stream_id;
    let replication_key = stream.replication_key;

    let previous = db
        .writer()
        .call(move |conn| repository::get_bookmark(conn, stream_id))
        .await?;
    if let Some(prev) = previous.as_deref() {
        match parse_timestamp(prev) {
            Ok(prev_ts) if prev_ts > value => {
                log::warn!(
                    "stream={stream_id} keeping bookmark {prev}, refusing to move it back to {}",
                    format_timestamp(value)
                );
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => log::warn!("stream={stream_id} replacing unreadable bookmark: {e}"),
        }
    }

    let new_value = format_timestamp(value);
    log::info!("stream={stream_id} bookmark {replication_key}={new_value}");
    db.writer()
        .call(move |conn| repository::set_bookmark(conn, stream_id, replication_key, &new_value))
        .await?;
    Ok(true)
}

#[derive(Debug, Default)]
struct RunCounts {
    rows: u64,
    windows: u32,
}

/// Fetch, decode and emit every window in order.
async fn emit_windows(
    ctx: &SyncContext<'_>,
    stream: &'static StreamSpec,
    windows: &[TimeWindow],
    sink: &mut dyn RecordSink,
    time_extracted: DateTime<Utc>,
    counts: &mut RunCounts,
) -> Result<()> {
    let decoder = TableDecoder::new(stream.report.field_order);
    let total = windows.len();

    for (i, window) in windows.iter().enumerate() {
        ctx.progress.on_window_start(stream.stream_id, i, total, window);
        let body = ctx
            .client
            .fetch(stream.report, window, stream.retargeting)
            .await?;

        let mut window_rows = 0u64;
        for row in decoder.rows(&body) {
            let record = ctx.transform.transform(&row?);
            sink.write_record(stream.stream_id, &record, time_extracted)?;
            window_rows += 1;
            counts.rows += 1;
        }
        counts.windows += 1;

        log::debug!(
            "stream={} window {}/{} rows={window_rows}",
            stream.stream_id,
            i + 1,
            total
        );
        ctx.progress.on_window_complete(stream.stream_id, i, total, window_rows);
    }
    Ok(())
}

/// Sync one stream from its bookmark (or default start) up to the resolved
/// end time. The bookmark is written only once every window has been emitted.
pub async fn sync_stream(
    ctx: &SyncContext<'_>,
    stream: &'static StreamSpec,
    sink: &mut dyn RecordSink,
    now: DateTime<Utc>,
) -> Result<SyncReport> {
    let stream_id = stream.stream_id;
    ctx.db
        .writer()
        .call(move |conn| repository::set_config(conn, CURRENTLY_SYNCING_KEY, stream_id))
        .await?;

    let bookmark = read_bookmark(ctx.db, stream_id).await?;
    let start = resolve_start_time(ctx.config, bookmark, now)?;
    let end = resolve_end_time(ctx.config, now)?;
    let windows = plan_windows(stream.report.report_id, start, end)?;
    let windows_total = windows.len() as u32;

    log::info!(
        "stream={stream_id} report={} start={} end={} windows={windows_total}",
        stream.report.report_id,
        format_timestamp(start),
        format_timestamp(end)
    );
    ctx.progress.on_stream_start(stream_id, start, end, windows.len());

    let range_start = format_timestamp(start);
    let range_end = format_timestamp(end);
    let run_id = ctx
        .db
        .writer()
        .call(move |conn| {
            repository::insert_sync_run(conn, stream_id, &range_start, &range_end, windows_total)
        })
        .await?;

    let mut counts = RunCounts::default();
    let outcome = emit_windows(ctx, stream, &windows, sink, end, &mut counts).await;
    let (rows, done) = (counts.rows, counts.windows);

    if let Err(e) = outcome {
        let message = e.to_string();
        log::error!(
            "stream={stream_id} failed after {done}/{windows_total} windows, bookmark unchanged: {message}"
        );
        if let Err(db_err) = ctx
            .db
            .writer()
            .call(move |conn| {
                repository::update_sync_run(
                    conn,
                    run_id,
                    SyncStatus::Failed.as_str(),
                    rows,
                    done,
                    Some(message.as_str()),
                )
            })
            .await
        {
            log::warn!("could not record failure of sync run {run_id}: {db_err}");
        }
        return Err(e);
    }

    commit_bookmark(ctx.db, stream, end).await?;
    let (bookmarks, bookmark) = ctx
        .db
        .writer()
        .call(move |conn| {
            repository::update_sync_run(conn, run_id, SyncStatus::Success.as_str(), rows, done, None)?;
            let bookmark = repository::get_bookmark(conn, stream_id)?;
            Ok::<_, rusqlite::Error>((repository::list_bookmarks(conn)?, bookmark))
        })
        .await?;
    sink.write_state(&bookmarks)?;

    let report = SyncReport {
        stream_id: stream_id.to_string(),
        status: SyncStatus::Success,
        range_start: start,
        range_end: end,
        rows_emitted: rows,
        windows_completed: done,
        windows_total,
        bookmark,
        error: None,
    };
    log::info!("stream={stream_id} done rows={rows} windows={done}");
    ctx.progress.on_stream_complete(&report);
    Ok(report)
}

/// Sync `streams` one after another. The first error stops the run; streams
/// after it are not attempted.
pub async fn sync_streams(
    ctx: &SyncContext<'_>,
    streams: &[&'static StreamSpec],
    sink: &mut dyn RecordSink,
) -> Result<Vec<SyncReport>> {
    let interrupted = ctx
        .db
        .reader()
        .call(|conn| repository::get_config(conn, CURRENTLY_SYNCING_KEY))
        .await?;
    if let Some(stream_id) = interrupted {
        log::warn!("previous run stopped while syncing {stream_id}; its range will be fetched again");
    }

    let ids: Vec<&str> = streams.iter().map(|s| s.stream_id).collect();
    log::info!("streams to sync: {}", ids.join(", "));

    let now = Utc::now();
    let mut reports = Vec::with_capacity(streams.len());
    for &stream in streams {
        reports.push(sync_stream(ctx, stream, sink, now).await?);
    }

    ctx.db
        .writer()
        .call(|conn| repository::delete_config(conn, CURRENTLY_SYNCING_KEY))
        .await?;
    Ok(reports)
}
