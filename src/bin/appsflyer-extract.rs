use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use appsflyer_extract::{catalog, date_util, TimeWindow};

#[derive(Parser)]
#[command(
    name = "appsflyer-extract",
    about = "Incremental AppsFlyer Pull API extractor"
)]
struct Cli {
    /// Config file (JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// State database path (default: ~/.appsflyer-extract/state.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr; stdout carries the records.
struct StderrProgress;

impl appsflyer_extract::SyncProgress for StderrProgress {
    fn on_stream_start(
        &self,
        stream_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        windows: usize,
    ) {
        eprintln!(
            "Syncing {stream_id} from {} to {} ({windows} requests)...",
            date_util::format_timestamp(start),
            date_util::format_timestamp(end)
        );
    }

    fn on_window_start(&self, _stream_id: &str, index: usize, total: usize, window: &TimeWindow) {
        eprint!(
            "\r  [{}/{}] {} .. {}   ",
            index + 1,
            total,
            date_util::format_timestamp(window.from),
            date_util::format_timestamp(window.to)
        );
    }

    fn on_window_complete(&self, _stream_id: &str, index: usize, total: usize, _rows: u64) {
        if index + 1 == total {
            eprintln!();
        }
    }

    fn on_stream_complete(&self, report: &appsflyer_extract::SyncReport) {
        eprintln!(
            "  Done: {} rows, bookmark {}",
            report.rows_emitted,
            report.bookmark.as_deref().unwrap_or("-")
        );
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract new data and write RECORD/STATE lines to stdout
    Sync {
        /// Only sync these streams (repeatable); defaults to the config's reports
        #[arg(long = "stream", value_name = "ID")]
        streams: Vec<String>,
    },
    /// List the available streams
    Streams {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or override bookmarks
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Show recent sync runs
    Runs {
        /// Only runs of this stream
        #[arg(long)]
        stream: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Show all bookmarks
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a stream's bookmark (YYYY-MM-DDTHH:MM:SSZ)
    Set { stream: String, value: String },
    /// Remove a stream's bookmark so its next sync starts from the default
    Clear { stream: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Commands::Streams { json } = cli.command {
        return print_streams(json);
    }

    let db = match &cli.db {
        Some(path) => appsflyer_extract::Database::open_at(path).await?,
        None => appsflyer_extract::Database::open().await?,
    };

    match cli.command {
        Commands::Streams { .. } => {}
        Commands::Sync { streams } => {
            let path = cli
                .config
                .ok_or_else(|| anyhow::anyhow!("sync requires --config <FILE>"))?;
            let config = appsflyer_extract::Config::load(&path)?;
            let extractor = appsflyer_extract::Extractor::from_config(db, config)?;
            handle_sync(&extractor, &streams).await?;
        }
        Commands::State { action } => {
            handle_state(&db, action).await?;
        }
        Commands::Runs {
            stream,
            limit,
            json,
        } => {
            let runs = db.sync_runs(stream.as_deref(), limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No sync runs recorded.");
            } else {
                for run in runs {
                    println!(
                        "#{:<5} {:<28} {:<10} {} .. {}  rows={} windows={}/{}{}",
                        run.id,
                        run.stream_id,
                        run.status,
                        run.range_start,
                        run.range_end,
                        run.rows_emitted,
                        run.windows_completed,
                        run.windows_total,
                        run.error_message
                            .map(|e| format!("  error: {e}"))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }

    Ok(())
}

async fn handle_sync(
    extractor: &appsflyer_extract::Extractor,
    only: &[String],
) -> anyhow::Result<()> {
    let streams = extractor.selected_streams(only)?;

    let mut sink = appsflyer_extract::JsonLinesSink::stdout();
    let result = extractor
        .sync_streams(
            &streams,
            &appsflyer_extract::PassThroughTransform,
            &mut sink,
            &StderrProgress,
        )
        .await;

    match result {
        Ok(reports) => {
            let rows: u64 = reports.iter().map(|r| r.rows_emitted).sum();
            eprintln!("Synced {} streams, {rows} rows.", reports.len());
            Ok(())
        }
        Err(e) => {
            log::error!("sync halted: {e}");
            Err(e.into())
        }
    }
}

async fn handle_state(db: &appsflyer_extract::Database, action: StateAction) -> anyhow::Result<()> {
    match action {
        StateAction::Show { json } => {
            let bookmarks = db.bookmarks().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bookmarks)?);
            } else if bookmarks.is_empty() {
                println!("No bookmarks set.");
            } else {
                for b in bookmarks {
                    println!("{:<28} {} = {}", b.stream_id, b.replication_key, b.value);
                }
            }
            if let Some(stream_id) = db.currently_syncing().await? {
                println!("Interrupted while syncing: {stream_id}");
            }
        }
        StateAction::Set { stream, value } => {
            db.set_bookmark(&stream, &value).await?;
            println!("Bookmark updated.");
        }
        StateAction::Clear { stream } => {
            if db.clear_bookmark(&stream).await? {
                println!("Bookmark cleared.");
            } else {
                println!("{stream} has no bookmark.");
            }
        }
    }
    Ok(())
}

fn print_streams(json: bool) -> anyhow::Result<()> {
    if json {
        let streams: Vec<serde_json::Value> = catalog::STREAMS
            .iter()
            .map(|s| {
                serde_json::json!({
                    "stream_id": s.stream_id,
                    "report_id": s.report.report_id,
                    "version": s.report.version,
                    "max_window_days": s.report.max_window_days,
                    "key_properties": s.key_properties,
                    "replication_key": s.replication_key,
                    "retargeting": s.retargeting,
                    "default_selected": s.default_selected,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&streams)?);
        return Ok(());
    }

    for s in catalog::STREAMS {
        println!(
            "{:<28} {:<32} {:>3}d  reattr={:<5}{}",
            s.stream_id,
            format!("{}/{}", s.report.report_id, s.report.version),
            s.report.max_window_days,
            s.retargeting,
            if s.default_selected { "" } else { "  (not selected by default)" }
        );
    }
    Ok(())
}
