//! Record transformation and output.
//!
//! The engine hands every decoded row to a [`RecordTransform`] and the result
//! to a [`RecordSink`], in decoded order. After a stream's bookmark commit the
//! sink also receives the full bookmark state.

use std::collections::BTreeMap;
use std::io::{BufWriter, Stdout, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::date_util::format_timestamp;
use crate::error::Result;
use crate::storage::repository::Bookmark;
use crate::sync::decoder::Row;

pub trait RecordTransform: Send + Sync {
    fn transform(&self, row: &Row) -> Value;
}

/// Keeps every field as its raw string; empty cells become `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTransform;

impl RecordTransform for PassThroughTransform {
    fn transform(&self, row: &Row) -> Value {
        let mut record = Map::with_capacity(row.len());
        for (field, value) in row.iter() {
            let value = if value.is_empty() {
                Value::Null
            } else {
                Value::String(value.to_string())
            };
            record.insert(field.to_string(), value);
        }
        Value::Object(record)
    }
}

pub trait RecordSink: Send {
    fn write_record(
        &mut self,
        stream_id: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> Result<()>;

    fn write_state(&mut self, bookmarks: &[Bookmark]) -> Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum Message<'a> {
    Record {
        stream: &'a str,
        record: &'a Value,
        time_extracted: String,
    },
    State {
        value: StateValue<'a>,
    },
}

#[derive(Serialize)]
struct StateValue<'a> {
    bookmarks: BTreeMap<&'a str, BTreeMap<&'a str, &'a str>>,
}

/// One JSON message per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_message(&mut self, message: &Message<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl JsonLinesSink<BufWriter<Stdout>> {
    /// Buffered stdout; flushed after every STATE message.
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(std::io::stdout()))
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_record(
        &mut self,
        stream_id: &str,
        record: &Value,
        time_extracted: DateTime<Utc>,
    ) -> Result<()> {
        self.write_message(&Message::Record {
            stream: stream_id,
            record,
            time_extracted: format_timestamp(time_extracted),
        })
    }

    fn write_state(&mut self, bookmarks: &[Bookmark]) -> Result<()> {
        let mut state = BTreeMap::new();
        for b in bookmarks {
            state.insert(
                b.stream_id.as_str(),
                BTreeMap::from([(b.replication_key.as_str(), b.value.as_str())]),
            );
        }
        self.write_message(&Message::State {
            value: StateValue { bookmarks: state },
        })?;
        self.out.flush()?;
        Ok(())
    }
}

/// Sink that keeps everything in memory, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub records: Vec<(String, Value)>,
    pub states: Vec<Vec<Bookmark>>,
}

#[cfg(test)]
impl RecordSink for CollectingSink {
    fn write_record(
        &mut self,
        stream_id: &str,
        record: &Value,
        _time_extracted: DateTime<Utc>,
    ) -> Result<()> {
        self.records.push((stream_id.to_string(), record.clone()));
        Ok(())
    }

    fn write_state(&mut self, bookmarks: &[Bookmark]) -> Result<()> {
        self.states.push(bookmarks.to_vec());
        Ok(())
    }
}
