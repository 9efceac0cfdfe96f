use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("API limit not declared for report: {0}")]
    UnknownReport(String),

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Invalid range: end {to} is not after start {from}")]
    InvalidRange { from: String, to: String },

    #[error("Request to {url} failed after {attempts} attempts: {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Request to {url} rejected with status {status}: {body}")]
    RemoteRejection {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Malformed row at line {line}: expected {expected} columns, found {found}")]
    Decode {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp '{value}': expected {format}")]
    InvalidTimestamp { value: String, format: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
