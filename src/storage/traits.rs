//! Sink trait and error types
//!
//! This module defines the interface every record sink implements and the
//! errors sinks report.

use crate::storage::{Record, RunStatus};
use thiserror::Error;

/// Errors that can occur while storing records
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink already finished")]
    Finished,
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Append-only destination for finished records
///
/// Product extractors and review paginators call `accept` concurrently from
/// many tasks, so implementations serialize appends themselves. There is no
/// read surface.
pub trait RecordSink: Send + Sync {
    /// Appends one record
    fn accept(&self, record: Record) -> SinkResult<()>;

    /// Flushes and closes the sink, recording how the run ended
    ///
    /// Called exactly once per run, on success and failure alike.
    fn finish(&self, status: RunStatus) -> SinkResult<()>;
}
