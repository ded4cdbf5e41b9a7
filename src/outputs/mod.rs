//! Persistence targets for extracted articles.
//!
//! # Submodules
//!
//! - [`sqlite`]: relational catalog (`URL`, `Source`, `ScrapedData`, `Keyword`)
//! - [`csv`]: flat file export with `title,date,content,keywords,url` columns
//!
//! Every [`Sink`] upserts by article URL, so re-running a crawl refreshes
//! existing entries instead of duplicating them. The pipeline is the only
//! caller and uses a sink from a single task.

pub mod csv;
pub mod sqlite;

use crate::error::SinkError;
use crate::models::{ArticleRecord, SourceRecord};
use std::collections::HashSet;
use std::path::PathBuf;

/// Identifier of a persisted article within its sink.
pub type RecordId = i64;

/// Durable store for articles.
pub trait Sink: Send {
    /// Human-readable target, for logs.
    fn describe(&self) -> String;

    /// URLs whose articles are already fully persisted.
    fn known_urls(&self) -> Result<HashSet<String>, SinkError>;

    /// Persist one article atomically: either every row is written or none.
    fn persist(&mut self, source: &SourceRecord, record: &ArticleRecord) -> Result<RecordId, SinkError>;

    /// Make everything persisted so far durable.
    fn checkpoint(&mut self) -> Result<(), SinkError>;

    /// Flush and release the underlying handle.
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// Where articles go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Sqlite(PathBuf),
    Csv(PathBuf),
}

impl SinkTarget {
    pub fn path(&self) -> &PathBuf {
        match self {
            SinkTarget::Sqlite(p) | SinkTarget::Csv(p) => p,
        }
    }

    /// Open the sink. Failure is an infrastructure fault.
    pub fn open(&self) -> Result<Box<dyn Sink>, SinkError> {
        Ok(match self {
            SinkTarget::Sqlite(path) => Box::new(sqlite::SqliteSink::open(path)?),
            SinkTarget::Csv(path) => Box::new(csv::CsvSink::open(path)?),
        })
    }
}
