//! CSV file export sink.
//!
//! Columns: `title,date,content,keywords,url`. `date` is `YYYY-MM-DD` or
//! empty; `keywords` is a JSON object in frequency order.
//!
//! Rows are held in memory, upserted by URL, and written out on every
//! checkpoint by replacing the file atomically (write to a sibling temp file,
//! then rename). An existing export is loaded on open, so a restarted run
//! keeps earlier rows and can skip their URLs.

use super::{RecordId, Sink};
use crate::error::SinkError;
use crate::models::{ArticleRecord, ArticleUrl, SourceRecord};
use ::csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const HEADER: [&str; 5] = ["title", "date", "content", "keywords", "url"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CsvRow {
    title: String,
    date: String,
    content: String,
    keywords: String,
    url: String,
}

impl CsvRow {
    fn from_record(record: &ArticleRecord) -> Result<Self, SinkError> {
        Ok(Self {
            title: record.title.clone(),
            date: record
                .published_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            content: record.body.clone(),
            keywords: serde_json::to_string(&record.keywords)?,
            url: record.url.to_string(),
        })
    }
}

/// File export sink. Opens no database connection.
pub struct CsvSink {
    path: PathBuf,
    rows: Vec<CsvRow>,
    index: HashMap<String, usize>,
    dirty: bool,
}

impl CsvSink {
    /// Open an export at `path`, loading any rows already there.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut sink = Self {
            path: path.to_path_buf(),
            rows: Vec::new(),
            index: HashMap::new(),
            dirty: false,
        };

        if path.exists() {
            let mut reader = ReaderBuilder::new().from_path(path)?;
            for row in reader.deserialize::<CsvRow>() {
                let row = row?;
                if ArticleUrl::parse(&row.url).is_none() {
                    warn!(url = %row.url, "Dropping export row without a usable URL");
                    continue;
                }
                sink.upsert(row);
            }
            info!(rows = sink.rows.len(), "Loaded existing export");
        }
        Ok(sink)
    }

    fn upsert(&mut self, row: CsvRow) -> usize {
        match self.index.get(&row.url) {
            Some(&i) => {
                self.rows[i] = row;
                i
            }
            None => {
                let i = self.rows.len();
                self.index.insert(row.url.clone(), i);
                self.rows.push(row);
                i
            }
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.csv".to_string());
        self.path.with_file_name(format!(".{name}.partial"))
    }

    fn write_all(&self) -> Result<(), SinkError> {
        let tmp = self.temp_path();
        {
            let mut writer = WriterBuilder::new().has_headers(false).from_path(&tmp)?;
            writer.write_record(HEADER)?;
            for row in &self.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Sink for CsvSink {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn known_urls(&self) -> Result<HashSet<String>, SinkError> {
        Ok(self.index.keys().cloned().collect())
    }

    fn persist(&mut self, _source: &SourceRecord, record: &ArticleRecord) -> Result<RecordId, SinkError> {
        let row = CsvRow::from_record(record)?;
        let i = self.upsert(row);
        self.dirty = true;
        Ok(i as RecordId + 1)
    }

    fn checkpoint(&mut self) -> Result<(), SinkError> {
        if !self.dirty {
            return Ok(());
        }
        self.write_all()?;
        self.dirty = false;
        debug!(rows = self.rows.len(), path = %self.path.display(), "Export checkpoint written");
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.checkpoint()?;
        if !self.path.exists() {
            self.write_all()?;
        }
        info!(rows = self.rows.len(), path = %self.path.display(), "CSV export closed");
        Ok(())
    }
}
