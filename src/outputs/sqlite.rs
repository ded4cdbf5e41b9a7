//! SQLite catalog sink.
//!
//! Schema (one row set per article URL):
//!
//! ```text
//! URL(url_id PK, url UNIQUE, source_type, source_name)
//!  └─ Source(source_id PK, url_id FK UNIQUE)
//!      └─ ScrapedData(data_id PK, field_id, source_id FK, title, content, scraped_at, published_date)
//!          └─ Keyword(data_id FK, keyword, keyword_count)
//! ```
//!
//! Re-persisting a URL updates its `URL` row, reuses its `Source` row, and
//! replaces its `ScrapedData` and `Keyword` rows, all in one transaction.

use super::{RecordId, Sink};
use crate::error::SinkError;
use crate::models::{ArticleRecord, SourceRecord};
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS URL (
    url_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    source_type TEXT NOT NULL,
    source_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Source (
    source_id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES URL(url_id) ON DELETE CASCADE
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_source_url ON Source(url_id);

CREATE TABLE IF NOT EXISTS ScrapedData (
    data_id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_id INTEGER NOT NULL DEFAULT 0,
    source_id INTEGER NOT NULL REFERENCES Source(source_id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    published_date TEXT
);
CREATE INDEX IF NOT EXISTS idx_scraped_source ON ScrapedData(source_id);

CREATE TABLE IF NOT EXISTS Keyword (
    data_id INTEGER NOT NULL REFERENCES ScrapedData(data_id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    keyword_count INTEGER NOT NULL CHECK (keyword_count > 0),
    PRIMARY KEY (data_id, keyword)
);
"#;

/// Single-connection SQLite sink.
pub struct SqliteSink {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteSink {
    /// Open (or create) the database at `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(%mode, "Journal mode set");

        let sink = Self::with_connection(conn, path.to_path_buf())?;
        info!("SQLite sink ready");
        Ok(sink)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, SinkError> {
        Self::with_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, db_path: PathBuf) -> Result<Self, SinkError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, db_path })
    }
}

impl Sink for SqliteSink {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }

    fn known_urls(&self) -> Result<HashSet<String>, SinkError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT u.url FROM URL u
             JOIN Source s ON s.url_id = u.url_id
             JOIN ScrapedData d ON d.source_id = s.source_id",
        )?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(urls)
    }

    #[instrument(level = "debug", skip_all, fields(url = %record.url))]
    fn persist(&mut self, source: &SourceRecord, record: &ArticleRecord) -> Result<RecordId, SinkError> {
        // Dropping the transaction on any `?` below rolls everything back
        let tx = self.conn.transaction()?;

        let url_id: i64 = tx.query_row(
            "INSERT INTO URL (url, source_type, source_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET
                 source_type = excluded.source_type,
                 source_name = excluded.source_name
             RETURNING url_id",
            params![record.url.as_str(), source.source_type.as_str(), source.source_name],
            |row| row.get(0),
        )?;

        let source_id: i64 = match tx.query_row(
            "SELECT source_id FROM Source WHERE url_id = ?1",
            params![url_id],
            |row| row.get(0),
        ) {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                tx.execute("INSERT INTO Source (url_id) VALUES (?1)", params![url_id])?;
                tx.last_insert_rowid()
            }
            Err(e) => return Err(e.into()),
        };

        let replaced = tx.execute("DELETE FROM ScrapedData WHERE source_id = ?1", params![source_id])?;

        tx.execute(
            "INSERT INTO ScrapedData (field_id, source_id, title, content, scraped_at, published_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source.field_id,
                source_id,
                record.title,
                record.body,
                record.scraped_at.to_rfc3339(),
                record.published_date.map(|d| d.to_string()),
            ],
        )?;
        let data_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO Keyword (data_id, keyword, keyword_count) VALUES (?1, ?2, ?3)",
            )?;
            for (keyword, count) in record.keywords.iter() {
                stmt.execute(params![data_id, keyword, count])?;
            }
        }

        tx.commit()?;
        debug!(url_id, source_id, data_id, replaced, keywords = record.keywords.len(), "Persisted article");
        Ok(data_id)
    }

    fn checkpoint(&mut self) -> Result<(), SinkError> {
        // Returns (busy, log pages, checkpointed pages); only success matters
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SinkError> {
        let this = *self;
        this.conn.close().map_err(|(_, e)| SinkError::Sqlite(e))?;
        info!(path = %this.db_path.display(), "SQLite sink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleUrl, Keywords, SourceType};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn source() -> SourceRecord {
        SourceRecord {
            source_name: "BCG".into(),
            source_type: SourceType::Web,
            field_id: 3,
        }
    }

    fn record(url: &str, keywords: Vec<(&str, u32)>) -> ArticleRecord {
        ArticleRecord {
            url: ArticleUrl::parse(url).unwrap(),
            title: "Cloud and Edge".into(),
            published_date: NaiveDate::from_ymd_opt(2024, 3, 5),
            body: "Edge computing moves work closer to users.".into(),
            scraped_at: Utc::now(),
            keywords: Keywords::new(keywords.into_iter().map(|(k, c)| (k.to_string(), c)).collect()),
        }
    }

    fn count(sink: &SqliteSink, table: &str) -> i64 {
        sink.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_persist_writes_all_tables() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let rec = record("https://www.bcg.com/publications/a", vec![("edge", 3), ("cloud", 2)]);
        let data_id = sink.persist(&source(), &rec).unwrap();
        assert!(data_id > 0);

        assert_eq!(count(&sink, "URL"), 1);
        assert_eq!(count(&sink, "Source"), 1);
        assert_eq!(count(&sink, "ScrapedData"), 1);
        assert_eq!(count(&sink, "Keyword"), 2);

        let (source_name, field_id, date): (String, i64, Option<String>) = sink
            .conn
            .query_row(
                "SELECT u.source_name, d.field_id, d.published_date FROM ScrapedData d
                 JOIN Source s ON s.source_id = d.source_id JOIN URL u ON u.url_id = s.url_id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(source_name, "BCG");
        assert_eq!(field_id, 3);
        assert_eq!(date.as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn test_repersist_is_idempotent() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let url = "https://www.bcg.com/publications/a";
        sink.persist(&source(), &record(url, vec![("edge", 3), ("cloud", 2)])).unwrap();
        sink.persist(&source(), &record(url, vec![("quantum", 4)])).unwrap();

        assert_eq!(count(&sink, "URL"), 1);
        assert_eq!(count(&sink, "Source"), 1);
        assert_eq!(count(&sink, "ScrapedData"), 1);
        assert_eq!(count(&sink, "Keyword"), 1);
        let keyword: String = sink
            .conn
            .query_row("SELECT keyword FROM Keyword", [], |row| row.get(0))
            .unwrap();
        assert_eq!(keyword, "quantum");
    }

    #[test]
    fn test_failed_persist_leaves_no_rows() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        // keyword_count 0 violates the CHECK after URL, Source and ScrapedData rows were written
        let bad = record("https://www.bcg.com/publications/bad", vec![("edge", 3), ("cloud", 0)]);
        assert!(matches!(sink.persist(&source(), &bad), Err(SinkError::Sqlite(_))));

        for table in ["URL", "Source", "ScrapedData", "Keyword"] {
            assert_eq!(count(&sink, table), 0, "{table} should be empty");
        }
        assert!(sink.known_urls().unwrap().is_empty());
    }

    #[test]
    fn test_known_urls_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db/catalog.db");

        let mut sink = SqliteSink::open(&path).unwrap();
        sink.persist(&source(), &record("https://www.bcg.com/publications/a", vec![])).unwrap();
        sink.persist(&source(), &record("https://www.bcg.com/publications/b", vec![])).unwrap();
        sink.checkpoint().unwrap();
        Box::new(sink).close().unwrap();

        let sink = SqliteSink::open(&path).unwrap();
        let known = sink.known_urls().unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("https://www.bcg.com/publications/b"));
        assert_eq!(sink.describe(), format!("sqlite:{}", path.display()));
    }
}
