//! `SQLite`-backed implementation of [`RunStore`] and [`RecordStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Every upsert runs
//! in its own transaction, so one record's failure never rolls back or
//! blocks any other record.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;

use conveyor_types::record::{NaturalKey, RejectedRecord, TransformedRecord};
use conveyor_types::run::{PipelineId, PipelineRun, RunCounts, RunStatus, SourceName};

use crate::backend::{RecordStore, RunStore, StoredRecord, UpsertResult};
use crate::error::{self, StoreError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for all store tables.
const CREATE_TABLES: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS pipeline_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    extracted INTEGER NOT NULL DEFAULT 0,
    transformed INTEGER NOT NULL DEFAULT 0,
    dead_lettered INTEGER NOT NULL DEFAULT 0,
    loaded INTEGER NOT NULL DEFAULT 0,
    load_failed INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    config_snapshot TEXT,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS dead_letters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES pipeline_runs(id),
    source TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    rule TEXT NOT NULL,
    reason TEXT NOT NULL,
    stage TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_dead_letters_run ON dead_letters (pipeline, run_id);

CREATE TABLE IF NOT EXISTS etl_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    url TEXT,
    category TEXT,
    numeric_value_1 REAL,
    numeric_value_2 REAL,
    tags TEXT NOT NULL,
    extra TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    transformed_at TEXT NOT NULL,
    loaded_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    UNIQUE (source, source_id)
);

CREATE INDEX IF NOT EXISTS idx_etl_records_source ON etl_records (source);

CREATE TABLE IF NOT EXISTS etl_records_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL,
    source TEXT NOT NULL,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    url TEXT,
    category TEXT,
    numeric_value_1 REAL,
    numeric_value_2 REAL,
    tags TEXT NOT NULL,
    extra TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    transformed_at TEXT NOT NULL,
    loaded_at TEXT NOT NULL,
    version INTEGER NOT NULL,
    archived_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_history_key ON etl_records_history (source, source_id);
";

/// `SQLite`-backed store.
///
/// Create with [`SqliteStore::open`] for file-backed persistence or
/// [`SqliteStore::in_memory`] for tests. Version archiving on update is
/// on by default; [`SqliteStore::with_history`] turns it off.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    history: bool,
}

impl SqliteStore {
    /// Open or create a `SQLite` store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory can't be created,
    /// or [`StoreError::Backend`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StoreError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StoreError::backend)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
            history: true,
        })
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::backend)?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(StoreError::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
            history: true,
        })
    }

    /// Set whether updates archive the superseded row to history.
    ///
    /// With history off, an update still bumps the version; the prior
    /// values are simply not retained.
    #[must_use]
    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Parse a `SQLite` datetime string into a UTC timestamp.
    fn parse_sqlite_datetime(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT)
            .map(|ndt| ndt.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
        let tags_json: String = row.get("tags")?;
        let extra_json: String = row.get("extra")?;
        let extracted_at: String = row.get("extracted_at")?;
        let transformed_at: String = row.get("transformed_at")?;
        let source: String = row.get("source")?;

        Ok(StoredRecord {
            id: row.get("id")?,
            record: TransformedRecord {
                source: SourceName::new(source),
                source_id: row.get("source_id")?,
                title: row.get("title")?,
                description: row.get("description")?,
                url: row.get("url")?,
                category: row.get("category")?,
                numeric_value_1: row.get("numeric_value_1")?,
                numeric_value_2: row.get("numeric_value_2")?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                extra: serde_json::from_str(&extra_json).unwrap_or_default(),
                extracted_at: Self::parse_sqlite_datetime(&extracted_at)
                    .unwrap_or_else(Utc::now),
                transformed_at: Self::parse_sqlite_datetime(&transformed_at)
                    .unwrap_or_else(Utc::now),
                version: row.get("version")?,
            },
        })
    }
}

impl RunStore for SqliteStore {
    fn start_run(
        &self,
        pipeline: &PipelineId,
        config_snapshot: &serde_json::Value,
    ) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO pipeline_runs (pipeline, status, config_snapshot) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                pipeline.as_str(),
                RunStatus::Pending.as_str(),
                config_snapshot.to_string(),
            ],
        )
        .map_err(|e| StoreError::backend_context("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_status(&self, run_id: i64, status: RunStatus) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pipeline_runs SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), run_id],
        )
        .map_err(|e| StoreError::backend_context("update_status", e))?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
        error_message: Option<&str>,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pipeline_runs SET status = ?1, finished_at = datetime('now'), \
             extracted = ?2, transformed = ?3, dead_lettered = ?4, loaded = ?5, \
             load_failed = ?6, errors = ?7, error_message = ?8 \
             WHERE id = ?9",
            rusqlite::params![
                status.as_str(),
                counts.extracted as i64,
                counts.transformed as i64,
                counts.dead_lettered as i64,
                counts.loaded as i64,
                counts.load_failed as i64,
                counts.errors as i64,
                error_message,
                run_id,
            ],
        )
        .map_err(|e| StoreError::backend_context("complete_run", e))?;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn get_run(&self, run_id: i64) -> error::Result<Option<PipelineRun>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT id, pipeline, status, started_at, finished_at, \
             extracted, transformed, dead_lettered, loaded, load_failed, errors, \
             config_snapshot, error_message \
             FROM pipeline_runs WHERE id = ?1",
            [run_id],
            |row| {
                let pipeline: String = row.get(1)?;
                let status_str: String = row.get(2)?;
                let started_at: String = row.get(3)?;
                let finished_at: Option<String> = row.get(4)?;
                let snapshot_json: Option<String> = row.get(11)?;
                Ok(PipelineRun {
                    run_id: row.get(0)?,
                    pipeline: PipelineId::new(pipeline),
                    status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Failed),
                    started_at: Self::parse_sqlite_datetime(&started_at)
                        .unwrap_or_else(Utc::now),
                    finished_at: finished_at
                        .as_deref()
                        .and_then(Self::parse_sqlite_datetime),
                    counts: RunCounts {
                        extracted: row.get::<_, i64>(5)? as u64,
                        transformed: row.get::<_, i64>(6)? as u64,
                        dead_lettered: row.get::<_, i64>(7)? as u64,
                        loaded: row.get::<_, i64>(8)? as u64,
                        load_failed: row.get::<_, i64>(9)? as u64,
                        errors: row.get::<_, i64>(10)? as u64,
                    },
                    config_snapshot: snapshot_json
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or(serde_json::Value::Null),
                    error_message: row.get(12)?,
                })
            },
        );

        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::backend_context("get_run", e)),
        }
    }

    fn insert_rejections(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
        records: &[RejectedRecord],
    ) -> error::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::backend_context("insert_rejections: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO dead_letters \
                 (pipeline, run_id, source, payload_json, rule, reason, stage, extracted_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(|e| StoreError::backend_context("insert_rejections: prepare", e))?;

        let mut count = 0u64;
        for rejected in records {
            stmt.execute(rusqlite::params![
                pipeline.as_str(),
                run_id,
                rejected.record.source.as_str(),
                rejected.record.payload.to_string(),
                rejected.rule,
                rejected.reason,
                rejected.stage.to_string(),
                rejected.record.extracted_at.to_rfc3339(),
            ])
            .map_err(|e| StoreError::backend_context("insert_rejections: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StoreError::backend_context("insert_rejections: commit", e))?;

        Ok(count)
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&self, record: &TransformedRecord) -> error::Result<UpsertResult> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::backend_context("upsert: begin tx", e))?;

        let existing: Option<(i64, i64)> = match tx.query_row(
            "SELECT id, version FROM etl_records WHERE source = ?1 AND source_id = ?2",
            rusqlite::params![record.source.as_str(), record.source_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(pair) => Some(pair),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(StoreError::backend_context("upsert: lookup", e)),
        };

        let tags_json = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".into());
        let extra_json =
            serde_json::to_string(&record.extra).unwrap_or_else(|_| "{}".into());
        let loaded_at = Utc::now().to_rfc3339();

        let result = if let Some((id, version)) = existing {
            if self.history {
                // Archive the live row first; both writes commit together.
                tx.execute(
                    "INSERT INTO etl_records_history \
                     (record_id, source, source_id, title, description, url, category, \
                      numeric_value_1, numeric_value_2, tags, extra, extracted_at, \
                      transformed_at, loaded_at, version) \
                     SELECT id, source, source_id, title, description, url, category, \
                      numeric_value_1, numeric_value_2, tags, extra, extracted_at, \
                      transformed_at, loaded_at, version \
                     FROM etl_records WHERE id = ?1",
                    [id],
                )
                .map_err(|e| StoreError::backend_context("upsert: archive", e))?;
            }

            let new_version = version + 1;
            tx.execute(
                "UPDATE etl_records SET title = ?1, description = ?2, url = ?3, \
                 category = ?4, numeric_value_1 = ?5, numeric_value_2 = ?6, \
                 tags = ?7, extra = ?8, extracted_at = ?9, transformed_at = ?10, \
                 loaded_at = ?11, version = ?12 \
                 WHERE id = ?13",
                rusqlite::params![
                    record.title,
                    record.description,
                    record.url,
                    record.category,
                    record.numeric_value_1,
                    record.numeric_value_2,
                    tags_json,
                    extra_json,
                    record.extracted_at.to_rfc3339(),
                    record.transformed_at.to_rfc3339(),
                    loaded_at,
                    new_version,
                    id,
                ],
            )
            .map_err(|e| StoreError::backend_context("upsert: update", e))?;

            UpsertResult::Updated {
                id,
                version: new_version,
            }
        } else {
            tx.execute(
                "INSERT INTO etl_records \
                 (source, source_id, title, description, url, category, \
                  numeric_value_1, numeric_value_2, tags, extra, extracted_at, \
                  transformed_at, loaded_at, version) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
                rusqlite::params![
                    record.source.as_str(),
                    record.source_id,
                    record.title,
                    record.description,
                    record.url,
                    record.category,
                    record.numeric_value_1,
                    record.numeric_value_2,
                    tags_json,
                    extra_json,
                    record.extracted_at.to_rfc3339(),
                    record.transformed_at.to_rfc3339(),
                    loaded_at,
                ],
            )
            .map_err(|e| StoreError::backend_context("upsert: insert", e))?;

            UpsertResult::Inserted {
                id: tx.last_insert_rowid(),
            }
        };

        tx.commit()
            .map_err(|e| StoreError::backend_context("upsert: commit", e))?;
        Ok(result)
    }

    fn get_record(&self, key: &NaturalKey) -> error::Result<Option<StoredRecord>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT id, source, source_id, title, description, url, category, \
             numeric_value_1, numeric_value_2, tags, extra, extracted_at, \
             transformed_at, version \
             FROM etl_records WHERE source = ?1 AND source_id = ?2",
            rusqlite::params![key.source.as_str(), key.source_id],
            Self::row_to_record,
        );

        match result {
            Ok(stored) => Ok(Some(stored)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::backend_context("get_record", e)),
        }
    }

    fn get_history(&self, key: &NaturalKey) -> error::Result<Vec<TransformedRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT record_id AS id, source, source_id, title, description, url, \
                 category, numeric_value_1, numeric_value_2, tags, extra, extracted_at, \
                 transformed_at, version \
                 FROM etl_records_history WHERE source = ?1 AND source_id = ?2 \
                 ORDER BY history_id",
            )
            .map_err(|e| StoreError::backend_context("get_history: prepare", e))?;

        let rows = stmt
            .query_map(
                rusqlite::params![key.source.as_str(), key.source_id],
                Self::row_to_record,
            )
            .map_err(|e| StoreError::backend_context("get_history: query", e))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(
                row.map_err(|e| StoreError::backend_context("get_history: row", e))?
                    .record,
            );
        }
        Ok(entries)
    }

    #[allow(clippy::cast_sign_loss)]
    fn count_records(&self) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM etl_records", [], |row| row.get(0))
            .map_err(|e| StoreError::backend_context("count_records", e))?;
        Ok(count as u64)
    }

    #[allow(clippy::cast_sign_loss)]
    fn count_history(&self) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM etl_records_history", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::backend_context("count_history", e))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::record::{RawRecord, RejectionStage};

    fn pid(name: &str) -> PipelineId {
        PipelineId::new(name)
    }

    fn sample_record(source: &str, source_id: &str, title: &str) -> TransformedRecord {
        TransformedRecord {
            source: SourceName::new(source),
            source_id: source_id.into(),
            title: title.into(),
            description: Some("a description".into()),
            url: Some("https://example.com/1".into()),
            category: Some("Books".into()),
            numeric_value_1: Some(4.0),
            numeric_value_2: Some(12.5),
            tags: vec!["fiction".into(), "classic".into()],
            extra: serde_json::Map::new(),
            extracted_at: Utc::now(),
            transformed_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn run_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = store
            .start_run(&pid("p"), &serde_json::json!({"sources": ["a"]}))
            .unwrap();
        assert!(run_id > 0);

        store.update_status(run_id, RunStatus::Extracting).unwrap();
        store
            .complete_run(
                run_id,
                RunStatus::Completed,
                &RunCounts {
                    extracted: 10,
                    transformed: 9,
                    dead_lettered: 1,
                    loaded: 9,
                    load_failed: 0,
                    errors: 0,
                },
                None,
            )
            .unwrap();

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.counts.extracted, 10);
        assert_eq!(run.counts.dead_lettered, 1);
        assert!(run.finished_at.is_some());
        assert_eq!(run.config_snapshot["sources"][0], "a");
    }

    #[test]
    fn run_failure_keeps_error_message() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = store
            .start_run(&pid("p"), &serde_json::Value::Null)
            .unwrap();
        store
            .complete_run(
                run_id,
                RunStatus::Failed,
                &RunCounts::default(),
                Some("schema violation: payload is an array"),
            )
            .unwrap();

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(
            run.error_message.as_deref(),
            Some("schema violation: payload is an array")
        );
    }

    #[test]
    fn get_run_unknown_id_is_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_run(999).unwrap().is_none());
    }

    #[test]
    fn multiple_runs_get_distinct_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store
            .start_run(&pid("p"), &serde_json::Value::Null)
            .unwrap();
        let b = store
            .start_run(&pid("p"), &serde_json::Value::Null)
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn upsert_inserts_then_updates_with_history() {
        let store = SqliteStore::in_memory().unwrap();
        let record = sample_record("books", "978-1", "First Title");

        let first = store.upsert(&record).unwrap();
        let id = match first {
            UpsertResult::Inserted { id } => id,
            UpsertResult::Updated { .. } => panic!("expected insert"),
        };
        assert_eq!(store.count_records().unwrap(), 1);
        assert_eq!(store.count_history().unwrap(), 0);

        let mut changed = record.clone();
        changed.title = "Second Title".into();
        let second = store.upsert(&changed).unwrap();
        assert_eq!(
            second,
            UpsertResult::Updated { id, version: 2 },
            "same natural key must update, not insert"
        );

        // Still one live row, one archived prior version.
        assert_eq!(store.count_records().unwrap(), 1);
        assert_eq!(store.count_history().unwrap(), 1);

        let live = store.get_record(&record.natural_key()).unwrap().unwrap();
        assert_eq!(live.record.title, "Second Title");
        assert_eq!(live.record.version, 2);

        let history = store.get_history(&record.natural_key()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "First Title");
        assert_eq!(history[0].version, 1);
    }

    #[test]
    fn history_disabled_updates_in_place_without_archiving() {
        let store = SqliteStore::in_memory().unwrap().with_history(false);
        let record = sample_record("books", "1", "First Title");
        store.upsert(&record).unwrap();

        let mut changed = record.clone();
        changed.title = "Second Title".into();
        let result = store.upsert(&changed).unwrap();
        assert_eq!(result, UpsertResult::Updated { id: 1, version: 2 });

        assert_eq!(store.count_history().unwrap(), 0);
        assert!(store.get_history(&record.natural_key()).unwrap().is_empty());
        let live = store.get_record(&record.natural_key()).unwrap().unwrap();
        assert_eq!(live.record.title, "Second Title");
        assert_eq!(live.record.version, 2);
    }

    #[test]
    fn upsert_distinct_keys_are_independent() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert(&sample_record("books", "1", "One"))
            .unwrap();
        store
            .upsert(&sample_record("books", "2", "Two"))
            .unwrap();
        store
            .upsert(&sample_record("github", "1", "Repo"))
            .unwrap();

        assert_eq!(store.count_records().unwrap(), 3);
        assert_eq!(store.count_history().unwrap(), 0);
    }

    #[test]
    fn repeated_updates_archive_every_prior_version() {
        let store = SqliteStore::in_memory().unwrap();
        let record = sample_record("books", "x", "v1");
        store.upsert(&record).unwrap();

        for (i, title) in ["v2", "v3", "v4"].iter().enumerate() {
            let mut next = record.clone();
            next.title = (*title).into();
            let result = store.upsert(&next).unwrap();
            assert_eq!(
                result,
                UpsertResult::Updated {
                    id: 1,
                    version: i as i64 + 2
                }
            );
        }

        let history = store.get_history(&record.natural_key()).unwrap();
        let titles: Vec<_> = history.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["v1", "v2", "v3"]);
    }

    #[test]
    fn rejections_persist_with_run_linkage() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = store
            .start_run(&pid("p"), &serde_json::Value::Null)
            .unwrap();

        let rejected = vec![RejectedRecord {
            record: RawRecord::new(
                SourceName::new("weather"),
                serde_json::json!({"location": "", "temp": null}),
            ),
            rule: "title_required".into(),
            reason: "missing title".into(),
            stage: RejectionStage::Clean,
        }];

        let count = store.insert_rejections(&pid("p"), run_id, &rejected).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rejections_empty_insert_is_zero() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.insert_rejections(&pid("p"), 1, &[]).unwrap(), 0);
    }

    #[test]
    fn rejections_invalid_run_id_names_operation() {
        let store = SqliteStore::in_memory().unwrap();
        let rejected = vec![RejectedRecord {
            record: RawRecord::new(SourceName::new("s"), serde_json::json!({})),
            rule: "r".into(),
            reason: "x".into(),
            stage: RejectionStage::Validate,
        }];
        let err = store
            .insert_rejections(&pid("p"), 999, &rejected)
            .expect_err("invalid run id should fail the FK");
        assert!(err.to_string().contains("insert_rejections"));
    }

    #[test]
    fn get_record_missing_key_is_none() {
        let store = SqliteStore::in_memory().unwrap();
        let key = NaturalKey::new(SourceName::new("books"), "nope");
        assert!(store.get_record(&key).unwrap().is_none());
    }
}
