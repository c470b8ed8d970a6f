//! Loader: persists validated records with upsert + history semantics
//! across a bounded worker pool.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::task::JoinSet;

use conveyor_store::{RecordStore, StoreError, UpsertResult};
use conveyor_types::error::LoadError;
use conveyor_types::record::{LoadOutcome, TransformedRecord};

use crate::error::RetryPolicy;

/// Aggregated result of loading one batch.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub outcomes: Vec<LoadOutcome>,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl LoadReport {
    fn absorb(&mut self, outcome: LoadOutcome) {
        match &outcome {
            LoadOutcome::Inserted { .. } => self.inserted += 1,
            LoadOutcome::Updated { .. } => self.updated += 1,
            LoadOutcome::Skipped { .. } => self.skipped += 1,
            LoadOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// True when nothing at all made it in: every record either failed
    /// on a connection error or was skipped behind one. The run-level
    /// unreachable-destination signal.
    #[must_use]
    pub fn destination_unreachable(&self) -> bool {
        !self.outcomes.is_empty()
            && self.outcomes.iter().all(|o| match o {
                LoadOutcome::Failed {
                    error: LoadError::Connection { .. },
                    ..
                }
                | LoadOutcome::Skipped { .. } => true,
                LoadOutcome::Inserted { .. }
                | LoadOutcome::Updated { .. }
                | LoadOutcome::Failed { .. } => false,
            })
    }
}

/// Map a store failure to the load taxonomy.
///
/// Constraint violations are record-level integrity problems; anything
/// else wrong with the backend reads as a connection failure.
fn classify_store_error(err: &StoreError) -> LoadError {
    if let Some(rusqlite::Error::SqliteFailure(code, message)) = err.backend_source() {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return LoadError::Integrity {
                constraint: "unique".into(),
                reason: message.clone().unwrap_or_else(|| code.to_string()),
            };
        }
    }
    LoadError::Connection {
        target: "destination store".into(),
        reason: err.to_string(),
    }
}

/// Bounded-concurrency loader.
///
/// Records are partitioned across workers by hash of the natural key,
/// so all records for one key land on one worker and apply in
/// submission order. No global lock across unrelated keys.
pub struct Loader {
    store: Arc<dyn RecordStore>,
    policy: RetryPolicy,
    workers: usize,
}

impl Loader {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, policy: RetryPolicy, workers: usize) -> Self {
        Self {
            store,
            policy,
            workers: workers.max(1),
        }
    }

    /// Load a batch. Never returns an error: every per-record outcome,
    /// including failures, is in the report.
    pub async fn load(&self, records: Vec<TransformedRecord>) -> LoadReport {
        let mut report = LoadReport::default();
        if records.is_empty() {
            return report;
        }

        let worker_count = self.workers.min(records.len());
        let mut buckets: Vec<Vec<TransformedRecord>> = vec![Vec::new(); worker_count];
        for record in records {
            let mut hasher = DefaultHasher::new();
            record.natural_key().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % worker_count as u64) as usize;
            buckets[bucket].push(record);
        }

        let mut join_set = JoinSet::new();
        for bucket in buckets.into_iter().filter(|b| !b.is_empty()) {
            let store = Arc::clone(&self.store);
            let policy = self.policy;
            join_set.spawn(async move { load_bucket(store, policy, bucket).await });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        report.absorb(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "loader worker panicked");
                }
            }
        }

        tracing::info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "load complete"
        );
        report
    }
}

/// Process one worker's records in submission order. Once the worker
/// exhausts connection retries it stops calling the store and marks the
/// rest of its bucket skipped.
async fn load_bucket(
    store: Arc<dyn RecordStore>,
    policy: RetryPolicy,
    records: Vec<TransformedRecord>,
) -> Vec<LoadOutcome> {
    let mut outcomes = Vec::with_capacity(records.len());
    let mut unreachable = false;

    for record in records {
        if unreachable {
            outcomes.push(LoadOutcome::Skipped {
                key: record.natural_key(),
            });
            continue;
        }
        let outcome = load_one(&store, &policy, record).await;
        if let LoadOutcome::Failed {
            error: LoadError::Connection { .. },
            ..
        } = &outcome
        {
            unreachable = true;
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Upsert one record, retrying connection failures under the policy.
/// Each attempt is its own transaction inside the store.
async fn load_one(
    store: &Arc<dyn RecordStore>,
    policy: &RetryPolicy,
    record: TransformedRecord,
) -> LoadOutcome {
    let key = record.natural_key();
    let mut attempt = 1u32;
    loop {
        let store = Arc::clone(store);
        let candidate = record.clone();
        let result =
            tokio::task::spawn_blocking(move || store.upsert(&candidate)).await;

        let error = match result {
            Ok(Ok(UpsertResult::Inserted { id })) => return LoadOutcome::Inserted { id },
            Ok(Ok(UpsertResult::Updated { id, version })) => {
                return LoadOutcome::Updated { id, version }
            }
            Ok(Err(store_err)) => classify_store_error(&store_err),
            Err(join_err) => LoadError::Connection {
                target: "destination store".into(),
                reason: format!("task join: {join_err}"),
            },
        };

        if error.is_retryable() && attempt < policy.max_attempts {
            let delay = policy.delay_for(attempt, None);
            tracing::warn!(
                key = %key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "load failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        tracing::warn!(key = %key, attempt, error = %error, "record load failed");
        return LoadOutcome::Failed { key, error };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use conveyor_store::SqliteStore;
    use conveyor_types::run::SourceName;

    fn record(source: &str, id: &str, title: &str) -> TransformedRecord {
        TransformedRecord {
            source: SourceName::new(source),
            source_id: id.into(),
            title: title.into(),
            description: None,
            url: None,
            category: None,
            numeric_value_1: None,
            numeric_value_2: None,
            tags: Vec::new(),
            extra: serde_json::Map::new(),
            extracted_at: Utc::now(),
            transformed_at: Utc::now(),
            version: 1,
        }
    }

    fn loader(store: Arc<dyn RecordStore>, workers: usize) -> Loader {
        let policy = RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
        };
        Loader::new(store, policy, workers)
    }

    #[tokio::test]
    async fn fresh_batch_is_all_inserts() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let report = loader(Arc::clone(&store), 4)
            .load(vec![
                record("books", "1", "One"),
                record("books", "2", "Two"),
                record("weather", "1", "Other source"),
            ])
            .await;
        assert_eq!(report.inserted, 3);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(store.count_records().unwrap(), 3);
    }

    #[tokio::test]
    async fn double_load_is_insert_then_update() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let rec = record("books", "1", "Same Key");
        let l = loader(Arc::clone(&store), 2);

        let first = l.load(vec![rec.clone()]).await;
        assert_eq!(first.inserted, 1);

        let second = l.load(vec![rec]).await;
        assert_eq!(second.updated, 1);
        assert_eq!(second.inserted, 0);

        assert_eq!(store.count_records().unwrap(), 1);
        assert_eq!(store.count_history().unwrap(), 1);
    }

    #[tokio::test]
    async fn same_key_in_one_batch_serializes_to_insert_then_update() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let report = loader(Arc::clone(&store), 8)
            .load(vec![
                record("books", "1", "First write"),
                record("books", "1", "Second write"),
            ])
            .await;

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(store.count_records().unwrap(), 1);

        // Submission order preserved for the shared key.
        let stored = store
            .get_record(&record("books", "1", "x").natural_key())
            .unwrap()
            .unwrap();
        assert_eq!(stored.record.title, "Second write");
        assert_eq!(stored.record.version, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let report = loader(store, 4).load(Vec::new()).await;
        assert!(report.outcomes.is_empty());
        assert!(!report.destination_unreachable());
    }

    struct DownStore;

    impl RecordStore for DownStore {
        fn upsert(
            &self,
            _record: &TransformedRecord,
        ) -> conveyor_store::error::Result<UpsertResult> {
            Err(StoreError::backend_context(
                "upsert",
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some("unable to open database file".into()),
                ),
            ))
        }

        fn get_record(
            &self,
            _key: &conveyor_types::record::NaturalKey,
        ) -> conveyor_store::error::Result<Option<conveyor_store::StoredRecord>> {
            Ok(None)
        }

        fn get_history(
            &self,
            _key: &conveyor_types::record::NaturalKey,
        ) -> conveyor_store::error::Result<Vec<TransformedRecord>> {
            Ok(Vec::new())
        }

        fn count_records(&self) -> conveyor_store::error::Result<u64> {
            Ok(0)
        }

        fn count_history(&self) -> conveyor_store::error::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn unreachable_destination_fails_whole_batch() {
        let store: Arc<dyn RecordStore> = Arc::new(DownStore);
        let report = loader(store, 1)
            .load(vec![
                record("books", "1", "a"),
                record("books", "2", "b"),
                record("books", "3", "c"),
            ])
            .await;

        // First record burns the retries, the rest are skipped.
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 2);
        assert!(report.destination_unreachable());
    }

    #[tokio::test]
    async fn mixed_outcomes_are_not_unreachable() {
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let report = loader(store, 2).load(vec![record("books", "1", "ok")]).await;
        assert!(!report.destination_unreachable());
    }
}
