//! Storage trait definitions.
//!
//! [`RunStore`] is the run tracker's persistence contract: run rows,
//! status transitions, final counts, and dead-letter retention.
//! [`RecordStore`] is the loader destination: upsert by natural key with
//! an append-only history of superseded versions. Whether one database
//! backs both is an implementation choice; [`SqliteStore`](crate::SqliteStore)
//! implements both.

use conveyor_types::record::{NaturalKey, RejectedRecord, TransformedRecord};
use conveyor_types::run::{PipelineId, PipelineRun, RunCounts, RunStatus};

use crate::error;

/// Result of an upsert: what the destination actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// No row existed for the natural key; one was inserted.
    Inserted { id: i64 },
    /// A live row existed; it was archived to history and overwritten.
    /// `version` is the new (incremented) version.
    Updated { id: i64, version: i64 },
}

impl UpsertResult {
    /// Row id of the live record, whichever branch was taken.
    #[must_use]
    pub fn record_id(self) -> i64 {
        match self {
            Self::Inserted { id } | Self::Updated { id, .. } => id,
        }
    }
}

/// A record as stored in the destination, with its row id and version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub record: TransformedRecord,
}

/// Persistence contract for pipeline run tracking.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn RunStore>`.
pub trait RunStore: Send + Sync {
    /// Insert a new run row in `Pending` status, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn start_run(
        &self,
        pipeline: &PipelineId,
        config_snapshot: &serde_json::Value,
    ) -> error::Result<i64>;

    /// Record a status transition for an in-flight run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn update_status(&self, run_id: i64, status: RunStatus) -> error::Result<()>;

    /// Finalize a run with its terminal status and aggregate counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        counts: &RunCounts,
        error_message: Option<&str>,
    ) -> error::Result<()>;

    /// Fetch a run row. Returns `Ok(None)` for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_run(&self, run_id: i64) -> error::Result<Option<PipelineRun>>;

    /// Persist dead-lettered records. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn insert_rejections(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
        records: &[RejectedRecord],
    ) -> error::Result<u64>;
}

/// The loader destination: upsert-by-natural-key plus append-only history.
///
/// Each `upsert` call is one atomic unit: on update, the prior live row
/// is copied into history and the new values written with an incremented
/// version, or neither happens.
pub trait RecordStore: Send + Sync {
    /// Insert or update by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn upsert(&self, record: &TransformedRecord) -> error::Result<UpsertResult>;

    /// Fetch the live record for a natural key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_record(&self, key: &NaturalKey) -> error::Result<Option<StoredRecord>>;

    /// Archived prior versions for a natural key, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn get_history(&self, key: &NaturalKey) -> error::Result<Vec<TransformedRecord>>;

    /// Total live records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn count_records(&self) -> error::Result<u64>;

    /// Total archived history entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) on storage failure.
    fn count_history(&self) -> error::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify both traits are object-safe.
    #[test]
    fn traits_are_object_safe() {
        fn _runs(_: &dyn RunStore) {}
        fn _records(_: &dyn RecordStore) {}
    }

    #[test]
    fn upsert_result_record_id() {
        assert_eq!(UpsertResult::Inserted { id: 7 }.record_id(), 7);
        assert_eq!(UpsertResult::Updated { id: 3, version: 2 }.record_id(), 3);
    }
}
