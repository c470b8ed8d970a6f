//! Run tracker: the single owner of a run's status row and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use conveyor_store::RunStore;
use conveyor_types::run::{PipelineId, PipelineRun, RunCounts, RunStatus};

use crate::error::PipelineError;

/// Tracks one pipeline run.
///
/// The counters are the only state mutated by concurrent workers, so
/// they are atomics; status moves only through `advance`/`finalize`,
/// which enforce the run state machine before persisting.
pub struct RunTracker {
    run_id: i64,
    pipeline: PipelineId,
    store: Arc<dyn RunStore>,
    status: Mutex<RunStatus>,
    started_at: DateTime<Utc>,
    config_snapshot: serde_json::Value,
    extracted: AtomicU64,
    transformed: AtomicU64,
    dead_lettered: AtomicU64,
    loaded: AtomicU64,
    load_failed: AtomicU64,
    errors: AtomicU64,
}

impl RunTracker {
    /// Insert the run row (pending) and immediately advance to
    /// extracting.
    ///
    /// # Errors
    ///
    /// Returns a store error if the row can't be inserted or updated.
    pub async fn start(
        store: Arc<dyn RunStore>,
        pipeline: PipelineId,
        config_snapshot: serde_json::Value,
    ) -> Result<Self, PipelineError> {
        let run_id = {
            let store = Arc::clone(&store);
            let pipeline = pipeline.clone();
            let snapshot = config_snapshot.clone();
            tokio::task::spawn_blocking(move || store.start_run(&pipeline, &snapshot))
                .await
                .map_err(|e| PipelineError::Infrastructure(e.into()))??
        };

        let tracker = Self {
            run_id,
            pipeline,
            store,
            status: Mutex::new(RunStatus::Pending),
            started_at: Utc::now(),
            config_snapshot,
            extracted: AtomicU64::new(0),
            transformed: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            loaded: AtomicU64::new(0),
            load_failed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        };
        tracker.advance(RunStatus::Extracting).await?;
        Ok(tracker)
    }

    #[must_use]
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    #[must_use]
    pub fn pipeline(&self) -> &PipelineId {
        &self.pipeline
    }

    fn current_status(&self) -> Result<RunStatus, PipelineError> {
        self.status
            .lock()
            .map(|s| *s)
            .map_err(|_| PipelineError::Infrastructure(anyhow::anyhow!("status lock poisoned")))
    }

    fn set_status(&self, next: RunStatus) -> Result<(), PipelineError> {
        self.status
            .lock()
            .map(|mut s| *s = next)
            .map_err(|_| PipelineError::Infrastructure(anyhow::anyhow!("status lock poisoned")))
    }

    /// Move to the next non-terminal stage, validating the transition
    /// and persisting the new status.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error on an illegal transition, or a
    /// store error if persistence fails.
    pub async fn advance(&self, next: RunStatus) -> Result<(), PipelineError> {
        let current = self.current_status()?;
        if !current.can_transition_to(next) {
            return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                "illegal run transition {current} -> {next}"
            )));
        }

        let store = Arc::clone(&self.store);
        let run_id = self.run_id;
        tokio::task::spawn_blocking(move || store.update_status(run_id, next))
            .await
            .map_err(|e| PipelineError::Infrastructure(e.into()))??;

        self.set_status(next)?;
        tracing::info!(run_id, pipeline = %self.pipeline, status = %next, "run advanced");
        Ok(())
    }

    pub fn add_extracted(&self, n: u64) {
        self.extracted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_transformed(&self, n: u64) {
        self.transformed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_dead_lettered(&self, n: u64) {
        self.dead_lettered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_loaded(&self, n: u64) {
        self.loaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_load_failed(&self, n: u64) {
        self.load_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_errors(&self, n: u64) {
        self.errors.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            extracted: self.extracted.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            loaded: self.loaded.load(Ordering::Relaxed),
            load_failed: self.load_failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Move to a terminal status and persist the final counts.
    /// Idempotent: finalizing an already-terminal run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if `status` isn't terminal or
    /// isn't reachable from the current state.
    pub async fn finalize(
        &self,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<PipelineRun, PipelineError> {
        if !status.is_terminal() {
            return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                "finalize called with non-terminal status {status}"
            )));
        }

        let current = self.current_status()?;
        if current.is_terminal() {
            return Ok(self.snapshot()?);
        }
        if !current.can_transition_to(status) {
            return Err(PipelineError::Infrastructure(anyhow::anyhow!(
                "illegal run transition {current} -> {status}"
            )));
        }

        let counts = self.counts();
        let store = Arc::clone(&self.store);
        let run_id = self.run_id;
        let message = error_message.clone();
        tokio::task::spawn_blocking(move || {
            store.complete_run(run_id, status, &counts, message.as_deref())
        })
        .await
        .map_err(|e| PipelineError::Infrastructure(e.into()))??;

        self.set_status(status)?;
        tracing::info!(
            run_id,
            pipeline = %self.pipeline,
            status = %status,
            extracted = counts.extracted,
            transformed = counts.transformed,
            dead_lettered = counts.dead_lettered,
            loaded = counts.loaded,
            load_failed = counts.load_failed,
            "run finalized"
        );
        let mut run = self.snapshot()?;
        run.error_message = error_message;
        Ok(run)
    }

    /// In-memory view of the run as tracked so far.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the status lock is poisoned.
    pub fn snapshot(&self) -> Result<PipelineRun, PipelineError> {
        let status = self.current_status()?;
        Ok(PipelineRun {
            run_id: self.run_id,
            pipeline: self.pipeline.clone(),
            status,
            started_at: self.started_at,
            finished_at: status.is_terminal().then(Utc::now),
            counts: self.counts(),
            config_snapshot: self.config_snapshot.clone(),
            error_message: None,
        })
    }
}
