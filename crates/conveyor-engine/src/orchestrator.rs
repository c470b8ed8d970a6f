//! Orchestrator: sequences extract, transform, gate, and load for one
//! run. Owns no business logic beyond sequencing; every retry/skip/
//! abort decision comes from the error classifications.

use std::sync::Arc;

use tokio::task::JoinSet;

use conveyor_store::{RecordStore, RunStore, SqliteStore};
use conveyor_types::error::ExtractError;
use conveyor_types::record::RawRecord;
use conveyor_types::run::{PipelineRun, RunStatus, SourceName};

use crate::config::types::PipelineConfig;
use crate::config::validator::validate_config;
use crate::dead_letter::persist_rejections;
use crate::error::{PipelineError, RetryPolicy};
use crate::extract::{build_extractors, extract_with_retry};
use crate::load::Loader;
use crate::tracker::RunTracker;
use crate::transform::{quality_gate, TransformChain};

/// Stores and policy for one run. Built from the config for real runs;
/// tests inject in-memory stores and millisecond backoff.
pub struct RunOptions {
    pub run_store: Arc<dyn RunStore>,
    pub record_store: Arc<dyn RecordStore>,
    pub retry: RetryPolicy,
}

impl RunOptions {
    /// Open the stores the config points at.
    ///
    /// # Errors
    ///
    /// Returns an error if either SQLite file can't be opened.
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let record_store = Arc::new(
            SqliteStore::open(&config.destination.path)?
                .with_history(config.destination.history),
        );
        let run_store: Arc<dyn RunStore> = match &config.state.path {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(SqliteStore::in_memory()?),
        };
        Ok(Self {
            run_store,
            record_store,
            retry: RetryPolicy::default().with_max_attempts(config.resources.max_attempts),
        })
    }
}

/// Execute one pipeline run end to end.
///
/// Run-level business failures (schema violation, quality gate,
/// unreachable destination) finalize the run as failed and return the
/// run; `Err` is reserved for infrastructure problems that prevent the
/// run from being tracked at all.
///
/// # Errors
///
/// Returns an error on invalid config, extractor construction failure,
/// or a run-store failure.
pub async fn run_pipeline(
    config: &PipelineConfig,
    options: &RunOptions,
) -> Result<PipelineRun, PipelineError> {
    validate_config(config).map_err(PipelineError::Infrastructure)?;
    let extractors = build_extractors(config).map_err(PipelineError::Infrastructure)?;

    let snapshot = serde_json::to_value(config)
        .map_err(|e| PipelineError::Infrastructure(e.into()))?;
    let tracker = Arc::new(
        RunTracker::start(
            Arc::clone(&options.run_store),
            config.pipeline.clone(),
            snapshot,
        )
        .await?,
    );
    tracing::info!(
        run_id = tracker.run_id(),
        pipeline = %config.pipeline,
        sources = extractors.len(),
        "run started"
    );

    // Extraction: one task per source, a join, not a race. A source
    // that exhausts its retries is counted and logged, never fatal.
    let mut join_set: JoinSet<(SourceName, Result<Vec<RawRecord>, ExtractError>)> =
        JoinSet::new();
    for extractor in extractors {
        let policy = options.retry;
        join_set.spawn(async move {
            let outcome = extract_with_retry(extractor.as_ref(), &policy).await;
            (extractor.name().clone(), outcome)
        });
    }

    let mut raw_records = Vec::new();
    let mut failed_sources = 0u64;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Ok(records))) => {
                tracker.add_extracted(records.len() as u64);
                raw_records.extend(records);
            }
            Ok((source, Err(err))) => {
                failed_sources += 1;
                tracker.add_errors(1);
                tracing::warn!(source = %source, error = %err, "source failed extraction");
            }
            Err(e) => {
                failed_sources += 1;
                tracker.add_errors(1);
                tracing::error!(error = %e, "extraction task failed");
            }
        }
    }

    // Transform.
    tracker.advance(RunStatus::Transforming).await?;
    let chain = TransformChain::standard(&config.transform);
    let report = match chain.run(raw_records) {
        Ok(report) => report,
        Err(err) => {
            // Contract break between source and pipeline; nothing
            // downstream can be trusted.
            join_set.abort_all();
            return tracker.finalize(RunStatus::Failed, Some(err.to_string())).await;
        }
    };
    tracker.add_transformed(report.transformed.len() as u64);
    tracker.add_dead_lettered(report.rejected.len() as u64);

    // Dead letters are persisted before the gate so a gated run still
    // leaves its rejections inspectable.
    persist_rejections(
        Arc::clone(&options.run_store),
        config.pipeline.clone(),
        tracker.run_id(),
        report.rejected,
    )
    .await;

    let counts = tracker.counts();
    if !quality_gate(
        counts.transformed,
        counts.dead_lettered,
        config.transform.quality_threshold,
    ) {
        let message = format!(
            "quality gate failed: {} of {} records dead-lettered (threshold {})",
            counts.dead_lettered,
            counts.transformed + counts.dead_lettered,
            config.transform.quality_threshold
        );
        return tracker.finalize(RunStatus::Failed, Some(message)).await;
    }

    // Load.
    tracker.advance(RunStatus::Loading).await?;
    let loader = Loader::new(
        Arc::clone(&options.record_store),
        options.retry,
        config.resources.load_workers,
    );
    let load_report = loader.load(report.transformed).await;
    tracker.add_loaded(load_report.inserted + load_report.updated);
    tracker.add_load_failed(load_report.failed + load_report.skipped);

    if load_report.destination_unreachable() {
        return tracker
            .finalize(
                RunStatus::Failed,
                Some("destination unreachable after retries".into()),
            )
            .await;
    }

    let final_status = if failed_sources > 0 {
        RunStatus::PartiallyCompleted
    } else {
        RunStatus::Completed
    };
    tracker.finalize(final_status, None).await
}

/// Look up a previously tracked run.
///
/// # Errors
///
/// Returns a store error if the lookup fails.
pub async fn run_status(
    store: Arc<dyn RunStore>,
    run_id: i64,
) -> Result<Option<PipelineRun>, PipelineError> {
    tokio::task::spawn_blocking(move || store.get_run(run_id))
        .await
        .map_err(|e| PipelineError::Infrastructure(e.into()))?
        .map_err(PipelineError::from)
}
