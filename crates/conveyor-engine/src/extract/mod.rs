//! Extractor contract, the retry wrapper, and the source factory.

pub mod api;
pub mod database;
pub mod file;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use conveyor_types::error::ExtractError;
use conveyor_types::record::{RawRecord, SourceKind};
use conveyor_types::run::SourceName;

use crate::config::types::{PipelineConfig, SourceConfig};
use crate::error::RetryPolicy;

pub use api::ApiExtractor;
pub use database::DatabaseExtractor;
pub use file::FileExtractor;

/// A source of raw records.
///
/// One `extract` call is restartable from scratch; there is no
/// mid-stream resume. Record-level problems (a malformed row) are
/// skipped inside the extractor and never abort the source.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &SourceName;

    fn kind(&self) -> SourceKind;

    /// Pull everything the source currently has.
    async fn extract(&self) -> Result<Vec<RawRecord>, ExtractError>;

    /// Connectivity probe for the `check` command. Must not mutate
    /// anything on the source side.
    async fn check(&self) -> Result<(), ExtractError>;
}

/// Run one extractor under the retry policy.
///
/// Retryable failures back off exponentially; a rate-limit reset hint
/// replaces the exponential term (still capped). After `max_attempts`
/// the last error surfaces. Sleeps run inside the calling task, so
/// aborting the task cancels the wait.
pub async fn extract_with_retry(
    extractor: &dyn Extractor,
    policy: &RetryPolicy,
) -> Result<Vec<RawRecord>, ExtractError> {
    let source = extractor.name().clone();
    let mut attempt = 1u32;
    loop {
        match extractor.extract().await {
            Ok(records) => {
                tracing::info!(
                    source = %source,
                    records = records.len(),
                    attempt,
                    "extraction complete"
                );
                return Ok(records);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let hint = err.retry_after_secs().map(Duration::from_secs);
                let delay = policy.delay_for(attempt, hint);
                tracing::warn!(
                    source = %source,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "extraction failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    source = %source,
                    attempt,
                    error = %err,
                    "extraction failed permanently"
                );
                return Err(err);
            }
        }
    }
}

/// Build one extractor per enabled source.
///
/// # Errors
///
/// Returns an error if a source's config body doesn't match its kind.
pub fn build_extractors(config: &PipelineConfig) -> Result<Vec<Arc<dyn Extractor>>> {
    config
        .enabled_sources()
        .into_iter()
        .map(build_extractor)
        .collect()
}

fn build_extractor(source: &SourceConfig) -> Result<Arc<dyn Extractor>> {
    let extractor: Arc<dyn Extractor> = match source.kind {
        SourceKind::Api => Arc::new(ApiExtractor::from_config(source)?),
        SourceKind::File => Arc::new(FileExtractor::from_config(source)?),
        SourceKind::Database => Arc::new(DatabaseExtractor::from_config(source)?),
    };
    Ok(extractor)
}
