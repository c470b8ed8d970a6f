//! Transform chain: Clean, Normalize, Validate, in that order.

pub mod clean;
pub mod normalize;
pub mod validate;

use chrono::Utc;

use conveyor_types::error::TransformError;
use conveyor_types::record::{RawRecord, RejectedRecord, RejectionStage, TransformedRecord};

use crate::config::types::TransformConfig;

pub use clean::Clean;
pub use normalize::Normalize;
pub use validate::Validate;

/// Working record shape between steps. Steps take and return drafts;
/// the chain finalizes a surviving draft into a `TransformedRecord`.
#[derive(Debug, Clone)]
pub struct Draft {
    pub raw: RawRecord,
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub numeric_value_1: Option<f64>,
    pub numeric_value_2: Option<f64>,
    pub tags: Vec<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Draft {
    #[must_use]
    pub fn new(raw: RawRecord) -> Self {
        Self {
            raw,
            source_id: None,
            title: None,
            description: None,
            url: None,
            category: None,
            numeric_value_1: None,
            numeric_value_2: None,
            tags: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    fn finalize(self) -> Result<TransformedRecord, TransformError> {
        let (Some(source_id), Some(title)) = (self.source_id, self.title) else {
            return Err(TransformError::Quality {
                rule: "incomplete_record".into(),
                reason: "draft left the chain without source_id and title".into(),
            });
        };
        Ok(TransformedRecord {
            source: self.raw.source,
            source_id,
            title,
            description: self.description,
            url: self.url,
            category: self.category,
            numeric_value_1: self.numeric_value_1,
            numeric_value_2: self.numeric_value_2,
            tags: self.tags,
            extra: self.extra,
            extracted_at: self.raw.extracted_at,
            transformed_at: Utc::now(),
            version: 1,
        })
    }
}

/// One step of the chain.
pub trait TransformStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> RejectionStage;

    /// Apply the step. A `Quality` error dead-letters this record; a
    /// `Schema` error aborts the whole run.
    fn apply(&self, draft: Draft) -> Result<Draft, TransformError>;
}

/// Everything the chain produced from one batch.
#[derive(Debug, Default)]
pub struct TransformReport {
    pub transformed: Vec<TransformedRecord>,
    pub rejected: Vec<RejectedRecord>,
}

/// Fixed-order transform chain.
pub struct TransformChain {
    steps: Vec<Box<dyn TransformStep>>,
}

impl TransformChain {
    /// The standard Clean → Normalize → Validate chain.
    #[must_use]
    pub fn standard(config: &TransformConfig) -> Self {
        Self {
            steps: vec![
                Box::new(Clean::new()),
                Box::new(Normalize::new(config.clone())),
                Box::new(Validate::new()),
            ],
        }
    }

    /// Run the chain over a batch.
    ///
    /// Quality failures route the original raw record to `rejected`
    /// and never raise. A `Schema` error aborts immediately.
    ///
    /// # Errors
    ///
    /// Returns the first `Schema` error encountered.
    pub fn run(&self, records: Vec<RawRecord>) -> Result<TransformReport, TransformError> {
        let mut report = TransformReport::default();

        'records: for raw in records {
            let mut draft = Draft::new(raw.clone());
            for step in &self.steps {
                match step.apply(draft) {
                    Ok(next) => draft = next,
                    Err(TransformError::Quality { rule, reason }) => {
                        tracing::debug!(
                            source = %raw.source,
                            step = step.name(),
                            rule = %rule,
                            "record rejected"
                        );
                        report.rejected.push(RejectedRecord {
                            record: raw,
                            rule,
                            reason,
                            stage: step.stage(),
                        });
                        continue 'records;
                    }
                    Err(err @ TransformError::Schema { .. }) => {
                        tracing::error!(
                            source = %raw.source,
                            step = step.name(),
                            error = %err,
                            "schema violation aborts the run"
                        );
                        return Err(err);
                    }
                }
            }
            match draft.finalize() {
                Ok(record) => report.transformed.push(record),
                Err(TransformError::Quality { rule, reason }) => {
                    report.rejected.push(RejectedRecord {
                        record: raw,
                        rule,
                        reason,
                        stage: RejectionStage::Validate,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }
}

/// Whether the batch may proceed to loading.
///
/// Fails when `dead_lettered / (transformed + dead_lettered)` is
/// strictly greater than the threshold. An empty batch passes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn quality_gate(transformed: u64, dead_lettered: u64, threshold: f64) -> bool {
    let total = transformed + dead_lettered;
    if total == 0 {
        return true;
    }
    let ratio = dead_lettered as f64 / total as f64;
    ratio <= threshold
}
