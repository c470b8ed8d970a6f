//! Stage error taxonomy.
//!
//! Every failure is classified exactly once, at the point of origin, into
//! one of three stage-scoped enums. Downstream components act only on the
//! variant (retry, skip, dead-letter, abort), never on message text.

use serde::{Deserialize, Serialize};

/// Failure raised while pulling records from a source.
///
/// `source` is the name of the pipeline source, not an error cause, so
/// the `Display` and `Error` impls are written by hand instead of derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractError {
    /// Could not reach the source. Retryable with backoff.
    Connection { source: String, reason: String },

    /// Source throttled the extractor. Retryable after the reset hint.
    RateLimited {
        source: String,
        /// Seconds until the source says it will accept requests again.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },

    /// A single record could not be parsed. Skipped, never retried.
    InvalidRecord { source: String, reason: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { source, reason } => {
                write!(f, "source '{source}' unreachable: {reason}")
            }
            Self::RateLimited { source, .. } => write!(f, "source '{source}' rate limited"),
            Self::InvalidRecord { source, reason } => {
                write!(f, "invalid record from '{source}': {reason}")
            }
        }
    }
}

impl std::error::Error for ExtractError {}

impl ExtractError {
    /// Whether retrying the whole extraction call can help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::RateLimited { .. })
    }

    /// Source-provided reset hint, if any.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Failure raised by a transform step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformError {
    /// The record's shape breaks the source/pipeline contract.
    /// Fatal to the entire run.
    #[error("schema violation: {reason}")]
    Schema { reason: String },

    /// A single record failed a quality rule. Routed to the dead letter.
    #[error("quality rule '{rule}' failed: {reason}")]
    Quality { rule: String, reason: String },
}

impl TransformError {
    /// `Schema` errors abort the run; `Quality` errors are record-level.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

/// Failure raised while persisting a transformed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadError {
    /// Destination unreachable. Retryable with backoff.
    #[error("destination '{target}' unreachable: {reason}")]
    Connection { target: String, reason: String },

    /// A constraint beyond the natural key was violated.
    /// Marks that one record failed; the batch continues.
    #[error("integrity constraint '{constraint}' violated: {reason}")]
    Integrity { constraint: String, reason: String },
}

impl LoadError {
    /// Whether retrying the write can help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_rate_limit_are_retryable() {
        let conn = ExtractError::Connection {
            source: "api".into(),
            reason: "timeout".into(),
        };
        assert!(conn.is_retryable());
        assert!(conn.retry_after_secs().is_none());

        let limited = ExtractError::RateLimited {
            source: "api".into(),
            retry_after_secs: Some(30),
        };
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after_secs(), Some(30));
    }

    #[test]
    fn invalid_record_is_not_retryable() {
        let err = ExtractError::InvalidRecord {
            source: "file".into(),
            reason: "not a JSON object".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn schema_is_fatal_quality_is_not() {
        assert!(TransformError::Schema {
            reason: "payload is an array".into()
        }
        .is_fatal());
        assert!(!TransformError::Quality {
            rule: "title_required".into(),
            reason: "missing title".into()
        }
        .is_fatal());
    }

    #[test]
    fn load_integrity_is_not_retryable() {
        let err = LoadError::Integrity {
            constraint: "uq_url".into(),
            reason: "duplicate url".into(),
        };
        assert!(!err.is_retryable());
        assert!(LoadError::Connection {
            target: "sqlite".into(),
            reason: "locked".into()
        }
        .is_retryable());
    }

    #[test]
    fn extract_error_serde_roundtrip() {
        let err = ExtractError::RateLimited {
            source: "api".into(),
            retry_after_secs: Some(5),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("rate_limited"));
        let back: ExtractError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn extract_error_displays_the_source_name_without_a_cause_chain() {
        let err = ExtractError::Connection {
            source: "api".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "source 'api' unreachable: timeout");
        assert!(std::error::Error::source(&err).is_none());

        let limited = ExtractError::RateLimited {
            source: "api".into(),
            retry_after_secs: Some(30),
        };
        assert_eq!(limited.to_string(), "source 'api' rate limited");
    }

    #[test]
    fn display_includes_classification_detail() {
        let err = LoadError::Integrity {
            constraint: "uq_url".into(),
            reason: "dup".into(),
        };
        assert!(err.to_string().contains("uq_url"));
    }
}
