//! Pipeline error model and retry backoff policy.

use std::time::Duration;

use conveyor_store::StoreError;
use conveyor_types::error::{ExtractError, LoadError, TransformError};

/// Categorized pipeline error for run-level decisions.
///
/// The stage variants wrap the typed taxonomy from `conveyor-types`;
/// classification happened where the error was raised, so callers match
/// on variants, never on message text. `Infrastructure` wraps opaque
/// host-side errors (task join failures, channel errors) that are never
/// retryable.
#[derive(Debug)]
pub enum PipelineError {
    Extract(ExtractError),
    Transform(TransformError),
    Load(LoadError),
    Store(StoreError),
    /// Host-side error (task join, channel, runtime).
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extract(e) => write!(f, "extract: {e}"),
            Self::Transform(e) => write!(f, "transform: {e}"),
            Self::Load(e) => write!(f, "load: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ExtractError> for PipelineError {
    fn from(e: ExtractError) -> Self {
        Self::Extract(e)
    }
}

impl From<TransformError> for PipelineError {
    fn from(e: TransformError) -> Self {
        Self::Transform(e)
    }
}

impl From<LoadError> for PipelineError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl PipelineError {
    /// Whether the originating stage marked this error as retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Extract(e) => e.is_retryable(),
            Self::Load(e) => e.is_retryable(),
            Self::Transform(_) | Self::Store(_) | Self::Infrastructure(_) => false,
        }
    }

    /// Whether this error aborts the whole run immediately.
    ///
    /// Schema violations mean the transform contract itself is broken;
    /// store and infrastructure failures mean the host can't continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transform(e) => e.is_fatal(),
            Self::Store(_) | Self::Infrastructure(_) => true,
            Self::Extract(_) | Self::Load(_) => false,
        }
    }
}

/// Exponential backoff policy for retryable stage errors.
///
/// Delay before attempt `n + 1` is `base * 2^(n-1)`, capped. A
/// rate-limit reset hint replaces the exponential term but is still
/// capped. Durations are fields rather than constants so tests can run
/// with millisecond bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Compute the delay before the next attempt.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    /// `retry_after` is the source's reset hint, if it gave one.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.cap);
        }
        let exp = attempt.saturating_sub(1).min(30);
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::error::{ExtractError, LoadError, TransformError};

    #[test]
    fn extract_connection_is_retryable_not_fatal() {
        let err = PipelineError::Extract(ExtractError::Connection {
            source: "api".into(),
            reason: "connection reset".into(),
        });
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn transform_schema_is_fatal() {
        let err = PipelineError::Transform(TransformError::Schema {
            reason: "payload is an array".into(),
        });
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transform_quality_is_neither_fatal_nor_retryable() {
        let err = PipelineError::Transform(TransformError::Quality {
            rule: "title_required".into(),
            reason: "missing".into(),
        });
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn load_integrity_is_not_retryable() {
        let err = PipelineError::Load(LoadError::Integrity {
            constraint: "unique".into(),
            reason: "dup".into(),
        });
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn infrastructure_is_fatal() {
        let err = PipelineError::Infrastructure(anyhow::anyhow!("channel closed"));
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(7, None), Duration::from_secs(60));
        assert_eq!(policy.delay_for(30, None), Duration::from_secs(60));
    }

    #[test]
    fn rate_limit_hint_overrides_exponent_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.delay_for(3, Some(Duration::from_secs(300))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.cap, Duration::from_secs(60));
    }
}
