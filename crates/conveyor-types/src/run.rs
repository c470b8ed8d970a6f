//! Run-tracking model: identifiers, the run state machine, and per-stage
//! counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque pipeline identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(String);

impl PipelineId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PipelineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PipelineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque source name (e.g. `"github"`, `"weather_csv"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SourceName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SourceName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Run state machine
// ---------------------------------------------------------------------------

/// Pipeline run status.
///
/// Happy path: `Pending → Extracting → Transforming → Loading → Completed`.
/// `Failed` is reachable from any non-terminal state. `PartiallyCompleted`
/// is reachable only from `Loading`, when at least one source failed to
/// extract but the run otherwise finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Extracting,
    Transforming,
    Loading,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl RunStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Transforming => "transforming",
            Self::Loading => "loading",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the wire-format string back.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "extracting" => Some(Self::Extracting),
            "transforming" => Some(Self::Transforming),
            "loading" => Some(Self::Loading),
            "completed" => Some(Self::Completed),
            "partially_completed" => Some(Self::PartiallyCompleted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states are never left.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyCompleted | Self::Failed
        )
    }

    /// Whether `next` is a legal transition from `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed) => true,
            (Self::Pending, Self::Extracting)
            | (Self::Extracting, Self::Transforming)
            | (Self::Transforming, Self::Loading)
            | (Self::Loading, Self::Completed | Self::PartiallyCompleted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Per-stage counters for a run.
///
/// Invariants for any run: `extracted >= transformed + dead_lettered` and
/// `transformed >= loaded + load_failed`. A violation is a counting bug,
/// not valid pipeline behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub extracted: u64,
    pub transformed: u64,
    pub dead_lettered: u64,
    pub loaded: u64,
    pub load_failed: u64,
    /// Stage-level errors (e.g. sources that exhausted retries).
    pub errors: u64,
}

impl RunCounts {
    /// Check the accounting invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.extracted >= self.transformed + self.dead_lettered
            && self.transformed >= self.loaded + self.load_failed
    }
}

/// Complete pipeline run record, as tracked and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: i64,
    pub pipeline: PipelineId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: RunCounts,
    /// Frozen configuration used for this run.
    pub config_snapshot: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PipelineRun {
    /// Run duration, once finished.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at.map(|end| {
            (end - self.started_at).num_milliseconds() as f64 / 1000.0
        })
    }
}
