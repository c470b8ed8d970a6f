//! Record shapes flowing through a pipeline run.
//!
//! `RawRecord` is what an extractor produces, `TransformedRecord` is the
//! canonical shape after the transform chain, and `RejectedRecord` is a
//! dead-lettered raw record kept for inspection. All three are immutable
//! once produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::run::SourceName;

/// The three supported source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Api,
    File,
    Database,
}

impl SourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::File => "file",
            Self::Database => "database",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as pulled from a source, before any transformation.
///
/// The payload is the source-native shape: an opaque JSON object whose
/// keys and nesting the core never interprets directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceName,
    pub payload: serde_json::Value,
    pub extracted_at: DateTime<Utc>,
}

impl RawRecord {
    /// Build a raw record stamped with the current time.
    #[must_use]
    pub fn new(source: SourceName, payload: serde_json::Value) -> Self {
        Self {
            source,
            payload,
            extracted_at: Utc::now(),
        }
    }
}

/// The (source, source-native id) pair uniquely identifying a logical
/// record across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source: SourceName,
    pub source_id: String,
}

impl NaturalKey {
    #[must_use]
    pub fn new(source: SourceName, source_id: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
        }
    }

    /// Render as `source:id`, the form stored and logged.
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.source, self.source_id)
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// Canonical record produced by the transform chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    pub source: SourceName,
    pub source_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value_1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value_2: Option<f64>,
    /// Unique, lowercased, order-irrelevant.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form attributes carried through from the source.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub extracted_at: DateTime<Utc>,
    pub transformed_at: DateTime<Utc>,
    /// Monotonically increasing; the store bumps it on update.
    pub version: i64,
}

impl TransformedRecord {
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(self.source.clone(), self.source_id.clone())
    }
}

/// Transform step at which a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Clean,
    Normalize,
    Validate,
}

impl std::fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Clean => "clean",
            Self::Normalize => "normalize",
            Self::Validate => "validate",
        };
        f.write_str(s)
    }
}

/// A dead-lettered record: permanently rejected at the transform stage,
/// retained for inspection, never retried automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record: RawRecord,
    /// Name of the failing rule.
    pub rule: String,
    pub reason: String,
    pub stage: RejectionStage,
}

/// Per-record result of a load attempt.
///
/// `Skipped` marks a record never attempted because its worker already
/// declared the destination unreachable.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Inserted { id: i64 },
    Updated { id: i64, version: i64 },
    Skipped { key: NaturalKey },
    Failed { key: NaturalKey, error: LoadError },
}

impl LoadOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_identifier_format() {
        let key = NaturalKey::new(SourceName::new("github"), "42");
        assert_eq!(key.identifier(), "github:42");
        assert_eq!(key.to_string(), "github:42");
    }

    #[test]
    fn natural_key_equality_ignores_nothing() {
        let a = NaturalKey::new(SourceName::new("s"), "1");
        let b = NaturalKey::new(SourceName::new("s"), "1");
        let c = NaturalKey::new(SourceName::new("s"), "2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn source_kind_as_str() {
        assert_eq!(SourceKind::Api.as_str(), "api");
        assert_eq!(SourceKind::File.as_str(), "file");
        assert_eq!(SourceKind::Database.as_str(), "database");
    }

    #[test]
    fn raw_record_stamps_extraction_time() {
        let rec = RawRecord::new(
            SourceName::new("weather"),
            serde_json::json!({"temp": 15.2}),
        );
        assert_eq!(rec.source.as_str(), "weather");
        assert!(rec.extracted_at <= Utc::now());
    }

    #[test]
    fn transformed_record_serde_roundtrip() {
        let rec = TransformedRecord {
            source: SourceName::new("books"),
            source_id: "978-1".into(),
            title: "A Title".into(),
            description: None,
            url: Some("https://example.com".into()),
            category: Some("Books".into()),
            numeric_value_1: Some(4.0),
            numeric_value_2: Some(12.5),
            tags: vec!["fiction".into()],
            extra: serde_json::Map::new(),
            extracted_at: Utc::now(),
            transformed_at: Utc::now(),
            version: 1,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: TransformedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
        assert_eq!(back.natural_key().identifier(), "books:978-1");
    }

    #[test]
    fn load_outcome_failure_flag() {
        assert!(!LoadOutcome::Inserted { id: 1 }.is_failure());
        assert!(LoadOutcome::Failed {
            key: NaturalKey::new(SourceName::new("s"), "1"),
            error: crate::error::LoadError::Integrity {
                constraint: "x".into(),
                reason: "y".into()
            },
        }
        .is_failure());
    }
}
