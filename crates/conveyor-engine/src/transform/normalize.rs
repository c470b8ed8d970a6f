//! Normalize step: canonical text, tag set semantics, UTC dates.

use chrono::{DateTime, Utc};

use conveyor_types::error::TransformError;
use conveyor_types::record::RejectionStage;

use crate::config::types::TransformConfig;
use crate::transform::{Draft, TransformStep};

pub struct Normalize {
    config: TransformConfig,
}

impl Normalize {
    #[must_use]
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }
}

/// Collapse runs of whitespace to single spaces.
fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl TransformStep for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn stage(&self) -> RejectionStage {
        RejectionStage::Normalize
    }

    fn apply(&self, mut draft: Draft) -> Result<Draft, TransformError> {
        if let Some(title) = draft.title.take() {
            draft.title = Some(collapse_whitespace(&title));
        }
        if let Some(description) = draft.description.take() {
            draft.description = Some(collapse_whitespace(&description));
        }
        if let Some(url) = draft.url.take() {
            draft.url = Some(url.trim().to_string());
        }
        if let Some(category) = draft.category.take() {
            draft.category = Some(collapse_whitespace(&category));
        }

        // Tags behave as a set: lowercase, trimmed, first occurrence
        // kept, capped at max_tags.
        let mut tags: Vec<String> = Vec::new();
        for tag in draft.tags.drain(..) {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if self.config.deduplicate_tags && tags.contains(&tag) {
                continue;
            }
            tags.push(tag);
            if tags.len() >= self.config.max_tags {
                break;
            }
        }
        draft.tags = tags;

        if self.config.normalize_dates {
            for value in draft.extra.values_mut() {
                if let serde_json::Value::String(s) = value {
                    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                        *value = serde_json::Value::String(
                            dt.with_timezone(&Utc).to_rfc3339(),
                        );
                    }
                }
            }
        }

        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_types::record::RawRecord;
    use conveyor_types::run::SourceName;

    fn draft() -> Draft {
        Draft::new(RawRecord::new(
            SourceName::new("books"),
            serde_json::json!({}),
        ))
    }

    fn step() -> Normalize {
        Normalize::new(TransformConfig::default())
    }

    #[test]
    fn whitespace_collapsed_in_text_fields() {
        let mut d = draft();
        d.title = Some("  A   Title\twith\n gaps ".into());
        d.description = Some("multi\n\nline   text".into());
        let out = step().apply(d).unwrap();
        assert_eq!(out.title.as_deref(), Some("A Title with gaps"));
        assert_eq!(out.description.as_deref(), Some("multi line text"));
    }

    #[test]
    fn tags_lowercased_deduplicated_capped() {
        let mut d = draft();
        d.tags = vec![
            "Fiction".into(),
            " fiction ".into(),
            "CLASSIC".into(),
            "".into(),
        ];
        let out = step().apply(d).unwrap();
        assert_eq!(out.tags, vec!["fiction", "classic"]);
    }

    #[test]
    fn tag_cap_applies_after_dedup() {
        let mut config = TransformConfig::default();
        config.max_tags = 2;
        let mut d = draft();
        d.tags = vec!["a".into(), "A".into(), "b".into(), "c".into()];
        let out = Normalize::new(config).apply(d).unwrap();
        assert_eq!(out.tags, vec!["a", "b"]);
    }

    #[test]
    fn dedup_can_be_disabled() {
        let mut config = TransformConfig::default();
        config.deduplicate_tags = false;
        let mut d = draft();
        d.tags = vec!["x".into(), "X".into()];
        let out = Normalize::new(config).apply(d).unwrap();
        assert_eq!(out.tags, vec!["x", "x"]);
    }

    #[test]
    fn extra_timestamps_rewritten_to_utc() {
        let mut d = draft();
        d.extra.insert(
            "updated_at".into(),
            serde_json::json!("2026-03-01T10:00:00+05:00"),
        );
        d.extra.insert("publisher".into(), serde_json::json!("Acme"));
        let out = step().apply(d).unwrap();
        assert_eq!(
            out.extra.get("updated_at").unwrap(),
            "2026-03-01T05:00:00+00:00"
        );
        assert_eq!(out.extra.get("publisher").unwrap(), "Acme");
    }
}
