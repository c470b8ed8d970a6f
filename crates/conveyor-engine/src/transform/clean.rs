//! Clean step: pull the unified fields out of the source-native
//! payload, drop blank strings, coerce numerics.

use conveyor_types::error::TransformError;
use conveyor_types::record::RejectionStage;

use crate::transform::{Draft, TransformStep};

// Field aliases across the supported sources, first match wins.
const SOURCE_ID_KEYS: &[&str] = &["source_id", "id"];
const TITLE_KEYS: &[&str] = &["title", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary"];
const URL_KEYS: &[&str] = &["url", "link"];
const CATEGORY_KEYS: &[&str] = &["category"];
const NUMERIC_1_KEYS: &[&str] = &["numeric_value_1", "rating", "value"];
const NUMERIC_2_KEYS: &[&str] = &["numeric_value_2", "price"];
const TAGS_KEYS: &[&str] = &["tags"];

pub struct Clean;

impl Clean {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Clean {
    fn default() -> Self {
        Self::new()
    }
}

/// A string is "present" only if it has non-whitespace content.
fn non_blank(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce a JSON value to f64, accepting numeric strings.
fn coerce_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn first_match<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<&'a serde_json::Value> {
    keys.iter().find_map(|k| object.get(*k))
}

impl TransformStep for Clean {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn stage(&self) -> RejectionStage {
        RejectionStage::Clean
    }

    fn apply(&self, mut draft: Draft) -> Result<Draft, TransformError> {
        let Some(object) = draft.raw.payload.as_object() else {
            return Err(TransformError::Schema {
                reason: format!(
                    "payload from '{}' is not a JSON object",
                    draft.raw.source
                ),
            });
        };

        draft.source_id = first_match(object, SOURCE_ID_KEYS).and_then(non_blank);
        if draft.source_id.is_none() {
            return Err(TransformError::Quality {
                rule: "source_id_required".into(),
                reason: "no usable source id in payload".into(),
            });
        }

        draft.title = first_match(object, TITLE_KEYS).and_then(non_blank);
        if draft.title.is_none() {
            return Err(TransformError::Quality {
                rule: "title_required".into(),
                reason: "no usable title in payload".into(),
            });
        }

        draft.description = first_match(object, DESCRIPTION_KEYS).and_then(non_blank);
        draft.url = first_match(object, URL_KEYS).and_then(non_blank);
        draft.category = first_match(object, CATEGORY_KEYS).and_then(non_blank);
        draft.numeric_value_1 = first_match(object, NUMERIC_1_KEYS).and_then(coerce_number);
        draft.numeric_value_2 = first_match(object, NUMERIC_2_KEYS).and_then(coerce_number);

        if let Some(serde_json::Value::Array(tags)) = first_match(object, TAGS_KEYS) {
            draft.tags = tags.iter().filter_map(non_blank).collect();
        }

        // Everything not claimed by a unified field rides along in extra.
        let claimed: Vec<&str> = [
            SOURCE_ID_KEYS,
            TITLE_KEYS,
            DESCRIPTION_KEYS,
            URL_KEYS,
            CATEGORY_KEYS,
            NUMERIC_1_KEYS,
            NUMERIC_2_KEYS,
            TAGS_KEYS,
        ]
        .concat();
        draft.extra = object
            .iter()
            .filter(|(k, _)| !claimed.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(draft)
    }
}
