//! Validate step: the rules a record must satisfy to be loadable.

use conveyor_types::error::TransformError;
use conveyor_types::record::RejectionStage;

use crate::transform::{Draft, TransformStep};

const MIN_TITLE_CHARS: usize = 2;

pub struct Validate;

impl Validate {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Validate {
    fn default() -> Self {
        Self::new()
    }
}

fn reject(rule: &str, reason: String) -> TransformError {
    TransformError::Quality {
        rule: rule.into(),
        reason,
    }
}

impl TransformStep for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn stage(&self) -> RejectionStage {
        RejectionStage::Validate
    }

    fn apply(&self, draft: Draft) -> Result<Draft, TransformError> {
        if let Some(title) = &draft.title {
            if title.chars().count() < MIN_TITLE_CHARS {
                return Err(reject(
                    "title_min_length",
                    format!("title '{title}' is shorter than {MIN_TITLE_CHARS} characters"),
                ));
            }
        }

        if let Some(url) = &draft.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(reject("url_scheme", format!("url '{url}' is not http(s)")));
            }
        }

        for (field, value) in [
            ("numeric_value_1", draft.numeric_value_1),
            ("numeric_value_2", draft.numeric_value_2),
        ] {
            if let Some(v) = value {
                if v < 0.0 || !v.is_finite() {
                    return Err(reject(
                        "non_negative_numeric",
                        format!("{field} is {v}, expected a finite non-negative number"),
                    ));
                }
            }
        }

        Ok(draft)
    }
}
