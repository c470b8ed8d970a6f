//! Pipeline configuration types deserialized from YAML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use conveyor_types::record::SourceKind;
use conveyor_types::run::{PipelineId, SourceName};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: PipelineId,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub transform: TransformConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

impl PipelineConfig {
    /// Sources that will actually run.
    #[must_use]
    pub fn enabled_sources(&self) -> Vec<&SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }
}

/// One configured source. The `config` body is source-native and opaque
/// to the core; only the extractor for `kind` interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: SourceName,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Transform chain tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Dead-letter ratio above which the run fails before loading.
    pub quality_threshold: f64,
    pub normalize_dates: bool,
    pub deduplicate_tags: bool,
    pub max_tags: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.2,
            normalize_dates: true,
            deduplicate_tags: true,
            max_tags: 10,
        }
    }
}

/// Destination store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub path: PathBuf,
    /// Archive prior versions on update.
    #[serde(default = "default_true")]
    pub history: bool,
}

/// Run-tracking state settings. `path: None` keeps run state in memory,
/// which is only useful for tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: Option<PathBuf>,
}

/// Execution resource knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max_attempts: u32,
    pub load_workers: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            load_workers: 4,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_defaults() {
        let t = TransformConfig::default();
        assert!((t.quality_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(t.max_tags, 10);
        assert!(t.deduplicate_tags);
    }

    #[test]
    fn source_enabled_defaults_true() {
        let yaml = "name: books\ntype: api\n";
        let source: SourceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(source.enabled);
        assert_eq!(source.kind, SourceKind::Api);
        assert!(source.config.is_null());
    }

    #[test]
    fn enabled_sources_filters_disabled() {
        let yaml = r#"
version: "1.0"
pipeline: demo
sources:
  - name: books
    type: api
  - name: legacy
    type: file
    enabled: false
destination:
  path: out/records.db
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        let enabled = config.enabled_sources();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name.as_str(), "books");
        assert_eq!(config.resources.load_workers, 4);
    }
}
