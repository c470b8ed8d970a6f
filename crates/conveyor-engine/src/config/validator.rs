//! Semantic validation of a parsed pipeline config.

use std::collections::HashSet;

use anyhow::Result;

use crate::config::types::PipelineConfig;

/// Validate a parsed config before a run starts.
///
/// All problems are collected and reported together so the operator
/// fixes the file once, not field by field.
///
/// # Errors
///
/// Returns a single error listing every violation found.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.pipeline.as_str().is_empty() {
        problems.push("pipeline name must not be empty".to_string());
    }

    if config.enabled_sources().is_empty() {
        problems.push("at least one enabled source is required".to_string());
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.name.as_str()) {
            problems.push(format!("duplicate source name: {}", source.name));
        }
    }

    let threshold = config.transform.quality_threshold;
    if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
        problems.push(format!(
            "transform.quality_threshold must be within [0, 1], got {threshold}"
        ));
    }

    if config.resources.load_workers == 0 {
        problems.push("resources.load_workers must be at least 1".to_string());
    }

    if config.resources.max_attempts == 0 {
        problems.push("resources.max_attempts must be at least 1".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("invalid pipeline config: {}", problems.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_config;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
pipeline: demo
sources:
  - name: books
    type: api
destination:
  path: out/records.db
"#
    }

    #[test]
    fn valid_config_passes() {
        let config = parse_pipeline_config(valid_yaml()).unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_sources_disabled_is_invalid() {
        let mut config = parse_pipeline_config(valid_yaml()).unwrap();
        config.sources[0].enabled = false;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("at least one enabled source"));
    }

    #[test]
    fn duplicate_source_names_rejected() {
        let mut config = parse_pipeline_config(valid_yaml()).unwrap();
        let dup = config.sources[0].clone();
        config.sources.push(dup);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("duplicate source name: books"));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let mut config = parse_pipeline_config(valid_yaml()).unwrap();
        config.transform.quality_threshold = 1.5;
        assert!(validate_config(&config).is_err());
        config.transform.quality_threshold = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = parse_pipeline_config(valid_yaml()).unwrap();
        config.resources.load_workers = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("load_workers"));
    }

    #[test]
    fn multiple_problems_reported_together() {
        let mut config = parse_pipeline_config(valid_yaml()).unwrap();
        config.sources[0].enabled = false;
        config.resources.max_attempts = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("enabled source"));
        assert!(err.contains("max_attempts"));
    }
}
