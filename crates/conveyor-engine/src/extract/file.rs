//! JSON Lines file extractor.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use conveyor_types::error::ExtractError;
use conveyor_types::record::{RawRecord, SourceKind};
use conveyor_types::run::SourceName;

use crate::config::types::SourceConfig;
use crate::extract::Extractor;

#[derive(Debug, Deserialize)]
struct FileSourceConfig {
    path: PathBuf,
}

/// Reads a JSON Lines file, one record per line.
///
/// An unreadable file is a `Connection` failure (retryable, the mount
/// may come back). Malformed or non-object lines are skipped with a
/// warning; they never abort the source.
pub struct FileExtractor {
    name: SourceName,
    path: PathBuf,
}

impl FileExtractor {
    /// # Errors
    ///
    /// Returns an error if the source config body has no `path`.
    pub fn from_config(source: &SourceConfig) -> anyhow::Result<Self> {
        let body: FileSourceConfig = serde_json::from_value(source.config.clone())
            .map_err(|e| anyhow::anyhow!("source '{}': invalid file config: {e}", source.name))?;
        Ok(Self {
            name: source.name.clone(),
            path: body.path,
        })
    }

    fn read_contents(&self) -> Result<String, ExtractError> {
        std::fs::read_to_string(&self.path).map_err(|e| ExtractError::Connection {
            source: self.name.to_string(),
            reason: format!("cannot read {}: {e}", self.path.display()),
        })
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    fn name(&self) -> &SourceName {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn extract(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let contents = self.read_contents()?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) if value.is_object() => {
                    records.push(RawRecord::new(self.name.clone(), value));
                }
                Ok(_) => {
                    tracing::warn!(
                        source = %self.name,
                        line = line_no + 1,
                        "skipping non-object line"
                    );
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        source = %self.name,
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed line"
                    );
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(source = %self.name, skipped, "skipped lines in file source");
        }
        Ok(records)
    }

    async fn check(&self) -> Result<(), ExtractError> {
        self.read_contents().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn extractor_for(path: &std::path::Path) -> FileExtractor {
        FileExtractor {
            name: SourceName::new("inventory"),
            path: path.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn reads_well_formed_lines_and_skips_bad_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "1", "title": "First"}}"#).unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(file, "[1, 2, 3]").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "2", "title": "Second"}}"#).unwrap();
        file.flush().unwrap();

        let records = extractor_for(file.path()).extract().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload["id"], "1");
        assert_eq!(records[1].payload["id"], "2");
    }

    #[tokio::test]
    async fn missing_file_is_connection_error() {
        let extractor = extractor_for(std::path::Path::new("/nonexistent/records.jsonl"));
        let err = extractor.extract().await.unwrap_err();
        assert!(matches!(err, ExtractError::Connection { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn check_probes_readability() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(extractor_for(file.path()).check().await.is_ok());
        assert!(extractor_for(std::path::Path::new("/nope"))
            .check()
            .await
            .is_err());
    }

    #[test]
    fn builds_from_valid_config() {
        let source = SourceConfig {
            name: SourceName::new("inventory"),
            kind: SourceKind::File,
            enabled: true,
            config: serde_json::json!({"path": "data/inventory.jsonl"}),
        };
        let extractor = FileExtractor::from_config(&source).unwrap();
        assert_eq!(extractor.kind(), SourceKind::File);
    }
}
