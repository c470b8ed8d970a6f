//! SQLite database extractor.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use conveyor_types::error::ExtractError;
use conveyor_types::record::{RawRecord, SourceKind};
use conveyor_types::run::SourceName;

use crate::config::types::SourceConfig;
use crate::extract::Extractor;

#[derive(Debug, Deserialize)]
struct DatabaseSourceConfig {
    path: PathBuf,
    query: String,
}

/// Runs a read-only query against a SQLite file; each row becomes a
/// JSON object keyed by column name.
///
/// Open and query failures map to `Connection`. The blocking rusqlite
/// calls run on the blocking pool, never on the async workers.
pub struct DatabaseExtractor {
    name: SourceName,
    path: PathBuf,
    query: String,
}

impl DatabaseExtractor {
    /// # Errors
    ///
    /// Returns an error if the source config body doesn't have both
    /// `path` and `query`.
    pub fn from_config(source: &SourceConfig) -> anyhow::Result<Self> {
        let body: DatabaseSourceConfig =
            serde_json::from_value(source.config.clone()).map_err(|e| {
                anyhow::anyhow!("source '{}': invalid database config: {e}", source.name)
            })?;
        Ok(Self {
            name: source.name.clone(),
            path: body.path,
            query: body.query,
        })
    }

    fn connection_error(name: &SourceName, reason: impl std::fmt::Display) -> ExtractError {
        ExtractError::Connection {
            source: name.to_string(),
            reason: reason.to_string(),
        }
    }

    fn query_rows(
        name: &SourceName,
        path: &std::path::Path,
        query: &str,
    ) -> Result<Vec<serde_json::Value>, ExtractError> {
        if !path.exists() {
            return Err(Self::connection_error(
                name,
                format!("database file not found: {}", path.display()),
            ));
        }
        let conn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|e| Self::connection_error(name, e))?;

        let mut stmt = conn
            .prepare(query)
            .map_err(|e| Self::connection_error(name, e))?;
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = stmt
            .query([])
            .map_err(|e| Self::connection_error(name, e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Self::connection_error(name, e))? {
            let mut object = serde_json::Map::with_capacity(column_names.len());
            for (idx, column) in column_names.iter().enumerate() {
                let value = match row.get_ref(idx).map_err(|e| Self::connection_error(name, e))? {
                    rusqlite::types::ValueRef::Null => serde_json::Value::Null,
                    rusqlite::types::ValueRef::Integer(i) => serde_json::Value::from(i),
                    rusqlite::types::ValueRef::Real(f) => serde_json::Number::from_f64(f)
                        .map_or(serde_json::Value::Null, serde_json::Value::Number),
                    rusqlite::types::ValueRef::Text(t) => {
                        serde_json::Value::String(String::from_utf8_lossy(t).into_owned())
                    }
                    // Opaque bytes have no place in the unified schema.
                    rusqlite::types::ValueRef::Blob(_) => serde_json::Value::Null,
                };
                object.insert(column.clone(), value);
            }
            out.push(serde_json::Value::Object(object));
        }
        Ok(out)
    }
}

#[async_trait]
impl Extractor for DatabaseExtractor {
    fn name(&self) -> &SourceName {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Database
    }

    async fn extract(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let name = self.name.clone();
        let path = self.path.clone();
        let query = self.query.clone();

        let rows = tokio::task::spawn_blocking(move || Self::query_rows(&name, &path, &query))
            .await
            .map_err(|e| Self::connection_error(&self.name, format!("task join: {e}")))??;

        Ok(rows
            .into_iter()
            .map(|payload| RawRecord::new(self.name.clone(), payload))
            .collect())
    }

    async fn check(&self) -> Result<(), ExtractError> {
        let name = self.name.clone();
        let path = self.path.clone();
        let query = self.query.clone();
        tokio::task::spawn_blocking(move || {
            Self::query_rows(&name, &path, &query).map(|_| ())
        })
        .await
        .map_err(|e| Self::connection_error(&self.name, format!("task join: {e}")))?
    }
}
