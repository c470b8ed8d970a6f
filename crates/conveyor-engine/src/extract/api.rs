//! HTTP API extractor.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use conveyor_types::error::ExtractError;
use conveyor_types::record::{RawRecord, SourceKind};
use conveyor_types::run::SourceName;

use crate::config::types::SourceConfig;
use crate::extract::Extractor;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiSourceConfig {
    endpoint: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Pulls a JSON array of records from a GET endpoint.
///
/// HTTP 429 maps to `RateLimited` with the `Retry-After` hint when the
/// server sends one; transport failures and non-success statuses map to
/// `Connection`. Array elements that are not JSON objects are skipped.
#[derive(Debug)]
pub struct ApiExtractor {
    name: SourceName,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ApiExtractor {
    /// # Errors
    ///
    /// Returns an error if the source config body doesn't match the
    /// API shape or the HTTP client can't be built.
    pub fn from_config(source: &SourceConfig) -> anyhow::Result<Self> {
        let body: ApiSourceConfig = serde_json::from_value(source.config.clone())
            .map_err(|e| anyhow::anyhow!("source '{}': invalid api config: {e}", source.name))?;
        let timeout = Duration::from_secs(body.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("source '{}': http client: {e}", source.name))?;
        Ok(Self {
            name: source.name.clone(),
            endpoint: body.endpoint,
            api_key: body.api_key,
            client,
        })
    }

    fn connection_error(&self, reason: impl std::fmt::Display) -> ExtractError {
        ExtractError::Connection {
            source: self.name.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn get(&self) -> Result<reqwest::Response, ExtractError> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| self.connection_error(e))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ExtractError::RateLimited {
                source: self.name.to_string(),
                retry_after_secs,
            });
        }

        if !response.status().is_success() {
            return Err(self.connection_error(format!("http status {}", response.status())));
        }

        Ok(response)
    }
}

#[async_trait]
impl Extractor for ApiExtractor {
    fn name(&self) -> &SourceName {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn extract(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let response = self.get().await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.connection_error(format!("invalid response body: {e}")))?;

        let serde_json::Value::Array(items) = body else {
            return Err(ExtractError::InvalidRecord {
                source: self.name.to_string(),
                reason: "response body is not a JSON array".into(),
            });
        };

        let mut records = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for item in items {
            if item.is_object() {
                records.push(RawRecord::new(self.name.clone(), item));
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::warn!(
                source = %self.name,
                skipped,
                "skipped non-object elements in api response"
            );
        }
        Ok(records)
    }

    async fn check(&self) -> Result<(), ExtractError> {
        self.get().await.map(|_| ())
    }
}
