//! CDN cache purge over HTTP.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::error::StorageError;

/// Request timeout for purge calls.
const PURGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct PurgeRequest<'a> {
    url: &'a str,
}

/// Purges cached copies of deleted files.
///
/// Without an endpoint every purge is a no-op.
#[derive(Debug, Clone)]
pub struct CdnPurger {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl CdnPurger {
    /// Create a purger posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Option<String>) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(PURGE_TIMEOUT)
            .build()
            .map_err(|e| StorageError::configuration(format!("http client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// Whether purge calls reach an endpoint.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Purge `url` from the CDN.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the endpoint answers with a
    /// non-success status.
    pub async fn purge(&self, url: &str) -> Result<(), StorageError> {
        let Some(endpoint) = &self.endpoint else {
            debug!(url, "no CDN purge endpoint configured, skipping");
            return Ok(());
        };

        let response = self
            .client
            .post(endpoint)
            .json(&PurgeRequest { url })
            .send()
            .await
            .map_err(|e| StorageError::purge(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::purge(format!("{status}: {body}")));
        }

        debug!(url, "CDN cache purged");
        Ok(())
    }
}
