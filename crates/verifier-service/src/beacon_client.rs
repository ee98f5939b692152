//! Beacon API HTTP client.
//!
//! Grounded on `proof-gen/src/beacon_client.rs`: a thin typed wrapper
//! around `reqwest`, a `thiserror` error enum per failure mode, and
//! `#[instrument]` on every request method.

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// Errors from the beacon's public HTTP API (spec.md §6).
#[derive(Debug, Error)]
pub enum BeaconApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("beacon API answered with non-200 status {0}")]
    BadStatus(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct PulseLastResponse {
    pulse: PulseLast,
}

#[derive(Debug, Deserialize)]
struct PulseLast {
    uri: String,
    external: ExternalValue,
}

#[derive(Debug, Deserialize)]
struct ExternalValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ExtValueResponse {
    events: Vec<ExtValueEvent>,
}

/// One source's extraction parameters, as returned by
/// `GET {base_api}/extValue/{value}` (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtValueEvent {
    #[serde(rename = "sourceName")]
    pub source_name: String,
    pub metadata: String,
    pub raw: String,
    #[serde(default)]
    pub status: u32,
}

/// Minimal client for the beacon's pulse/extraction-value API.
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: reqwest::Client,
    base_api: String,
}

impl BeaconClient {
    #[must_use]
    pub fn new(base_api: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_api: base_api.into(),
        }
    }

    /// Fetches the latest pulse's URL and external value.
    ///
    /// # Errors
    /// Returns [`BeaconApiError`] on a transport failure or non-200
    /// response (spec.md §6).
    #[instrument(skip(self))]
    pub async fn get_latest_pulse(&self) -> Result<(String, String), BeaconApiError> {
        let url = format!("{}/pulse/last", self.base_api);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(BeaconApiError::BadStatus(resp.status()));
        }
        let body: PulseLastResponse = resp.json().await?;
        Ok((body.pulse.uri, body.pulse.external.value))
    }

    /// Fetches the per-source extraction parameters for a pulse's
    /// external value, keyed by source name.
    ///
    /// # Errors
    /// Returns [`BeaconApiError`] on a transport failure or non-200
    /// response (spec.md §6).
    #[instrument(skip(self))]
    pub async fn get_ext_value_params(
        &self,
        value: &str,
    ) -> Result<std::collections::HashMap<String, ExtValueEvent>, BeaconApiError> {
        let url = format!("{}/extValue/{value}", self.base_api);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(BeaconApiError::BadStatus(resp.status()));
        }
        let body: ExtValueResponse = resp.json().await?;
        Ok(body
            .events
            .into_iter()
            .map(|e| (e.source_name.clone(), e))
            .collect())
    }
}
