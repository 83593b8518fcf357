//! Forward geocoding: turn a user-entered place name into coordinates.
//! Uses the OpenWeatherMap direct geocoding endpoint; only the first
//! candidate is used.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::client::USER_AGENT;
use crate::error::{NetworkError, ResolutionError};
use crate::types::Coordinates;

pub const GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";

#[derive(Debug, Deserialize)]
struct Candidate {
    lat: Value,
    lon: Value,
}

#[derive(Debug, Clone)]
pub struct LocationResolver {
    client: Arc<Client>,
    base_url: Url,
    api_key: Option<String>,
}

impl LocationResolver {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let base_url =
            Url::parse(base_url).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key,
        })
    }

    /// Resolve a new location, or keep `current` when the input is blank.
    ///
    /// The lookup is skipped entirely for blank input.
    pub async fn resolve_or_keep(
        &self,
        query: &str,
        current: Coordinates,
    ) -> Result<Coordinates, ResolutionError> {
        if query.trim().is_empty() {
            tracing::debug!("Empty location input, keeping stored coordinates");
            return Ok(current);
        }
        self.resolve(query).await
    }

    /// Look up a place name. Fails when the provider returns no candidates or
    /// an unreadable payload.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve(&self, query: &str) -> Result<Coordinates, ResolutionError> {
        let query = query.trim();
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if let Some(key) = &self.api_key {
                pairs.append_pair("appid", key);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body = response.bytes().await.map_err(NetworkError::from)?;
        let candidates: Vec<Candidate> = serde_json::from_slice(&body)
            .map_err(|e| ResolutionError::Malformed(e.to_string()))?;

        let first = candidates
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NoMatch(query.to_string()))?;

        let coordinates = match (coordinate(&first.lat), coordinate(&first.lon)) {
            (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                Coordinates::new(lat, lon)
            }
            _ => {
                return Err(ResolutionError::Malformed(format!(
                    "invalid coordinates lat={} lon={}",
                    first.lat, first.lon
                )))
            }
        };

        tracing::info!(
            "Resolved \"{}\" to {}, {}",
            query,
            coordinates.latitude,
            coordinates.longitude
        );
        Ok(coordinates)
    }
}

/// Coordinates may arrive as numbers or numeric strings.
fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
