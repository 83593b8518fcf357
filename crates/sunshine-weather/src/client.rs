//! Forecast HTTP client (OpenWeatherMap One Call).

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::instrument;
use url::Url;

use crate::error::NetworkError;
use crate::types::{Coordinates, UnitSystem};

pub const FORECAST_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const USER_AGENT: &str = concat!("Sunshine/", env!("CARGO_PKG_VERSION"));

/// Only the daily section of the payload is cached.
const EXCLUDED_SECTIONS: &str = "current,minutely,hourly";
const RESPONSE_FORMAT: &str = "json";

#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: Arc<Client>,
    base_url: Url,
    api_key: Option<String>,
}

impl ForecastClient {
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

    /// Build the forecast request URL for a location.
    pub fn request_url(&self, coordinates: Coordinates, units: UnitSystem) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("exclude", EXCLUDED_SECTIONS)
                .append_pair("lat", &coordinates.latitude.to_string())
                .append_pair("lon", &coordinates.longitude.to_string())
                .append_pair("mode", RESPONSE_FORMAT)
                .append_pair("units", units.as_query_value());
            if let Some(key) = &self.api_key {
                query.append_pair("appid", key);
            }
        }
        url
    }

    /// Fetch the raw forecast payload. One attempt, no retry.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(
        &self,
        coordinates: Coordinates,
        units: UnitSystem,
    ) -> Result<Vec<u8>, NetworkError> {
        let url = self.request_url(coordinates, units);
        tracing::debug!(host = ?url.host_str(), "Requesting forecast");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(NetworkError::EmptyBody);
        }

        tracing::debug!("Received {} bytes of forecast data", body.len());
        Ok(body.to_vec())
    }
}
