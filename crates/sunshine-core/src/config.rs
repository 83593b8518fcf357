use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides `api.api_key`
pub const API_KEY_ENV: &str = "SUNSHINE_API_KEY";

/// New York, used until the user picks a location
pub const DEFAULT_LATITUDE: f64 = 40.7128;
pub const DEFAULT_LONGITUDE: f64 = -74.0060;

const APP_DIR: &str = "sunshine";
const CONFIG_FILE: &str = "config.toml";
const CACHE_FILE: &str = "weather.db";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the config file and the forecast cache
    pub config_dir: PathBuf,

    /// Location, units and sync settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Provider endpoints and credentials
    #[serde(default)]
    pub api: ApiConfig,
}

/// Unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Unset until a location is stored
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Place name the coordinates were resolved from
    pub location_name: Option<String>,

    pub units: Units,

    /// Show a "new weather" notification at most once a day
    pub notifications_enabled: bool,

    /// Periodic sync interval in minutes (0 disables the periodic trigger)
    pub refresh_minutes: u32,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            location_name: None,
            units: Units::Metric,
            notifications_enabled: true,
            refresh_minutes: 24 * 60,
            request_timeout_secs: 10,
        }
    }
}

impl WeatherConfig {
    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Stored coordinates, or the default location if none are stored.
    pub fn coordinates(&self) -> (f64, f64) {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => (DEFAULT_LATITUDE, DEFAULT_LONGITUDE),
        }
    }

    pub fn set_location(&mut self, latitude: f64, longitude: f64, name: Option<String>) {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.location_name = name;
    }

    /// Store the default location if none is set. Returns true if it changed.
    pub fn apply_default_location(&mut self) -> bool {
        if self.has_location() {
            return false;
        }
        self.set_location(DEFAULT_LATITUDE, DEFAULT_LONGITUDE, None);
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// One Call forecast endpoint
    pub forecast_url: String,

    /// Direct geocoding endpoint
    pub geocoding_url: String,

    /// OpenWeatherMap API key (can also be set via SUNSHINE_API_KEY)
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            forecast_url: "https://api.openweathermap.org/data/3.0/onecall".to_string(),
            geocoding_url: "https://api.openweathermap.org/geo/1.0/direct".to_string(),
            api_key: None,
        }
    }
}

impl ApiConfig {
    /// API key from the environment, falling back to the config file
    pub fn effective_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            tracing::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(lat) = self.weather.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                result.add_error("weather.latitude", "Latitude must be between -90 and 90");
            }
        }
        if let Some(lon) = self.weather.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                result.add_error("weather.longitude", "Longitude must be between -180 and 180");
            }
        }
        if self.weather.latitude.is_some() != self.weather.longitude.is_some() {
            result.add_error(
                "weather.latitude",
                "Latitude and longitude must be set together",
            );
        }

        if self.weather.refresh_minutes == 0 {
            result.add_warning(
                "weather.refresh_minutes",
                "Periodic sync disabled (0 minutes)",
            );
        } else if self.weather.refresh_minutes > 7 * 24 * 60 {
            result.add_warning(
                "weather.refresh_minutes",
                "Sync interval is more than a week",
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        Self::validate_url(&self.api.forecast_url, "api.forecast_url", &mut result);
        Self::validate_url(&self.api.geocoding_url, "api.geocoding_url", &mut result);

        if self.api.effective_api_key().is_none() {
            result.add_warning(
                "api.api_key",
                format!("No API key configured (set it in the config file or {})", API_KEY_ENV),
            );
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the forecast cache database
    pub fn cache_path(&self) -> PathBuf {
        self.config_dir.join(CACHE_FILE)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join(CONFIG_FILE))
    }
}
