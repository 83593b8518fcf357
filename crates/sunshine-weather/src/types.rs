use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Unit system requested from the forecast provider and used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    /// Value of the provider's `units` query parameter.
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

/// Weather condition categories mapped from OpenWeatherMap condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Unknown,
    Thunderstorm,
    Drizzle,
    Rain,
    FreezingRain,
    Snow,
    Fog,
    Storm,
    Clear,
    LightClouds,
    Clouds,
}

impl WeatherCondition {
    /// Convert an OpenWeatherMap condition id to a WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_owm_code(code: i32) -> Self {
        match code {
            200..=232 => Self::Thunderstorm,
            300..=321 => Self::Drizzle,
            500..=504 | 520..=531 => Self::Rain,
            511 => Self::FreezingRain,
            600..=622 => Self::Snow,
            701..=761 => Self::Fog,
            762..=781 => Self::Storm, // ash, squalls, tornado
            800 => Self::Clear,
            801 => Self::LightClouds,
            802..=804 => Self::Clouds,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Thunderstorm => "Thunderstorm",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::FreezingRain => "Freezing Rain",
            Self::Snow => "Snow",
            Self::Fog => "Fog",
            Self::Storm => "Storm",
            Self::Clear => "Clear",
            Self::LightClouds => "Light Clouds",
            Self::Clouds => "Cloudy",
        }
    }
}

/// Geographic coordinates of the forecast location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One cached forecast row per calendar day.
///
/// Temperatures are always Celsius and wind speed m/s, whatever unit system
/// was used for the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    /// Midnight UTC of the forecast day
    pub date: DateTime<Utc>,
    pub condition_code: i32,
    pub min_temp: f64,
    pub max_temp: f64,
    pub humidity: u8,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_direction_degrees: f64,
}

impl DailyForecast {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_owm_code(self.condition_code)
    }
}

/// Settings snapshot read by a sync. Owned by the external settings store.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub coordinates: Coordinates,
    pub units: UnitSystem,
    pub notifications_enabled: bool,
}

/// Read-only access to the user's settings.
pub trait PreferenceSource: Send + Sync {
    fn snapshot(&self) -> Preferences;
}

impl PreferenceSource for parking_lot::RwLock<Preferences> {
    fn snapshot(&self) -> Preferences {
        self.read().clone()
    }
}

impl PreferenceSource for Preferences {
    fn snapshot(&self) -> Preferences {
        self.clone()
    }
}

/// Reduce an instant to midnight UTC of the same UTC calendar day.
pub fn normalize_date(instant: DateTime<Utc>) -> DateTime<Utc> {
    midnight_utc(instant.date_naive())
}

/// Midnight UTC of the given calendar day.
pub fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(day.year(), day.month(), day.day(), 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Normalize a provider timestamp (unix seconds) to its UTC calendar day.
/// `None` if the timestamp is out of range.
pub fn normalize_unix_timestamp(unix_secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(unix_secs, 0).map(normalize_date)
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph * 0.44704
}

/// Format a Celsius value for display in the preferred unit system (e.g. "14°C").
pub fn format_temperature(celsius: f64, units: UnitSystem) -> String {
    match units {
        UnitSystem::Metric => format!("{:.0}°C", celsius),
        UnitSystem::Imperial => format!("{:.0}°F", celsius_to_fahrenheit(celsius)),
    }
}
