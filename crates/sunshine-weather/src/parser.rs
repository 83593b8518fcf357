//! Forecast payload decoding.
//!
//! Accepts a One Call response (`{"daily": [..]}`) or a bare array of daily
//! entries. Any error flag or invalid entry rejects the whole payload. Days
//! are keyed by the UTC calendar day of `dt`; the provider's
//! `timezone_offset` is ignored.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::{
    fahrenheit_to_celsius, mph_to_mps, normalize_unix_timestamp, DailyForecast, UnitSystem,
};

#[derive(Debug, Deserialize)]
struct RawDay {
    dt: i64,
    temp: RawTemperature,
    humidity: i64,
    pressure: f64,
    wind_speed: f64,
    wind_deg: f64,
    weather: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
struct RawTemperature {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    id: i32,
}

/// Parse a metric payload.
pub fn parse(raw: &[u8]) -> Result<Vec<DailyForecast>, ParseError> {
    parse_with_units(raw, UnitSystem::Metric)
}

/// Parse a payload fetched with the given unit system, converting values to
/// Celsius and m/s.
pub fn parse_with_units(raw: &[u8], units: UnitSystem) -> Result<Vec<DailyForecast>, ParseError> {
    let payload: Value =
        serde_json::from_slice(raw).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut object) => {
            if let Some(code) = object.get("cod") {
                check_status_code(code, object.get("message"))?;
            }
            match object.remove("daily") {
                Some(Value::Array(entries)) => entries,
                Some(_) => return Err(ParseError::Malformed("\"daily\" is not a list".into())),
                None => return Err(ParseError::Malformed("missing \"daily\" section".into())),
            }
        }
        other => {
            return Err(ParseError::Malformed(format!(
                "unexpected top-level value: {}",
                json_kind(&other)
            )))
        }
    };

    let mut seen = HashSet::with_capacity(entries.len());
    let mut forecasts = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let day: RawDay = serde_json::from_value(entry).map_err(|e| ParseError::InvalidEntry {
            index,
            reason: e.to_string(),
        })?;
        let forecast = to_forecast(index, day, units)?;

        if !seen.insert(forecast.date) {
            return Err(ParseError::DuplicateDate(forecast.date.date_naive().to_string()));
        }
        forecasts.push(forecast);
    }

    tracing::debug!("Parsed {} daily forecasts", forecasts.len());
    Ok(forecasts)
}

fn check_status_code(code: &Value, message: Option<&Value>) -> Result<(), ParseError> {
    let code = match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if code == "200" {
        return Ok(());
    }
    let message = message
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(ParseError::Upstream { code, message })
}

fn to_forecast(
    index: usize,
    day: RawDay,
    units: UnitSystem,
) -> Result<DailyForecast, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidEntry {
        index,
        reason: reason.to_string(),
    };

    let date = normalize_unix_timestamp(day.dt)
        .ok_or_else(|| invalid("timestamp out of range"))?;
    let condition_code = day
        .weather
        .first()
        .map(|c| c.id)
        .ok_or_else(|| invalid("missing weather condition"))?;
    let humidity = u8::try_from(day.humidity)
        .ok()
        .filter(|h| *h <= 100)
        .ok_or_else(|| invalid("humidity outside 0-100"))?;

    let numbers = [
        day.temp.min,
        day.temp.max,
        day.pressure,
        day.wind_speed,
        day.wind_deg,
    ];
    if numbers.iter().any(|n| !n.is_finite()) {
        return Err(invalid("non-finite measurement"));
    }
    if !(0.0..=360.0).contains(&day.wind_deg) {
        return Err(invalid("wind direction outside 0-360"));
    }

    let (min_temp, max_temp, wind_speed) = match units {
        UnitSystem::Metric => (day.temp.min, day.temp.max, day.wind_speed),
        UnitSystem::Imperial => (
            fahrenheit_to_celsius(day.temp.min),
            fahrenheit_to_celsius(day.temp.max),
            mph_to_mps(day.wind_speed),
        ),
    };

    Ok(DailyForecast {
        date,
        condition_code,
        min_temp,
        max_temp,
        humidity,
        pressure: day.pressure,
        wind_speed,
        wind_direction_degrees: day.wind_deg,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn day_json(dt: i64, code: i32, min: f64, max: f64) -> Value {
        json!({
            "dt": dt,
            "temp": {"day": (min + max) / 2.0, "min": min, "max": max},
            "humidity": 59,
            "pressure": 1016,
            "wind_speed": 3.98,
            "wind_deg": 76,
            "weather": [{"id": code, "main": "Rain", "description": "light rain", "icon": "10d"}]
        })
    }

    fn week_payload(offset: i64) -> Vec<u8> {
        let start = Utc.with_ymd_and_hms(2024, 5, 24, 16, 0, 0).unwrap().timestamp();
        let daily: Vec<Value> = (0..7)
            .map(|i| day_json(start + i * 86_400, 500 + i as i32, 10.0 + i as f64, 20.0))
            .collect();
        serde_json::to_vec(&json!({
            "lat": 40.7128,
            "lon": -74.006,
            "timezone": "America/New_York",
            "timezone_offset": offset,
            "daily": daily
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_week() {
        let forecasts = parse(&week_payload(-14_400)).unwrap();
        assert_eq!(forecasts.len(), 7);

        let d0 = Utc.with_ymd_and_hms(2024, 5, 24, 0, 0, 0).unwrap();
        for (i, f) in forecasts.iter().enumerate() {
            assert_eq!(f.date, d0 + Duration::days(i as i64));
        }
        assert_eq!(forecasts[0].condition_code, 500);
        assert_eq!(forecasts[0].humidity, 59);
        assert!((forecasts[0].pressure - 1016.0).abs() < 1e-9);
        assert!((forecasts[0].wind_direction_degrees - 76.0).abs() < 1e-9);
        assert!((forecasts[3].min_temp - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_dates_ignore_provider_offset() {
        // 23:00 UTC is already the next local day at UTC+13
        let dt = Utc.with_ymd_and_hms(2024, 5, 23, 23, 0, 0).unwrap().timestamp();
        let raw = serde_json::to_vec(&json!({
            "timezone": "Pacific/Tongatapu",
            "timezone_offset": 13 * 3600,
            "daily": [day_json(dt, 800, 20.0, 26.0)]
        }))
        .unwrap();

        let forecasts = parse(&raw).unwrap();
        assert_eq!(
            forecasts[0].date,
            Utc.with_ymd_and_hms(2024, 5, 23, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse(b"[]").unwrap().is_empty());
        assert!(parse(br#"{"daily": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_bare_array_of_entries() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap().timestamp();
        let raw = serde_json::to_vec(&json!([day_json(dt, 800, -3.0, 4.0)])).unwrap();
        let forecasts = parse(&raw).unwrap();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].date, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_upstream_error_numeric_code() {
        let raw = br#"{"cod": 401, "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."}"#;
        let err = parse(raw).unwrap_err();
        assert!(matches!(
            &err,
            ParseError::Upstream { code, message }
                if code == "401" && message.starts_with("Invalid API key")
        ));
    }

    #[test]
    fn test_upstream_error_string_code() {
        let raw = br#"{"cod": "400", "message": "wrong latitude"}"#;
        assert!(matches!(parse(raw), Err(ParseError::Upstream { code, .. }) if code == "400"));
    }

    #[test]
    fn test_success_code_is_not_an_error() {
        let raw = br#"{"cod": "200", "daily": []}"#;
        assert!(parse(raw).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse(b"{not json"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(b"42"), Err(ParseError::Malformed(_))));
        assert!(matches!(parse(br#"{"lat": 1.0}"#), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_invalid_entry_rejects_whole_payload() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap().timestamp();
        let mut broken = day_json(dt + 86_400, 800, 1.0, 2.0);
        broken["weather"] = json!([]);
        let raw = serde_json::to_vec(&json!([day_json(dt, 800, 1.0, 2.0), broken])).unwrap();

        assert!(matches!(
            parse(&raw),
            Err(ParseError::InvalidEntry { index: 1, .. })
        ));
    }

    #[test]
    fn test_humidity_out_of_range() {
        let mut day = day_json(0, 800, 1.0, 2.0);
        day["humidity"] = json!(140);
        let raw = serde_json::to_vec(&json!([day])).unwrap();
        assert!(matches!(parse(&raw), Err(ParseError::InvalidEntry { .. })));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let morning = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap().timestamp();
        let evening = Utc.with_ymd_and_hms(2024, 1, 2, 18, 0, 0).unwrap().timestamp();
        let raw = serde_json::to_vec(&json!([
            day_json(morning, 800, 1.0, 2.0),
            day_json(evening, 801, 1.0, 2.0)
        ]))
        .unwrap();
        assert!(matches!(parse(&raw), Err(ParseError::DuplicateDate(_))));
    }

    #[test]
    fn test_imperial_values_are_converted() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap().timestamp();
        let mut day = day_json(dt, 800, 32.0, 212.0);
        day["wind_speed"] = json!(10.0);
        let raw = serde_json::to_vec(&json!({"daily": [day]})).unwrap();

        let forecasts = parse_with_units(&raw, UnitSystem::Imperial).unwrap();
        assert!(forecasts[0].min_temp.abs() < 1e-9);
        assert!((forecasts[0].max_temp - 100.0).abs() < 1e-9);
        assert!((forecasts[0].wind_speed - 4.4704).abs() < 1e-9);
    }
}
