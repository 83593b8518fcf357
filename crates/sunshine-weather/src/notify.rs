//! Once-a-day "new weather" notification decision.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::cache::ForecastCache;
use crate::error::{CacheError, NotifyError};
use crate::types::{format_temperature, normalize_date, DailyForecast, Preferences, UnitSystem};

/// Minimum time between two notifications.
pub const NOTIFICATION_INTERVAL_HOURS: i64 = 24;
pub const DEFAULT_TITLE: &str = "Sunshine";

/// What gets handed to the external notification surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Normalized day the notification refers to; the detail-view payload
    pub date: DateTime<Utc>,
}

impl Notification {
    /// Build the summary for a day, e.g. "Forecast: Rain - High: 14°C Low: 7°C".
    pub fn for_forecast(title: &str, forecast: &DailyForecast, units: UnitSystem) -> Self {
        let body = format!(
            "Forecast: {} - High: {} Low: {}",
            forecast.condition().description(),
            format_temperature(forecast.max_temp, units),
            format_temperature(forecast.min_temp, units),
        );
        Self {
            title: title.to_string(),
            body,
            date: forecast.date,
        }
    }

    /// Deep-link payload identifying the day (millis of midnight UTC).
    pub fn deep_link(&self) -> String {
        format!("sunshine://forecast/{}", self.date.timestamp_millis())
    }
}

/// External notification surface.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            title = %notification.title,
            link = %notification.deep_link(),
            "{}",
            notification.body
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyDecision {
    /// The user turned notifications off
    Disabled,
    /// Too soon after the previous notification
    Throttled { next_eligible: DateTime<Utc> },
    /// No cached forecast for today; nothing is sent
    NoDataForToday,
    Fired(Notification),
    /// The notifier failed; the timestamp was left untouched
    DispatchFailed(String),
}

impl NotifyDecision {
    pub fn fired(&self) -> bool {
        matches!(self, Self::Fired(_))
    }
}

pub struct NotificationGate {
    cache: Arc<ForecastCache>,
    notifier: Arc<dyn Notifier>,
    title: String,
}

impl NotificationGate {
    pub fn new(cache: Arc<ForecastCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            cache,
            notifier,
            title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Decide whether to notify at `now`, and do it if so.
    ///
    /// The last-notification timestamp is written in the same transaction as
    /// the dispatch and only kept when the notifier accepted the notification.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        preferences: &Preferences,
    ) -> Result<NotifyDecision, CacheError> {
        if !preferences.notifications_enabled {
            return Ok(NotifyDecision::Disabled);
        }

        if let Some(last) = self.cache.last_notification_at()? {
            let next_eligible = last + Duration::hours(NOTIFICATION_INTERVAL_HOURS);
            if now < next_eligible {
                return Ok(NotifyDecision::Throttled { next_eligible });
            }
        }

        let Some(today) = self.cache.find_by_date(normalize_date(now))? else {
            tracing::debug!("No forecast cached for today, not notifying");
            return Ok(NotifyDecision::NoDataForToday);
        };

        let notification = Notification::for_forecast(&self.title, &today, preferences.units);
        let dispatched = self
            .cache
            .record_notification(now, || self.notifier.notify(&notification))?;
        if let Err(e) = dispatched {
            tracing::warn!("Notification not delivered: {}", e);
            return Ok(NotifyDecision::DispatchFailed(e.to_string()));
        }

        Ok(NotifyDecision::Fired(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinates;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError("surface unavailable".into()));
            }
            self.sent.lock().push(notification.clone());
            Ok(())
        }
    }

    fn prefs(enabled: bool) -> Preferences {
        Preferences {
            coordinates: Coordinates::new(40.7128, -74.006),
            units: UnitSystem::Metric,
            notifications_enabled: enabled,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 24, 9, 0, 0).unwrap()
    }

    fn today_forecast() -> DailyForecast {
        DailyForecast {
            date: normalize_date(now()),
            condition_code: 500,
            min_temp: 7.0,
            max_temp: 14.0,
            humidity: 80,
            pressure: 1009.0,
            wind_speed: 3.2,
            wind_direction_degrees: 180.0,
        }
    }

    fn setup(fail: bool) -> (Arc<ForecastCache>, Arc<RecordingNotifier>, NotificationGate) {
        let cache = Arc::new(ForecastCache::in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier {
            fail,
            ..Default::default()
        });
        let gate = NotificationGate::new(cache.clone(), notifier.clone());
        (cache, notifier, gate)
    }

    #[test]
    fn test_fires_when_never_notified() {
        let (cache, notifier, gate) = setup(false);
        cache.replace_all(&[today_forecast()]).unwrap();

        let decision = gate.evaluate(now(), &prefs(true)).unwrap();
        assert!(decision.fired());
        assert_eq!(notifier.sent.lock().len(), 1);
        assert_eq!(cache.last_notification_at().unwrap(), Some(now()));
    }

    #[test]
    fn test_notification_text() {
        let notification = Notification::for_forecast("Sunshine", &today_forecast(), UnitSystem::Metric);
        assert_eq!(notification.body, "Forecast: Rain - High: 14°C Low: 7°C");
        assert_eq!(notification.date, normalize_date(now()));
        assert!(notification.deep_link().ends_with(&normalize_date(now()).timestamp_millis().to_string()));

        let imperial = Notification::for_forecast("Sunshine", &today_forecast(), UnitSystem::Imperial);
        assert_eq!(imperial.body, "Forecast: Rain - High: 57°F Low: 45°F");
    }

    #[test]
    fn test_disabled() {
        let (cache, notifier, gate) = setup(false);
        cache.replace_all(&[today_forecast()]).unwrap();

        assert_eq!(gate.evaluate(now(), &prefs(false)).unwrap(), NotifyDecision::Disabled);
        assert!(notifier.sent.lock().is_empty());
        assert!(cache.last_notification_at().unwrap().is_none());
    }

    #[test]
    fn test_throttled_within_a_day() {
        let (cache, notifier, gate) = setup(false);
        cache.replace_all(&[today_forecast()]).unwrap();
        let last = now() - Duration::hours(23);
        cache.set_last_notification(last).unwrap();

        let decision = gate.evaluate(now(), &prefs(true)).unwrap();
        assert_eq!(
            decision,
            NotifyDecision::Throttled {
                next_eligible: last + Duration::hours(24)
            }
        );
        assert!(notifier.sent.lock().is_empty());
    }

    #[test]
    fn test_fires_exactly_at_interval() {
        let (cache, _notifier, gate) = setup(false);
        cache.replace_all(&[today_forecast()]).unwrap();
        cache.set_last_notification(now() - Duration::hours(24)).unwrap();

        assert!(gate.evaluate(now(), &prefs(true)).unwrap().fired());
    }

    #[test]
    fn test_fail_closed_without_todays_entry() {
        let (cache, notifier, gate) = setup(false);
        let mut tomorrow = today_forecast();
        tomorrow.date = tomorrow.date + Duration::days(1);
        cache.replace_all(&[tomorrow]).unwrap();

        assert_eq!(gate.evaluate(now(), &prefs(true)).unwrap(), NotifyDecision::NoDataForToday);
        assert!(notifier.sent.lock().is_empty());
        assert!(cache.last_notification_at().unwrap().is_none());
    }

    #[test]
    fn test_dispatch_failure_keeps_timestamp() {
        let (cache, _notifier, gate) = setup(true);
        cache.replace_all(&[today_forecast()]).unwrap();

        let decision = gate.evaluate(now(), &prefs(true)).unwrap();
        assert!(matches!(decision, NotifyDecision::DispatchFailed(_)));
        assert!(cache.last_notification_at().unwrap().is_none());
    }

    #[test]
    fn test_dispatch_failure_keeps_previous_timestamp() {
        let (cache, _notifier, gate) = setup(true);
        cache.replace_all(&[today_forecast()]).unwrap();
        let last = now() - Duration::hours(30);
        cache.set_last_notification(last).unwrap();

        let decision = gate.evaluate(now(), &prefs(true)).unwrap();
        assert!(matches!(decision, NotifyDecision::DispatchFailed(_)));
        assert_eq!(cache.last_notification_at().unwrap(), Some(last));
    }
}
