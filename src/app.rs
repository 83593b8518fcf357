use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sunshine_core::{AppError, Config, Units};
use sunshine_weather::{
    normalize_date, Coordinates, DailyForecast, ForecastCache, ForecastClient, LocationResolver,
    LogNotifier, NotificationGate, Notifier, PreferenceSource, Preferences, ResolutionError,
    SyncOrchestrator, SyncOutcome, UnitSystem,
};

/// Preferences read from the config file at the start of every sync, so a
/// location saved by another process is picked up by a running daemon.
///
/// Keeps the last good value when the file is missing, unreadable or invalid.
pub struct ConfigPreferences {
    path: PathBuf,
    last: RwLock<Preferences>,
}

impl ConfigPreferences {
    pub fn new(path: PathBuf, initial: Preferences) -> Self {
        Self {
            path,
            last: RwLock::new(initial),
        }
    }

    fn remember(&self, preferences: Preferences) {
        *self.last.write() = preferences;
    }

    fn reload(path: &Path) -> Result<Preferences> {
        let config = Config::load_from(path)?;
        let validation = config.validate();
        if !validation.is_valid() {
            anyhow::bail!(validation.error_summary());
        }
        Ok(preferences_from(&config))
    }
}

impl PreferenceSource for ConfigPreferences {
    fn snapshot(&self) -> Preferences {
        if !self.path.exists() {
            return self.last.read().clone();
        }
        match Self::reload(&self.path) {
            Ok(preferences) => {
                self.remember(preferences.clone());
                preferences
            }
            Err(e) => {
                tracing::warn!("Keeping previous settings, config reload failed: {}", e);
                self.last.read().clone()
            }
        }
    }
}

/// Application state: config, shared preferences and the sync service graph
pub struct App {
    config: Config,
    config_path: PathBuf,
    preferences: Arc<ConfigPreferences>,
    resolver: LocationResolver,
    sync: Arc<SyncOrchestrator>,
    cancel: CancellationToken,
}

impl App {
    /// Create the application from the user's config file
    pub fn new() -> Result<Self> {
        let (config, _) = Config::load_validated()?;
        let config_path = Config::config_path()?;
        Self::from_config(config, config_path, Arc::new(LogNotifier))
    }

    pub fn from_config(
        config: Config,
        config_path: PathBuf,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.config_dir)?;
        let cache = Arc::new(ForecastCache::new(config.cache_path())?);

        let api_key = config.api.effective_api_key();
        let timeout = Duration::from_secs(config.weather.request_timeout_secs);
        let client = ForecastClient::new(&config.api.forecast_url, api_key.clone(), timeout)?;
        let resolver = LocationResolver::new(&config.api.geocoding_url, api_key, timeout)?;

        let preferences = Arc::new(ConfigPreferences::new(
            config_path.clone(),
            preferences_from(&config),
        ));
        let gate = NotificationGate::new(cache.clone(), notifier);
        let sync = Arc::new(SyncOrchestrator::new(
            client,
            cache,
            gate,
            preferences.clone(),
        ));

        Ok(Self {
            config,
            config_path,
            preferences,
            resolver,
            sync,
            cancel: CancellationToken::new(),
        })
    }

    /// Store the default location on first launch and sync right away if
    /// nothing from today onward is cached.
    pub fn startup(&mut self) -> Result<Option<JoinHandle<SyncOutcome>>> {
        if self.config.weather.apply_default_location() {
            tracing::info!("No location configured, using the default");
            self.config.save_to(&self.config_path)?;
        }

        let today = normalize_date(Utc::now());
        if self.sync.cache().find_from_date(today)?.is_empty() {
            tracing::info!("No forecast cached from today onward, syncing now");
            return Ok(Some(self.sync.trigger()));
        }

        Ok(None)
    }

    /// Resolve a place name and make it the active location.
    ///
    /// Blank input keeps the current location and starts no sync. On success
    /// the new coordinates are saved and an immediate sync is started.
    pub async fn change_location(
        &mut self,
        query: &str,
    ) -> Result<Option<JoinHandle<SyncOutcome>>, AppError> {
        let current = self.preferences.snapshot().coordinates;
        let resolved = self
            .resolver
            .resolve_or_keep(query, current)
            .await
            .map_err(|e| match e {
                ResolutionError::Network(_) => AppError::LocationUnavailable(e.to_string()),
                _ => AppError::Location(e.to_string()),
            })?;

        if query.trim().is_empty() {
            return Ok(None);
        }

        let mut updated = self.config.clone();
        updated.weather.set_location(
            resolved.latitude,
            resolved.longitude,
            Some(query.trim().to_string()),
        );
        updated
            .save_to(&self.config_path)
            .map_err(|e| AppError::Storage(format!("{:#}", e)))?;
        self.preferences.remember(preferences_from(&updated));
        self.config = updated;

        tracing::info!(
            "Location changed to {} ({}, {})",
            query.trim(),
            resolved.latitude,
            resolved.longitude
        );
        Ok(Some(self.sync.trigger()))
    }

    /// Run one sync now and wait for it
    pub async fn sync_now(&self) -> SyncOutcome {
        self.sync.run().await
    }

    /// Cached days from today onward
    pub fn upcoming(&self) -> Result<Vec<DailyForecast>, AppError> {
        let today = normalize_date(Utc::now());
        self.sync
            .cache()
            .find_from_date(today)
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    pub fn units(&self) -> UnitSystem {
        self.preferences.snapshot().units
    }

    /// Run the periodic sync until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let minutes = self.config.weather.refresh_minutes;
        let periodic = if minutes > 0 {
            let period = Duration::from_secs(u64::from(minutes) * 60);
            Some(tokio::spawn(
                self.sync.clone().run_periodic(period, self.cancel.clone()),
            ))
        } else {
            tracing::info!("Periodic sync disabled");
            None
        };

        tokio::signal::ctrl_c().await?;
        self.shutdown();

        if let Some(handle) = periodic {
            if let Err(e) = handle.await {
                tracing::error!("Periodic sync task failed: {}", e);
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        tracing::info!("Shutting down");
        self.cancel.cancel();
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn preferences_from(config: &Config) -> Preferences {
    let (latitude, longitude) = config.weather.coordinates();
    Preferences {
        coordinates: Coordinates::new(latitude, longitude),
        units: match config.weather.units {
            Units::Metric => UnitSystem::Metric,
            Units::Imperial => UnitSystem::Imperial,
        },
        notifications_enabled: config.weather.notifications_enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(server: &MockServer, dir: &tempfile::TempDir) -> App {
        let mut config = Config {
            config_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.api.forecast_url = format!("{}/data/3.0/onecall", server.uri());
        config.api.geocoding_url = format!("{}/geo/1.0/direct", server.uri());
        config.api.api_key = Some("test_key".into());
        config.weather.notifications_enabled = false;

        App::from_config(config, dir.path().join("config.toml"), Arc::new(LogNotifier)).unwrap()
    }

    async fn mount_empty_forecast(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/data/3.0/onecall"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(server)
            .await;
    }

    #[test]
    fn test_preferences_follow_config() {
        let mut config = Config::default();
        config.weather.units = Units::Imperial;
        config.weather.set_location(51.5, -0.12, None);

        let prefs = preferences_from(&config);
        assert_eq!(prefs.units, UnitSystem::Imperial);
        assert_eq!(prefs.coordinates, Coordinates::new(51.5, -0.12));
    }

    #[tokio::test]
    async fn test_startup_stores_default_location_and_syncs() {
        let server = MockServer::start().await;
        mount_empty_forecast(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&server, &dir);

        let handle = app.startup().unwrap();
        assert!(app.config().weather.has_location());
        assert!(dir.path().join("config.toml").exists());

        let outcome = handle.unwrap().await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_location_change_persists_and_syncs() {
        let server = MockServer::start().await;
        mount_empty_forecast(&server).await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "Paris"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "Paris", "lat": 48.8589, "lon": 2.32}])),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&server, &dir);

        let handle = app.change_location("Paris").await.unwrap();
        assert!(handle.unwrap().await.unwrap().is_success());

        let saved = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(saved.weather.coordinates(), (48.8589, 2.32));
        assert_eq!(saved.weather.location_name.as_deref(), Some("Paris"));
        assert_eq!(
            app.preferences.snapshot().coordinates,
            Coordinates::new(48.8589, 2.32)
        );
    }

    #[tokio::test]
    async fn test_unknown_location_keeps_settings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&server, &dir);
        let before = app.preferences.snapshot().coordinates;

        let err = app.change_location("Qwertyuiop").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid location");
        assert_eq!(app.preferences.snapshot().coordinates, before);
        assert!(!dir.path().join("config.toml").exists());
    }

    #[tokio::test]
    async fn test_blank_location_is_a_no_op() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&server, &dir);

        assert!(app.change_location("   ").await.unwrap().is_none());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_location_saved_elsewhere_reaches_running_app() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&server, &dir);

        // Another process (e.g. `sunshine location`) rewrites the config file
        let config_path = dir.path().join("config.toml");
        let mut other = Config::load_from(&config_path).unwrap();
        other.weather.set_location(48.8589, 2.32, Some("Paris".into()));
        other.save_to(&config_path).unwrap();

        Mock::given(method("GET"))
            .and(path("/data/3.0/onecall"))
            .and(query_param("lat", "48.8589"))
            .and(query_param("lon", "2.32"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        assert!(app.sync_now().await.is_success());
    }

    #[test]
    fn test_unreadable_config_keeps_previous_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.weather.set_location(51.5, -0.12, None);
        let source = ConfigPreferences::new(config_path.clone(), preferences_from(&config));

        assert_eq!(source.snapshot().coordinates, Coordinates::new(51.5, -0.12));

        std::fs::write(&config_path, "weather = [").unwrap();
        assert_eq!(source.snapshot().coordinates, Coordinates::new(51.5, -0.12));

        config.weather.set_location(95.0, 0.0, None);
        config.save_to(&config_path).unwrap();
        assert_eq!(source.snapshot().coordinates, Coordinates::new(51.5, -0.12));
    }

    #[test]
    fn test_reloaded_units_and_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut config = Config::default();
        let source = ConfigPreferences::new(config_path.clone(), preferences_from(&config));

        config.weather.units = Units::Imperial;
        config.weather.notifications_enabled = false;
        config.save_to(&config_path).unwrap();

        let prefs = source.snapshot();
        assert_eq!(prefs.units, UnitSystem::Imperial);
        assert!(!prefs.notifications_enabled);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_location_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "Paris", "lat": 48.8589, "lon": 2.32}])),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(&server, &dir);
        let before = app.preferences.snapshot().coordinates;

        // A directory where the config file should be makes the write fail
        std::fs::create_dir(dir.path().join("config.toml")).unwrap();

        let err = app.change_location("Paris").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(!app.config().weather.has_location());
        assert_eq!(app.preferences.snapshot().coordinates, before);
    }
}
