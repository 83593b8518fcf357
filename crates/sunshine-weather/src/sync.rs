//! Sync orchestrator: fetch -> parse -> replace -> notify check.
//!
//! Single-flight per orchestrator: a trigger that arrives while a sync is
//! running is dropped, not queued. Failures never escape; every run ends in a
//! [`SyncOutcome`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ForecastCache;
use crate::client::ForecastClient;
use crate::error::{CacheError, NetworkError, ParseError};
use crate::notify::{NotificationGate, NotifyDecision};
use crate::parser;
use crate::types::PreferenceSource;

/// Where a sync currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Parsing,
    Replacing,
    NotifyCheck,
}

impl SyncPhase {
    /// True if a new sync can be started.
    pub fn can_start(self) -> bool {
        matches!(self, SyncPhase::Idle)
    }
}

/// Why a sync attempt ended without touching the cache.
#[derive(Debug, thiserror::Error)]
pub enum SyncFailure {
    #[error("fetch failed: {0}")]
    Network(#[from] NetworkError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("cache replace failed: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// The cache now holds `records` rows from this sync.
    /// `notification` is `None` if the gate could not be evaluated.
    Completed {
        records: usize,
        notification: Option<NotifyDecision>,
    },
    Failed(SyncFailure),
    /// Another sync was already in flight
    Skipped,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed {
                records,
                notification: Some(NotifyDecision::Fired(_)),
            } => write!(f, "synced {} days, user notified", records),
            Self::Completed { records, .. } => write!(f, "synced {} days", records),
            Self::Failed(reason) => write!(f, "sync failed: {}", reason),
            Self::Skipped => write!(f, "sync already in progress"),
        }
    }
}

pub struct SyncOrchestrator {
    client: ForecastClient,
    cache: Arc<ForecastCache>,
    gate: NotificationGate,
    preferences: Arc<dyn PreferenceSource>,
    phase: Mutex<SyncPhase>,
}

/// Holds the single-flight slot; returns the orchestrator to `Idle` on drop,
/// including when the running task is cancelled.
struct InFlight<'a> {
    phase: &'a Mutex<SyncPhase>,
}

impl InFlight<'_> {
    fn advance(&self, next: SyncPhase) {
        *self.phase.lock() = next;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = SyncPhase::Idle;
    }
}

impl SyncOrchestrator {
    pub fn new(
        client: ForecastClient,
        cache: Arc<ForecastCache>,
        gate: NotificationGate,
        preferences: Arc<dyn PreferenceSource>,
    ) -> Self {
        Self {
            client,
            cache,
            gate,
            preferences,
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    pub fn cache(&self) -> &Arc<ForecastCache> {
        &self.cache
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        let mut phase = self.phase.lock();
        if !phase.can_start() {
            return None;
        }
        *phase = SyncPhase::Fetching;
        Some(InFlight { phase: &self.phase })
    }

    /// Run one sync now.
    pub async fn run(&self) -> SyncOutcome {
        self.execute(None).await
    }

    /// Run one sync, evaluating the notification gate at `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> SyncOutcome {
        self.execute(Some(now)).await
    }

    /// Start a sync on the runtime's background workers.
    ///
    /// The outcome is delivered through the returned handle; a trigger that
    /// lands while a sync is in flight resolves to [`SyncOutcome::Skipped`].
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<SyncOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Trigger a sync every `period` until `cancel` fires. The first periodic
    /// sync happens one period after the call.
    pub async fn run_periodic(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Periodic sync armed every {:?}", period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Periodic sync stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.run().await;
                    tracing::info!("Periodic sync: {}", outcome);
                }
            }
        }
    }

    async fn execute(&self, now: Option<DateTime<Utc>>) -> SyncOutcome {
        let Some(flight) = self.try_begin() else {
            tracing::debug!("Sync already in flight, dropping trigger");
            return SyncOutcome::Skipped;
        };

        let preferences = self.preferences.snapshot();

        let raw = match self
            .client
            .fetch(preferences.coordinates, preferences.units)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Forecast fetch failed, keeping cached data: {}", e);
                return SyncOutcome::Failed(e.into());
            }
        };

        flight.advance(SyncPhase::Parsing);
        let records = match parser::parse_with_units(&raw, preferences.units) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Forecast parse failed, keeping cached data: {}", e);
                return SyncOutcome::Failed(e.into());
            }
        };

        flight.advance(SyncPhase::Replacing);
        if let Err(e) = self.cache.replace_all(&records) {
            tracing::error!("Forecast cache replace failed: {}", e);
            return SyncOutcome::Failed(e.into());
        }

        flight.advance(SyncPhase::NotifyCheck);
        let now = now.unwrap_or_else(Utc::now);
        let notification = match self.gate.evaluate(now, &preferences) {
            Ok(decision) => {
                tracing::debug!("Notification decision: {:?}", decision);
                Some(decision)
            }
            Err(e) => {
                tracing::warn!("Notification check failed: {}", e);
                None
            }
        };

        tracing::info!("Forecast sync completed with {} days", records.len());
        SyncOutcome::Completed {
            records: records.len(),
            notification,
        }
    }
}
