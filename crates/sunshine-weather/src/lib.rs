//! Forecast sync for Sunshine
//!
//! Fetches the daily forecast for the configured location, keeps a one-sync
//! SQLite cache of it, and notifies the user at most once a day.

pub mod cache;
pub mod client;
pub mod error;
pub mod geocode;
pub mod notify;
pub mod parser;
pub mod sync;
pub mod types;

pub use cache::ForecastCache;
pub use client::ForecastClient;
pub use error::{CacheError, NetworkError, NotifyError, ParseError, ResolutionError};
pub use geocode::LocationResolver;
pub use notify::{LogNotifier, Notification, NotificationGate, Notifier, NotifyDecision};
pub use sync::{SyncFailure, SyncOrchestrator, SyncOutcome, SyncPhase};
pub use types::*;
