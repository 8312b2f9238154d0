//! Configuration for thermodb
//!
//! Centralized, immutable configuration with sensible defaults. The same
//! value is threaded into the storage engine and the aggregator.

use std::path::PathBuf;

use jiff::tz::TimeZone;
use jiff::SignedDuration;

use crate::error::{Result, ThermoError};
use crate::storage::Layout;

/// Time zone used for day buckets and reports when none is configured
pub const DEFAULT_TIME_ZONE: &str = "America/New_York";

/// Look up a time zone, falling back to UTC with a warning
///
/// Day buckets follow the zone, so the fallback is logged rather than
/// silent. Use `TimeZone::get` directly to treat a missing zone as an error.
pub fn time_zone_or_utc(name: &str) -> TimeZone {
    match TimeZone::get(name) {
        Ok(tz) => tz,
        Err(e) => {
            tracing::warn!(zone = name, error = %e, "Time zone unavailable, using UTC for day buckets");
            TimeZone::UTC
        }
    }
}

/// Main configuration for a thermodb instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the pre-allocated database file
    pub db_path: PathBuf,

    /// Path of the aggregate cache (defaults to `{db_path}.cache`)
    pub cache_path: Option<PathBuf>,

    /// Slot layout of every section
    pub layout: Layout,

    /// How often written slots are synced to disk
    pub sync_strategy: SyncStrategy,

    /// Append missing sensors at open instead of failing
    pub allow_growth: bool,

    // -------------------------------------------------------------------------
    // Aggregate Configuration
    // -------------------------------------------------------------------------
    /// Time zone used to bucket readings into calendar days
    pub display_time_zone: TimeZone,

    /// How long samples stay in the rolling window
    pub window_retention: SignedDuration,

    // -------------------------------------------------------------------------
    // Ingestion Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the ingestion queue (None = unbounded)
    pub queue_capacity: Option<usize>,
}

/// Sync strategy for slot writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced writes
    EveryNWrites { count: usize },

    /// Only sync when the database is closed
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./temps.db"),
            cache_path: None,
            layout: Layout::default(),
            sync_strategy: SyncStrategy::OnClose,
            allow_growth: false,
            display_time_zone: time_zone_or_utc(DEFAULT_TIME_ZONE),
            window_retention: SignedDuration::from_hours(48),
            queue_capacity: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolved path of the aggregate cache file
    pub fn cache_path(&self) -> PathBuf {
        match &self.cache_path {
            Some(path) => path.clone(),
            None => {
                let mut name = self.db_path.as_os_str().to_owned();
                name.push(".cache");
                PathBuf::from(name)
            }
        }
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.layout.slot_count() == 0 {
            return Err(ThermoError::Config("layout must have at least one slot".to_string()));
        }
        if !self.window_retention.is_positive() {
            return Err(ThermoError::Config(format!(
                "window retention must be positive, got {}",
                self.window_retention
            )));
        }
        if self.queue_capacity == Some(0) {
            return Err(ThermoError::Config("queue capacity must be non-zero".to_string()));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(ThermoError::Config("sync interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set an explicit cache file path
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = Some(path.into());
        self
    }

    /// Set the section layout
    pub fn layout(mut self, layout: Layout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Allow appending sensors missing from an existing file
    pub fn allow_growth(mut self, allow: bool) -> Self {
        self.config.allow_growth = allow;
        self
    }

    /// Set the display time zone
    pub fn display_time_zone(mut self, tz: TimeZone) -> Self {
        self.config.display_time_zone = tz;
        self
    }

    /// Set the rolling window retention
    pub fn window_retention(mut self, retention: SignedDuration) -> Self {
        self.config.window_retention = retention;
        self
    }

    /// Bound the ingestion queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
