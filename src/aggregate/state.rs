//! Aggregator implementation
//!
//! Per-sensor derived state behind a single RwLock.

use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Result, ThermoError};
use crate::event::Event;
use crate::record::Record;
use crate::storage::{Database, SensorDescriptor};

use super::clock::Clock;
use super::window::{RollingWindow, Sample};
use super::{DayRange, SensorSnapshot, Snapshot};

/// Derived state of one sensor
#[derive(Debug, Clone)]
pub(crate) struct SensorState {
    pub(crate) descriptor: SensorDescriptor,
    pub(crate) temperature: Option<f64>,
    pub(crate) humidity: Option<f64>,
    pub(crate) last_update: Option<Timestamp>,
    pub(crate) window: RollingWindow,
    pub(crate) days: BTreeMap<Date, DayRange>,
}

impl SensorState {
    pub(crate) fn new(descriptor: SensorDescriptor) -> Self {
        Self {
            descriptor,
            temperature: None,
            humidity: None,
            last_update: None,
            window: RollingWindow::new(),
            days: BTreeMap::new(),
        }
    }

    /// Fold one valid reading into the state
    fn apply(&mut self, timestamp: Timestamp, record: &Record, time_zone: &TimeZone, cutoff: Timestamp) {
        let temperature = record.temperature_celsius();

        self.temperature = Some(temperature);
        self.humidity = Some(record.humidity_percent());
        self.last_update = Some(timestamp);

        self.window.insert(
            Sample {
                timestamp,
                temperature,
            },
            cutoff,
        );

        let date = time_zone.to_datetime(timestamp).date();
        self.days
            .entry(date)
            .and_modify(|range| range.extend(temperature))
            .or_insert_with(|| DayRange::seed(temperature));
    }
}

/// Counters from a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records folded into the state
    pub applied: u64,

    /// Records skipped as invalid
    pub skipped: u64,
}

/// Maintains the derived view of all sensors
///
/// ## Concurrency
/// - Updates take the write lock for the whole event
/// - Snapshots take the read lock and copy out
/// - Readers therefore never see a partially applied event
pub struct Aggregator {
    /// Zone used to bucket readings into calendar days
    time_zone: TimeZone,

    /// Rolling window retention
    retention: SignedDuration,

    /// Wall clock used for window pruning
    clock: Arc<dyn Clock>,

    /// One entry per sensor, in sensor order
    sensors: RwLock<Vec<SensorState>>,
}

impl Aggregator {
    /// Create an empty aggregator for the given sensors
    pub fn new(config: &Config, sensors: Vec<SensorDescriptor>, clock: Arc<dyn Clock>) -> Self {
        let states = sensors.into_iter().map(SensorState::new).collect();
        Self::from_states(config, states, clock)
    }

    pub(crate) fn from_states(config: &Config, states: Vec<SensorState>, clock: Arc<dyn Clock>) -> Self {
        Self {
            time_zone: config.display_time_zone.clone(),
            retention: config.window_retention,
            clock,
            sensors: RwLock::new(states),
        }
    }

    /// Rebuild the full state by replaying every stored record
    ///
    /// This is the canonical definition of correct aggregate state.
    pub fn rebuild(db: &Database, config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let aggregator = Self::new(config, db.sensors(), clock);
        let stats = aggregator.replay(db.iter_all())?;

        tracing::info!(
            sensors = db.sensor_count(),
            applied = stats.applied,
            skipped = stats.skipped,
            "Rebuilt aggregate state from storage"
        );

        Ok(aggregator)
    }

    /// Apply a sequence of stored events
    ///
    /// Read errors abort the replay; invalid records are logged and skipped.
    pub fn replay<I>(&self, events: I) -> Result<ReplayStats>
    where
        I: IntoIterator<Item = Result<Event>>,
    {
        let mut stats = ReplayStats::default();

        for event in events {
            let event = event?;
            match self.apply_event(&event) {
                Ok(true) => stats.applied += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        sensor = event.sensor,
                        timestamp = %event.timestamp,
                        error = %e,
                        "Skipping stored record"
                    );
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Fold one event into the state
    ///
    /// Returns `Ok(false)` for the absent record (nothing changes).
    pub fn apply_event(&self, event: &Event) -> Result<bool> {
        let record = match event.decode()? {
            Some(record) => record,
            None => return Ok(false),
        };

        let cutoff = self.cutoff();
        let mut sensors = self.sensors.write();
        let state = sensors
            .get_mut(event.sensor)
            .ok_or(ThermoError::UnknownSensor(event.sensor))?;

        state.apply(event.timestamp, &record, &self.time_zone, cutoff);
        Ok(true)
    }

    /// Track a newly appended sensor; returns its index
    pub fn add_sensor(&self, descriptor: SensorDescriptor) -> usize {
        let mut sensors = self.sensors.write();
        sensors.push(SensorState::new(descriptor));
        sensors.len() - 1
    }

    /// Drop window samples that have aged out
    pub fn prune(&self) {
        let cutoff = self.cutoff();
        for state in self.sensors.write().iter_mut() {
            state.window.prune(cutoff);
        }
    }

    /// Consistent read-only copy of the current state
    ///
    /// Windows are filtered against the current wall clock.
    pub fn snapshot(&self) -> Snapshot {
        let taken_at = self.clock.now();
        let cutoff = self.cutoff_at(taken_at);

        let sensors = self.sensors.read();
        let sensors = sensors
            .iter()
            .enumerate()
            .map(|(index, state)| SensorSnapshot {
                index,
                descriptor: state.descriptor.clone(),
                temperature: state.temperature,
                humidity: state.humidity,
                last_update: state.last_update,
                window: state.window.since(cutoff),
                days: state.days.clone(),
            })
            .collect();

        Snapshot { taken_at, sensors }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of tracked sensors
    pub fn sensor_count(&self) -> usize {
        self.sensors.read().len()
    }

    /// Zone used for day buckets
    pub fn time_zone(&self) -> &TimeZone {
        &self.time_zone
    }

    /// Rolling window retention
    pub fn retention(&self) -> SignedDuration {
        self.retention
    }

    /// Copy of the raw per-sensor state (for the cache)
    pub(crate) fn states(&self) -> Vec<SensorState> {
        self.sensors.read().clone()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn cutoff(&self) -> Timestamp {
        self.cutoff_at(self.clock.now())
    }

    fn cutoff_at(&self, now: Timestamp) -> Timestamp {
        now.checked_sub(self.retention).unwrap_or(Timestamp::MIN)
    }
}
