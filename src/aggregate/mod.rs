//! Aggregate Module
//!
//! In-memory view derived from stored readings: current values, a rolling
//! window of recent temperatures and per-day highs/lows.
//!
//! ## Responsibilities
//! - Rebuild the full view by replaying storage on startup
//! - Fold live events in as they are persisted
//! - Hand out consistent snapshots to report generation
//! - Optionally persist the view to a cache that shortcuts the replay
//!
//! The view has no independent persistence: replaying the database from
//! slot 0 always reproduces it, and the cache is only trusted when it
//! provably describes the same file.

pub mod cache;
mod clock;
mod state;
mod window;

use std::collections::BTreeMap;

use jiff::civil::Date;
use jiff::Timestamp;

use crate::storage::SensorDescriptor;

pub use clock::{Clock, ManualClock, SystemClock};
pub use state::{Aggregator, ReplayStats};
pub use window::{RollingWindow, Sample};

/// Lowest and highest temperature seen on one local calendar date
///
/// The first reading seeds both ends; later readings only widen the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayRange {
    pub min: f64,
    pub max: f64,
}

impl DayRange {
    pub fn seed(temperature: f64) -> Self {
        Self {
            min: temperature,
            max: temperature,
        }
    }

    pub fn extend(&mut self, temperature: f64) {
        self.min = self.min.min(temperature);
        self.max = self.max.max(temperature);
    }
}

/// Read-only view of all sensors at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Wall-clock time the snapshot was taken
    pub taken_at: Timestamp,

    /// One entry per sensor, in sensor order
    pub sensors: Vec<SensorSnapshot>,
}

/// Read-only view of one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub index: usize,
    pub descriptor: SensorDescriptor,

    /// Last known temperature in °C
    pub temperature: Option<f64>,

    /// Last known humidity in %
    pub humidity: Option<f64>,

    /// Timestamp of the last applied reading
    pub last_update: Option<Timestamp>,

    /// Rolling window samples still within retention, oldest first
    pub window: Vec<Sample>,

    /// Local date → temperature range
    pub days: BTreeMap<Date, DayRange>,
}
