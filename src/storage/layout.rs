//! Section layout and slot addressing
//!
//! Maps timestamps to 5-minute slots and slots to byte offsets.

use jiff::Timestamp;

use crate::error::{Result, ThermoError};
use crate::record::RECORD_SIZE;

// =============================================================================
// Layout Constants
// =============================================================================

/// Width of one slot in seconds
pub const SLOT_SECONDS: i64 = 300;

/// Size of the metadata header at the start of every section
pub const HEADER_SIZE: u64 = 100_000;

/// First instant covered by slot 0 (2024-01-01T00:00:00Z)
pub const EPOCH: Timestamp = Timestamp::constant(1_704_067_200, 0);

/// Slots from the epoch through the bucket holding 2087-12-31T23:59:59Z
pub const SLOT_COUNT: u64 = 6_732_288;

/// Slot count of older files sized as 64 years of 365 days
///
/// Those files ignore leap days, so their sections are 67,376,800 bytes
/// and the default layout reports them as corrupt. Open them with
/// `Layout::new(EPOCH, LEGACY_SLOT_COUNT)`; their range ends on
/// 2087-12-16.
pub const LEGACY_SLOT_COUNT: u64 = 64 * 365 * 288;

/// Exclusive end of the default layout (2088-01-01T00:00:00Z)
const DEFAULT_END_SECOND: i64 = 3_723_753_600;

/// Slot geometry shared by every section of a database file
///
/// A section is `HEADER_SIZE` bytes of metadata followed by `slot_count`
/// fixed-size records. Section N starts at byte `N * section_size()`.
///
/// The default counts leap days. Files written with 365-day years need
/// `Layout::legacy()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    epoch: Timestamp,
    slot_count: u64,
    /// Exclusive end of the representable range, in unix seconds
    end_second: i64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            epoch: EPOCH,
            slot_count: SLOT_COUNT,
            end_second: DEFAULT_END_SECOND,
        }
    }
}

impl Layout {
    /// Create a layout with a custom epoch and slot count
    pub fn new(epoch: Timestamp, slot_count: u64) -> Result<Self> {
        let span = i64::try_from(slot_count)
            .ok()
            .and_then(|n| n.checked_mul(SLOT_SECONDS))
            .and_then(|secs| secs.checked_add(epoch.as_second()))
            .ok_or_else(|| {
                ThermoError::Config(format!("{} slots overflow the timestamp range", slot_count))
            })?;

        // The exclusive end itself must be a valid instant
        Timestamp::from_second(span).map_err(|e| {
            ThermoError::Config(format!("layout end is not representable: {}", e))
        })?;

        Ok(Self {
            epoch,
            slot_count,
            end_second: span,
        })
    }

    /// Geometry of files sized without leap days
    pub fn legacy() -> Self {
        let slots = LEGACY_SLOT_COUNT as i64;
        Self {
            epoch: EPOCH,
            slot_count: LEGACY_SLOT_COUNT,
            end_second: EPOCH.as_second() + slots * SLOT_SECONDS,
        }
    }

    /// First instant covered by slot 0
    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    /// Number of slots in every section
    pub fn slot_count(&self) -> u64 {
        self.slot_count
    }

    /// Exclusive end of the representable range
    pub fn end(&self) -> Timestamp {
        Timestamp::from_second(self.end_second).unwrap_or(Timestamp::MAX)
    }

    /// Bytes per sensor section (header + all slots)
    pub fn section_size(&self) -> u64 {
        HEADER_SIZE + self.slot_count * RECORD_SIZE as u64
    }

    /// Byte offset where a sensor's section begins
    pub fn section_offset(&self, sensor: usize) -> u64 {
        sensor as u64 * self.section_size()
    }

    /// Byte offset of a slot inside the file
    pub fn slot_offset(&self, sensor: usize, slot: u64) -> u64 {
        self.section_offset(sensor) + HEADER_SIZE + slot * RECORD_SIZE as u64
    }

    // =========================================================================
    // Timestamp <-> Slot
    // =========================================================================

    /// Slot containing a timestamp
    ///
    /// Timestamps outside `[epoch, end)` are rejected, never clamped.
    pub fn slot_for(&self, ts: Timestamp) -> Result<u64> {
        if ts < self.epoch || ts.as_second() >= self.end_second {
            return Err(ThermoError::OutOfRange(format!(
                "timestamp {} outside [{}, {})",
                ts,
                self.epoch,
                self.end()
            )));
        }

        let elapsed = ts.as_second() - self.epoch.as_second();
        Ok((elapsed / SLOT_SECONDS) as u64)
    }

    /// Start instant of a slot
    pub fn timestamp_for(&self, slot: u64) -> Result<Timestamp> {
        if slot >= self.slot_count {
            return Err(ThermoError::OutOfRange(format!(
                "slot {} outside [0, {})",
                slot, self.slot_count
            )));
        }

        let second = self.epoch.as_second() + slot as i64 * SLOT_SECONDS;
        Timestamp::from_second(second)
            .map_err(|e| ThermoError::OutOfRange(format!("slot {}: {}", slot, e)))
    }

    /// Truncate a timestamp to the start of its slot
    pub fn truncate(&self, ts: Timestamp) -> Result<Timestamp> {
        self.timestamp_for(self.slot_for(ts)?)
    }
}
