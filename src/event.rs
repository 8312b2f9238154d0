//! Ingestion events
//!
//! The `(sensor, timestamp, raw record)` triple that flows from the
//! ingestion adapter into storage and the aggregator, and back out of the
//! storage iterators during replay.

use bytes::Bytes;
use jiff::Timestamp;

use crate::error::Result;
use crate::record::{decode_record, encode_record, Record};

/// One reading for one sensor at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Zero-based sensor index (section number)
    pub sensor: usize,

    /// Absolute UTC instant of the reading
    pub timestamp: Timestamp,

    /// Raw record bytes (10 bytes when well-formed)
    pub record: Bytes,
}

impl Event {
    pub fn new(sensor: usize, timestamp: Timestamp, record: impl Into<Bytes>) -> Self {
        Self {
            sensor,
            timestamp,
            record: record.into(),
        }
    }

    /// Build an event from a decoded record
    pub fn from_record(sensor: usize, timestamp: Timestamp, record: &Record) -> Self {
        Self::new(sensor, timestamp, Bytes::copy_from_slice(&encode_record(record)))
    }

    /// Decode the carried record (`None` for the absent record)
    pub fn decode(&self) -> Result<Option<Record>> {
        decode_record(&self.record)
    }
}
