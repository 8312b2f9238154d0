//! Record iterators
//!
//! Lazy, forward-only scans over stored records. Every call to the
//! database's `iter_*` methods starts a fresh scan from slot 0.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use bytes::Bytes;
use jiff::Timestamp;

use crate::error::{Result, ThermoError};
use crate::event::Event;
use crate::record::{is_absent, RECORD_SIZE};

use super::Database;

/// Slots read from disk per refill
const CHUNK_SLOTS: u64 = 8192;

// =============================================================================
// Single Section
// =============================================================================

/// Iterator over the non-absent slots of one sensor, in slot order
///
/// Reads the section in fixed-size chunks; fuses after an I/O error.
pub struct SectionRecords<'a> {
    db: &'a Database,
    sensor: usize,
    /// Chunk buffer
    buf: Vec<u8>,
    /// Slot number of the first record in `buf`
    buf_start: u64,
    /// Number of slots currently in `buf`
    buf_slots: u64,
    /// Next slot to inspect, relative to `buf_start`
    pos: u64,
    done: bool,
}

impl<'a> SectionRecords<'a> {
    pub(super) fn new(db: &'a Database, sensor: usize) -> Self {
        Self {
            db,
            sensor,
            buf: Vec::new(),
            buf_start: 0,
            buf_slots: 0,
            pos: 0,
            done: false,
        }
    }

    /// Sensor this iterator scans
    pub fn sensor(&self) -> usize {
        self.sensor
    }

    /// Load the next chunk; false when the section is exhausted
    fn refill(&mut self) -> Result<bool> {
        let layout = self.db.layout();
        let start = self.buf_start + self.buf_slots;
        if start >= layout.slot_count() {
            return Ok(false);
        }

        let slots = CHUNK_SLOTS.min(layout.slot_count() - start);
        self.buf.resize(slots as usize * RECORD_SIZE, 0);
        self.db
            .read_raw(&mut self.buf, layout.slot_offset(self.sensor, start))?;

        self.buf_start = start;
        self.buf_slots = slots;
        self.pos = 0;
        Ok(true)
    }
}

impl<'a> Iterator for SectionRecords<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.pos >= self.buf_slots {
                match self.refill() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            let index = self.pos as usize;
            self.pos += 1;

            let bytes = &self.buf[index * RECORD_SIZE..(index + 1) * RECORD_SIZE];
            if is_absent(bytes) {
                continue;
            }

            let slot = self.buf_start + index as u64;
            let record = Bytes::copy_from_slice(bytes);
            return Some(
                self.db
                    .layout()
                    .timestamp_for(slot)
                    .map(|timestamp| Event::new(self.sensor, timestamp, record)),
            );
        }
    }
}

// =============================================================================
// All Sections, Sensor-Major
// =============================================================================

/// Iterator over every sensor's records, one section after another
///
/// Within a sensor records are oldest first; sensors are not interleaved.
pub struct AllRecords<'a> {
    db: &'a Database,
    sensor_count: usize,
    next_sensor: usize,
    current: Option<SectionRecords<'a>>,
}

impl<'a> AllRecords<'a> {
    pub(super) fn new(db: &'a Database, sensor_count: usize) -> Self {
        Self {
            db,
            sensor_count,
            next_sensor: 0,
            current: None,
        }
    }
}

impl<'a> Iterator for AllRecords<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(section) = self.current.as_mut() {
                if let Some(item) = section.next() {
                    return Some(item);
                }
            }

            if self.next_sensor >= self.sensor_count {
                self.current = None;
                return None;
            }

            self.current = Some(SectionRecords::new(self.db, self.next_sensor));
            self.next_sensor += 1;
        }
    }
}

// =============================================================================
// All Sections, Time-Ordered
// =============================================================================

/// K-way merge of per-sensor iterators ordered by `(timestamp, sensor)`
///
/// Errors from any source are yielded as soon as they are seen; the failing
/// source is fused and the merge continues with the others.
pub struct MergedRecords<'a> {
    sources: Vec<SectionRecords<'a>>,
    /// Buffered next event of each source
    heads: Vec<Option<Event>>,
    /// Min-heap of buffered heads
    heap: BinaryHeap<Reverse<(Timestamp, usize)>>,
    errors: VecDeque<ThermoError>,
    primed: bool,
}

impl<'a> MergedRecords<'a> {
    pub(super) fn new(sources: Vec<SectionRecords<'a>>) -> Self {
        let heads = vec![None; sources.len()];
        Self {
            sources,
            heads,
            heap: BinaryHeap::new(),
            errors: VecDeque::new(),
            primed: false,
        }
    }

    /// Pull the next event of one source into the heap
    fn advance(&mut self, index: usize) {
        match self.sources[index].next() {
            Some(Ok(event)) => {
                self.heap.push(Reverse((event.timestamp, index)));
                self.heads[index] = Some(event);
            }
            Some(Err(e)) => self.errors.push_back(e),
            None => {}
        }
    }
}

impl<'a> Iterator for MergedRecords<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed {
            self.primed = true;
            for index in 0..self.sources.len() {
                self.advance(index);
            }
        }

        if let Some(e) = self.errors.pop_front() {
            return Some(Err(e));
        }

        let Reverse((_, index)) = self.heap.pop()?;
        let event = self.heads[index].take();
        self.advance(index);

        event.map(Ok)
    }
}
