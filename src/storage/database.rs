//! Database file
//!
//! Owns the pre-allocated file and provides slot-addressed reads/writes.
//!
//! ## Responsibilities
//! - Create the file (all sections zero-filled, one header per section)
//! - Validate an existing file (size, headers) on open
//! - Append whole sections for new sensors
//! - Read/write single slots and iterate stored records

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;

use jiff::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::SyncStrategy;
use crate::error::{Result, ThermoError};
use crate::record::{decode_record, is_absent, Record, RECORD_SIZE};

use super::iterator::{AllRecords, MergedRecords, SectionRecords};
use super::metadata::{decode_header, encode_header, SensorDescriptor};
use super::pio::{read_exact_at, write_all_at};
use super::{Layout, HEADER_SIZE};

/// Identity of the file contents at a point in time
///
/// Used to decide whether a persisted aggregate cache still describes the
/// file. Any slot write changes the modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub sensor_count: u64,
    pub file_len: u64,
    pub modified_nanos: u128,
}

/// The fixed-slot telemetry database
///
/// ## Concurrency
/// - All I/O is positional, so methods take `&self` and share one handle
/// - Sections are disjoint byte ranges: iterating one sensor while the
///   writer updates another needs no coordination
/// - `sensors`: RwLock, only written when a section is appended
/// - Not safe for several processes writing the same file
pub struct Database {
    /// Path of the database file
    path: PathBuf,

    /// Section geometry
    layout: Layout,

    /// Shared file handle (positional I/O only)
    file: File,

    /// When to fsync after writes
    sync_strategy: SyncStrategy,

    /// Descriptors parsed from the section headers, in section order
    sensors: RwLock<Vec<SensorDescriptor>>,

    /// Writes since the last sync
    unsynced_writes: AtomicUsize,
}

impl Database {
    /// Open a database, creating it if the file does not exist
    ///
    /// An existing file must hold at least `sensors.len()` sections.
    pub fn open(
        path: &Path,
        layout: Layout,
        sensors: &[SensorDescriptor],
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, layout, sensors, sync_strategy);
        }

        let db = Self::open_existing(path, layout, sync_strategy)?;
        db.check_sensors(sensors, false)?;
        Ok(db)
    }

    /// Open a database, appending sections for sensors it does not have yet
    ///
    /// Existing sensors must appear in the same order as in `sensors`;
    /// growth never reorders or shrinks the file.
    pub fn open_or_grow(
        path: &Path,
        layout: Layout,
        sensors: &[SensorDescriptor],
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        if !path.exists() {
            return Self::create(path, layout, sensors, sync_strategy);
        }

        let db = Self::open_existing(path, layout, sync_strategy)?;
        db.check_sensors(sensors, true)?;

        let existing = db.sensor_count();
        for descriptor in sensors.iter().skip(existing) {
            db.grow_by_sensor(descriptor.clone())?;
        }

        Ok(db)
    }

    /// Open an existing database without creating or growing it
    ///
    /// On open:
    /// 1. File size must be an exact multiple of the section size
    /// 2. Every section header must parse
    pub fn open_existing(path: &Path, layout: Layout, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        let section_size = layout.section_size();

        if file_len % section_size != 0 {
            return Err(ThermoError::Corrupt(format!(
                "{}: size {} is not a multiple of the section size {}",
                path.display(),
                file_len,
                section_size
            )));
        }

        let count = (file_len / section_size) as usize;
        let mut sensors = Vec::with_capacity(count);
        for sensor in 0..count {
            sensors.push(Self::read_header(&file, &layout, sensor)?);
        }

        tracing::info!(
            path = %path.display(),
            sensors = count,
            "Opened database"
        );

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            file,
            sync_strategy,
            sensors: RwLock::new(sensors),
            unsynced_writes: AtomicUsize::new(0),
        })
    }

    /// Create a new database file with one section per sensor
    fn create(
        path: &Path,
        layout: Layout,
        sensors: &[SensorDescriptor],
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        // Render every header first so a bad descriptor leaves no file behind
        let mut headers = Vec::with_capacity(sensors.len());
        for descriptor in sensors {
            descriptor.validate()?;
            headers.push(encode_header(descriptor)?);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        // Zero-filled allocation of every section
        file.set_len(layout.section_size() * sensors.len() as u64)?;

        for (sensor, header) in headers.iter().enumerate() {
            write_all_at(&file, header, layout.section_offset(sensor))?;
        }
        file.sync_all()?;

        tracing::info!(
            path = %path.display(),
            sensors = sensors.len(),
            bytes = layout.section_size() * sensors.len() as u64,
            "Created database"
        );

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            file,
            sync_strategy,
            sensors: RwLock::new(sensors.to_vec()),
            unsynced_writes: AtomicUsize::new(0),
        })
    }

    /// Compare stored descriptors against the requested list
    fn check_sensors(&self, expected: &[SensorDescriptor], growing: bool) -> Result<()> {
        let stored = self.sensors.read();

        for (index, (have, want)) in stored.iter().zip(expected).enumerate() {
            if have.topic == want.topic {
                continue;
            }
            if growing {
                return Err(ThermoError::Growth(format!(
                    "sensor {} is '{}' on disk but '{}' was requested; sensors may only be appended",
                    index, have.topic, want.topic
                )));
            }
            tracing::warn!(
                sensor = index,
                stored = %have.topic,
                requested = %want.topic,
                "Stored sensor topic differs from configuration"
            );
        }

        if stored.len() < expected.len() && !growing {
            return Err(ThermoError::SensorCount {
                expected: expected.len(),
                found: stored.len(),
            });
        }

        Ok(())
    }

    // =========================================================================
    // Sensors
    // =========================================================================

    /// Append one zero-filled section for a new sensor
    ///
    /// Returns the new sensor's index. Existing sections are untouched.
    pub fn grow_by_sensor(&self, descriptor: SensorDescriptor) -> Result<usize> {
        descriptor.validate()?;
        let header = encode_header(&descriptor)?;

        let mut sensors = self.sensors.write();
        let index = sensors.len();
        let expected_len = self.layout.section_offset(index);

        let actual_len = self.file.metadata()?.len();
        if actual_len != expected_len {
            return Err(ThermoError::Corrupt(format!(
                "file is {} bytes, expected {} before growth",
                actual_len, expected_len
            )));
        }

        self.append_section(expected_len, |file| {
            write_all_at(file, &header, expected_len)?;
            file.sync_all()?;
            Ok(())
        })?;

        tracing::info!(sensor = index, label = %descriptor.label, "Appended sensor section");
        sensors.push(descriptor);

        Ok(index)
    }

    /// Extend the file by one zero-filled section starting at `start`, then
    /// run `init` on it
    ///
    /// If `init` fails the file is cut back to `start`, so a failed growth
    /// leaves the previous sections as the whole file.
    fn append_section<F>(&self, start: u64, init: F) -> Result<()>
    where
        F: FnOnce(&File) -> Result<()>,
    {
        self.file.set_len(start + self.layout.section_size())?;

        if let Err(e) = init(&self.file) {
            tracing::warn!(error = %e, "Failed to initialize new section, truncating");
            if let Err(undo) = self.file.set_len(start) {
                tracing::error!(error = %undo, len = start, "Failed to truncate after failed growth");
            }
            return Err(e);
        }

        Ok(())
    }

    /// Number of sensor sections
    pub fn sensor_count(&self) -> usize {
        self.sensors.read().len()
    }

    /// Descriptors of all sensors, in section order
    pub fn sensors(&self) -> Vec<SensorDescriptor> {
        self.sensors.read().clone()
    }

    /// Parse a sensor's metadata header from disk
    pub fn read_metadata(&self, sensor: usize) -> Result<SensorDescriptor> {
        self.check_sensor(sensor)?;
        Self::read_header(&self.file, &self.layout, sensor)
    }

    fn read_header(file: &File, layout: &Layout, sensor: usize) -> Result<SensorDescriptor> {
        let mut block = vec![0u8; HEADER_SIZE as usize];
        read_exact_at(file, &mut block, layout.section_offset(sensor))?;
        decode_header(&block).map_err(|e| match e {
            ThermoError::Metadata(msg) => ThermoError::Metadata(format!("sensor {}: {}", sensor, msg)),
            other => other,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read one slot (`None` if nothing was ever stored there)
    pub fn read_by_slot(&self, sensor: usize, slot: u64) -> Result<Option<Record>> {
        self.check_sensor(sensor)?;
        self.check_slot(slot)?;

        let mut bytes = [0u8; RECORD_SIZE];
        read_exact_at(&self.file, &mut bytes, self.layout.slot_offset(sensor, slot))?;
        decode_record(&bytes)
    }

    /// Read the slot containing a timestamp
    pub fn read_by_timestamp(&self, sensor: usize, timestamp: Timestamp) -> Result<Option<Record>> {
        let slot = self.layout.slot_for(timestamp)?;
        self.read_by_slot(sensor, slot)
    }

    /// Whether a slot holds anything other than the absent record
    ///
    /// Unlike `read_by_slot` this does not decode, so slots holding an
    /// unsupported version count as occupied.
    pub fn is_occupied(&self, sensor: usize, slot: u64) -> Result<bool> {
        self.check_sensor(sensor)?;
        self.check_slot(slot)?;

        let mut bytes = [0u8; RECORD_SIZE];
        read_exact_at(&self.file, &mut bytes, self.layout.slot_offset(sensor, slot))?;
        Ok(!is_absent(&bytes))
    }

    /// Raw positional read, used by the iterators
    pub(crate) fn read_raw(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_exact_at(&self.file, buf, offset)?;
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Overwrite one slot (last write wins)
    pub fn write_by_slot(&self, sensor: usize, slot: u64, record: &[u8]) -> Result<()> {
        if record.len() != RECORD_SIZE {
            return Err(ThermoError::InvalidRecord(format!(
                "expected {} bytes, got {}",
                RECORD_SIZE,
                record.len()
            )));
        }
        self.check_sensor(sensor)?;
        self.check_slot(slot)?;

        write_all_at(&self.file, record, self.layout.slot_offset(sensor, slot))?;
        self.after_write()
    }

    /// Overwrite the slot containing a timestamp
    pub fn write_by_timestamp(&self, sensor: usize, timestamp: Timestamp, record: &[u8]) -> Result<()> {
        let slot = self.layout.slot_for(timestamp)?;
        self.write_by_slot(sensor, slot, record)
    }

    /// Apply the sync strategy after a successful write
    fn after_write(&self) -> Result<()> {
        match self.sync_strategy {
            SyncStrategy::EveryWrite => self.sync(),
            SyncStrategy::EveryNWrites { count } => {
                let pending = self.unsynced_writes.fetch_add(1, Ordering::SeqCst) + 1;
                if pending >= count {
                    self.sync()
                } else {
                    Ok(())
                }
            }
            SyncStrategy::OnClose => {
                self.unsynced_writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Force written slots to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced_writes.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Close the database, syncing outstanding writes
    pub fn close(self) -> Result<()> {
        self.sync()?;
        tracing::info!(path = %self.path.display(), "Closed database");
        Ok(())
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Stored records of one sensor, oldest slot first
    pub fn iter_sensor(&self, sensor: usize) -> Result<SectionRecords<'_>> {
        self.check_sensor(sensor)?;
        Ok(SectionRecords::new(self, sensor))
    }

    /// Stored records of every sensor, sensor-major
    pub fn iter_all(&self) -> AllRecords<'_> {
        AllRecords::new(self, self.sensor_count())
    }

    /// Stored records of every sensor merged into timestamp order
    ///
    /// Ties are broken by sensor index.
    pub fn iter_merged(&self) -> MergedRecords<'_> {
        let sources = (0..self.sensor_count())
            .map(|sensor| SectionRecords::new(self, sensor))
            .collect();
        MergedRecords::new(sources)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the section layout
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Current identity of the file contents
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let metadata = self.file.metadata()?;
        let modified_nanos = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        Ok(Fingerprint {
            sensor_count: self.sensor_count() as u64,
            file_len: metadata.len(),
            modified_nanos,
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_sensor(&self, sensor: usize) -> Result<()> {
        if sensor >= self.sensor_count() {
            return Err(ThermoError::UnknownSensor(sensor));
        }
        Ok(())
    }

    fn check_slot(&self, slot: u64) -> Result<()> {
        if slot >= self.layout.slot_count() {
            return Err(ThermoError::OutOfRange(format!(
                "slot {} outside [0, {})",
                slot,
                self.layout.slot_count()
            )));
        }
        Ok(())
    }
}
