//! Aggregate cache
//!
//! Persists the aggregate view so startup can skip a full replay.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "TDBC" (4) | Version: u16 (2) | Len: u64 (8)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer: CRC32 of payload (4)                            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Trust Policy
//! The cache is used only if its checksum verifies and the database
//! fingerprint (sensor count, file length, modification time), layout,
//! sensor topics, time zone and window retention all match. Anything else
//! is discarded and the caller falls back to a full rebuild.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, ThermoError};
use crate::storage::{Database, Fingerprint, SensorDescriptor, EPOCH};

use super::clock::Clock;
use super::state::{Aggregator, SensorState};
use super::window::{RollingWindow, Sample};
use super::DayRange;

/// Magic bytes identifying a cache file
const MAGIC: &[u8; 4] = b"TDBC";

/// Current cache format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + PayloadLen (8) = 14 bytes
const HEADER_SIZE: usize = 14;

/// Footer size: CRC32 (4)
const FOOTER_SIZE: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    fingerprint: Fingerprint,
    epoch_second: i64,
    slot_count: u64,
    time_zone: String,
    retention_seconds: i64,
    sensors: Vec<CachedSensor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedSensor {
    topic: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
    last_update: Option<(i64, i32)>,
    window: Vec<(i64, i32, f64)>,
    days: Vec<(i16, i8, i8, f64, f64)>,
}

// =============================================================================
// Save
// =============================================================================

/// Write the aggregator's state for the database's current contents
///
/// Writes to a temporary file first and renames it into place.
pub fn save(path: &Path, aggregator: &Aggregator, db: &Database) -> Result<()> {
    let cache = CacheFile {
        fingerprint: db.fingerprint()?,
        epoch_second: db.layout().epoch().as_second(),
        slot_count: db.layout().slot_count(),
        time_zone: time_zone_key(aggregator.time_zone()),
        retention_seconds: aggregator.retention().as_secs(),
        sensors: aggregator.states().iter().map(to_cached).collect(),
    };

    let payload = bincode::serialize(&cache)
        .map_err(|e| ThermoError::Serialization(format!("cache encode failed: {}", e)))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut file = File::create(tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(tmp_path, path)?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved aggregate cache");
    Ok(())
}

// =============================================================================
// Load
// =============================================================================

/// Load a cached aggregator if it still describes the database
///
/// Returns `Ok(None)` when there is no usable cache; the reason is logged.
pub fn load(
    path: &Path,
    db: &Database,
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<Option<Aggregator>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No aggregate cache");
        return Ok(None);
    }

    let cache = match read_cache_file(path) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable aggregate cache");
            return Ok(None);
        }
    };

    if let Some(reason) = mismatch(&cache, db, config)? {
        tracing::info!(path = %path.display(), reason = %reason, "Discarding stale aggregate cache");
        return Ok(None);
    }

    let descriptors = db.sensors();
    let mut states = Vec::with_capacity(cache.sensors.len());
    for (cached, descriptor) in cache.sensors.into_iter().zip(descriptors) {
        match from_cached(cached, descriptor) {
            Ok(state) => states.push(state),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding aggregate cache with invalid contents");
                return Ok(None);
            }
        }
    }

    let aggregator = Aggregator::from_states(config, states, clock);
    aggregator.prune();

    tracing::info!(path = %path.display(), "Loaded aggregate cache");
    Ok(Some(aggregator))
}

/// Remove a cache file if present
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_cache_file(path: &Path) -> Result<CacheFile> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(ThermoError::Cache(format!("file too short: {} bytes", bytes.len())));
    }
    if &bytes[0..4] != MAGIC {
        return Err(ThermoError::Cache(format!("invalid magic {:?}", &bytes[0..4])));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(ThermoError::Cache(format!("unsupported version {}", version)));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[6..14]);
    let payload_len = u64::from_le_bytes(len_bytes) as usize;
    if bytes.len() != HEADER_SIZE + payload_len + FOOTER_SIZE {
        return Err(ThermoError::Cache(format!(
            "payload length {} does not match file size {}",
            payload_len,
            bytes.len()
        )));
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[HEADER_SIZE + payload_len..]);
    if crc32fast::hash(payload) != u32::from_le_bytes(crc_bytes) {
        return Err(ThermoError::Cache("checksum mismatch".to_string()));
    }

    bincode::deserialize(payload)
        .map_err(|e| ThermoError::Serialization(format!("cache decode failed: {}", e)))
}

/// Why a cache no longer describes the database, if it doesn't
fn mismatch(cache: &CacheFile, db: &Database, config: &Config) -> Result<Option<String>> {
    let fingerprint = db.fingerprint()?;
    if cache.fingerprint != fingerprint {
        return Ok(Some(format!(
            "database changed ({:?} != {:?})",
            cache.fingerprint, fingerprint
        )));
    }

    let layout = db.layout();
    if cache.epoch_second != layout.epoch().as_second() || cache.slot_count != layout.slot_count() {
        return Ok(Some("layout changed".to_string()));
    }

    let time_zone = time_zone_key(&config.display_time_zone);
    if cache.time_zone != time_zone {
        return Ok(Some(format!("time zone {} != {}", cache.time_zone, time_zone)));
    }

    if cache.retention_seconds != config.window_retention.as_secs() {
        return Ok(Some("window retention changed".to_string()));
    }

    let descriptors = db.sensors();
    if cache.sensors.len() != descriptors.len() {
        return Ok(Some("sensor count changed".to_string()));
    }
    for (index, (cached, descriptor)) in cache.sensors.iter().zip(&descriptors).enumerate() {
        if cached.topic != descriptor.topic {
            return Ok(Some(format!("sensor {} topic changed", index)));
        }
    }

    Ok(None)
}

// =============================================================================
// Conversions
// =============================================================================

/// Stable identity of a time zone for cache comparison
fn time_zone_key(tz: &TimeZone) -> String {
    match tz.iana_name() {
        Some(name) => name.to_string(),
        // Unnamed zones are identified by the local time at the epoch
        None => format!("unnamed:{}", tz.to_datetime(EPOCH)),
    }
}

fn to_cached(state: &SensorState) -> CachedSensor {
    CachedSensor {
        topic: state.descriptor.topic.clone(),
        temperature: state.temperature,
        humidity: state.humidity,
        last_update: state
            .last_update
            .map(|ts| (ts.as_second(), ts.subsec_nanosecond())),
        window: state
            .window
            .iter()
            .map(|s| (s.timestamp.as_second(), s.timestamp.subsec_nanosecond(), s.temperature))
            .collect(),
        days: state
            .days
            .iter()
            .map(|(date, range)| (date.year(), date.month(), date.day(), range.min, range.max))
            .collect(),
    }
}

fn from_cached(cached: CachedSensor, descriptor: SensorDescriptor) -> Result<SensorState> {
    let timestamp = |second: i64, nanos: i32| {
        Timestamp::new(second, nanos)
            .map_err(|e| ThermoError::Cache(format!("invalid timestamp: {}", e)))
    };

    let last_update = match cached.last_update {
        Some((second, nanos)) => Some(timestamp(second, nanos)?),
        None => None,
    };

    // Samples were stored oldest first; re-inserting keeps that order
    let mut window = RollingWindow::new();
    for (second, nanos, temperature) in cached.window {
        window.insert(
            Sample {
                timestamp: timestamp(second, nanos)?,
                temperature,
            },
            Timestamp::MIN,
        );
    }

    let mut days = BTreeMap::new();
    for (year, month, day, min, max) in cached.days {
        let date = Date::new(year, month, day)
            .map_err(|e| ThermoError::Cache(format!("invalid date: {}", e)))?;
        days.insert(date, DayRange { min, max });
    }

    Ok(SensorState {
        descriptor,
        temperature: cached.temperature,
        humidity: cached.humidity,
        last_update,
        window,
        days,
    })
}
