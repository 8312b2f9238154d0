//! Engine Module
//!
//! Coordinates the database and the aggregator.
//!
//! ## Responsibilities
//! - Open/create the database file and grow it when allowed
//! - Restore aggregate state from the cache or a full replay
//! - Persist each event, then fold it into the aggregate view
//! - Sync and save the cache on close
//!
//! ## Overwritten Slots
//!
//! The file keeps one record per slot, but the live view folds in every
//! event. Once an event lands in an occupied slot (a second reading in the
//! same five minutes, or an absent record clearing one), the live view
//! holds more than a replay would. `close` then saves a cache rebuilt from
//! the file instead of the live view, so a restart from the cache always
//! matches a full replay.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::{cache, Aggregator, Clock, Snapshot, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::event::Event;
use crate::storage::{Database, SensorDescriptor};

/// The storage + aggregation engine
///
/// ## Concurrency Model: Single Writer
///
/// - **Writes** (`record`, `add_sensor`): expected from one writer, normally
///   the ingestion worker thread
/// - **Reads** (`snapshot`, database reads/iteration): any thread; the
///   aggregator hands out consistent copies under its RwLock
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// The fixed-slot database file
    db: Arc<Database>,

    /// Derived in-memory view
    aggregator: Arc<Aggregator>,

    /// Wall clock shared with the aggregator
    clock: Arc<dyn Clock>,

    /// Set once an event overwrote an occupied slot
    overwritten: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config and sensor list
    ///
    /// On startup:
    /// 1. Open/create the database (growing it if `allow_growth`)
    /// 2. Load the aggregate cache if it still matches the file
    /// 3. Otherwise replay every stored record
    pub fn open(config: Config, sensors: &[SensorDescriptor]) -> Result<Self> {
        Self::open_with_clock(config, sensors, Arc::new(SystemClock))
    }

    /// Open with an explicit wall clock
    pub fn open_with_clock(
        config: Config,
        sensors: &[SensorDescriptor],
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        // Step 1: Database
        let db = if config.allow_growth {
            Database::open_or_grow(&config.db_path, config.layout, sensors, config.sync_strategy)?
        } else {
            Database::open(&config.db_path, config.layout, sensors, config.sync_strategy)?
        };

        // Step 2/3: Aggregate state
        let cache_path = config.cache_path();
        let aggregator = match cache::load(&cache_path, &db, &config, Arc::clone(&clock))? {
            Some(aggregator) => aggregator,
            None => Aggregator::rebuild(&db, &config, Arc::clone(&clock))?,
        };

        Ok(Self {
            config,
            db: Arc::new(db),
            aggregator: Arc::new(aggregator),
            clock,
            overwritten: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified database path
    pub fn open_path(path: &Path, sensors: &[SensorDescriptor]) -> Result<Self> {
        let config = Config::builder().db_path(path).build();
        Self::open(config, sensors)
    }

    /// Persist one event, then fold it into the aggregate view
    ///
    /// Steps:
    /// 1. Validate the record (length, version)
    /// 2. Truncate the timestamp to its slot
    /// 3. Note whether the slot was occupied, then write it
    /// 4. Apply the stored event to the aggregator
    ///
    /// The aggregator sees the slot-aligned timestamp, i.e. exactly what a
    /// later replay of the file will see. Returns `Ok(false)` when the
    /// record was the absent record (slot cleared, nothing aggregated).
    pub fn record(&self, event: &Event) -> Result<bool> {
        // Step 1: Reject malformed records before touching the file
        event.decode()?;

        // Step 2: Slot-aligned timestamp (also range-checks)
        let layout = self.db.layout();
        let slot = layout.slot_for(event.timestamp)?;
        let timestamp = layout.timestamp_for(slot)?;

        // Step 3: Persist
        let occupied = self.db.is_occupied(event.sensor, slot)?;
        self.db.write_by_slot(event.sensor, slot, &event.record)?;
        if occupied {
            tracing::debug!(sensor = event.sensor, %timestamp, "Overwrote occupied slot");
            self.overwritten.store(true, Ordering::SeqCst);
        }

        // Step 4: Aggregate
        let stored = Event::new(event.sensor, timestamp, event.record.clone());
        self.aggregator.apply_event(&stored)
    }

    /// Append a new sensor to the database and the aggregate view
    pub fn add_sensor(&self, descriptor: SensorDescriptor) -> Result<usize> {
        let index = self.db.grow_by_sensor(descriptor.clone())?;
        self.aggregator.add_sensor(descriptor);
        Ok(index)
    }

    /// Consistent read-only view for reporting
    pub fn snapshot(&self) -> Snapshot {
        self.aggregator.snapshot()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the database and saves the aggregate cache. If any slot was
    /// overwritten since open, the cache is rebuilt from the file first. A
    /// failed cache save is logged, not returned: the next start simply
    /// rebuilds.
    pub fn close(&self) -> Result<()> {
        self.db.sync()?;

        let cache_path = self.config.cache_path();
        let saved = if self.overwritten.load(Ordering::SeqCst) {
            tracing::info!("Slots were overwritten; rebuilding state for the cache");
            Aggregator::rebuild(&self.db, &self.config, Arc::clone(&self.clock))
                .and_then(|rebuilt| cache::save(&cache_path, &rebuilt, &self.db))
        } else {
            cache::save(&cache_path, &self.aggregator, &self.db)
        };

        if let Err(e) = saved {
            tracing::warn!(path = %cache_path.display(), error = %e, "Failed to save aggregate cache");
            if let Err(e) = cache::remove(&cache_path) {
                tracing::warn!(path = %cache_path.display(), error = %e, "Failed to remove aggregate cache");
            }
        }

        tracing::info!(path = %self.db.path().display(), "Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Get the aggregator
    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
