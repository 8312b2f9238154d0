//! # thermodb
//!
//! Fixed-slot telemetry storage for temperature sensors with:
//! - A pre-allocated file: one section per sensor, one 10-byte slot per
//!   5 minutes from 2024 through 2087
//! - A derived in-memory view (current values, rolling window, daily
//!   highs/lows) that can always be rebuilt from the file
//! - A single-writer ingestion queue
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Message source (external)                   │
//! │                  (topic, JSON payload)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Adapter
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │               Ingestion queue (FIFO)                         │
//! │                 single writer thread                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Engine::record
//!          ┌────────────┴────────────┐
//!          │ 1. write                │ 2. aggregate
//!          ▼                         ▼
//!   ┌─────────────┐   replay  ┌─────────────┐
//!   │  Database   │ ────────► │ Aggregator  │ ──► Snapshot ──► Report
//!   │ (fixed slot)│           │  (RwLock)   │
//!   └─────────────┘           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod event;
pub mod storage;
pub mod aggregate;
pub mod engine;
pub mod ingest;
pub mod report;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ThermoError, Result};
pub use config::Config;
pub use engine::Engine;
pub use event::Event;
pub use record::Record;
pub use storage::{Database, Layout, SensorDescriptor};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of thermodb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
