//! Error types for thermodb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ThermoError
pub type Result<T> = std::result::Result<T, ThermoError>;

/// Unified error type for thermodb operations
#[derive(Debug, Error)]
pub enum ThermoError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt or foreign database file: {0}")]
    Corrupt(String),

    #[error("Metadata header error: {0}")]
    Metadata(String),

    #[error("Sensor count mismatch: database has {found}, expected at least {expected}")]
    SensorCount { expected: usize, found: usize },

    #[error("Unknown sensor index {0}")]
    UnknownSensor(usize),

    #[error("Growth rejected: {0}")]
    Growth(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache error: {0}")]
    Cache(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Ingestion Errors
    // -------------------------------------------------------------------------
    #[error("Ingest error: {0}")]
    Ingest(String),
}

impl From<serde_json::Error> for ThermoError {
    fn from(e: serde_json::Error) -> Self {
        ThermoError::Serialization(e.to_string())
    }
}
