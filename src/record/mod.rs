//! Record Module
//!
//! Fixed-size telemetry records as they are stored on disk.
//!
//! ## Record Format (10 bytes, big-endian)
//!
//! ```text
//! ┌───────┬───────┬───────────┬───────────┬───────────┬───────┬───────┐
//! │Ver (1)│Dev (1)│Humid (2)  │Temp (2)   │Volt (2)   │Link(1)│Batt(1)│
//! └───────┴───────┴───────────┴───────────┴───────────┴───────┴───────┘
//!                   0.01 %      0.01 °C     device      0-100   0-100 %
//! ```
//!
//! - Version is always 1
//! - Device id is 1-255 and changes when the physical sensor is replaced
//! - An all-zero record means "no reading stored for this slot"

mod codec;
mod fields;

pub use codec::{decode_record, encode_record, is_absent};
pub use fields::Record;

/// Size of an encoded record in bytes
pub const RECORD_SIZE: usize = 10;

/// The only record format version
pub const RECORD_VERSION: u8 = 1;

/// The all-zero "absent" record
pub const ABSENT_RECORD: [u8; RECORD_SIZE] = [0u8; RECORD_SIZE];
