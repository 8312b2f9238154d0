//! Storage Module
//!
//! Pre-allocated, fixed-slot file holding every sensor's readings.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────┐  offset 0
//! │ Section 0                                  │
//! │ ┌────────────────────────────────────────┐ │
//! │ │ Header (100,000 bytes)                 │ │
//! │ │   1\n                                  │ │
//! │ │   {"mqtt_topic":..,"row_id":..,..}\n   │ │
//! │ │   zero padding                         │ │
//! │ ├────────────────────────────────────────┤ │
//! │ │ Slot 0      (10-byte record)           │ │
//! │ │ Slot 1                                 │ │
//! │ │ ...  one slot per 5 minutes            │ │
//! │ │ Slot N-1                               │ │
//! │ └────────────────────────────────────────┘ │
//! ├────────────────────────────────────────────┤  offset section_size
//! │ Section 1                                  │
//! ├────────────────────────────────────────────┤
//! │ ...                                        │
//! └────────────────────────────────────────────┘
//! ```
//!
//! The file is allocated in full when created and only ever grows by whole
//! sections appended for new sensors.

mod database;
mod iterator;
mod layout;
mod metadata;
mod pio;

pub use database::{Database, Fingerprint};
pub use iterator::{AllRecords, MergedRecords, SectionRecords};
pub use layout::{Layout, EPOCH, HEADER_SIZE, LEGACY_SLOT_COUNT, SLOT_COUNT, SLOT_SECONDS};
pub use metadata::{decode_header, encode_header, SensorDescriptor, METADATA_VERSION};
