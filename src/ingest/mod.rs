//! Ingest Module
//!
//! Moves events from the message source into the engine.
//!
//! ## Architecture
//! ```text
//!   message source ──► Adapter ──► EventSender ──► queue (FIFO) ──► writer thread
//!   (topic, payload)   (resolve,                                    Engine::record
//!                       encode)                                     (write, then aggregate)
//! ```
//!
//! - One writer thread: storage writes and aggregate updates happen in
//!   arrival order
//! - The queue decouples message reception from disk I/O
//! - Shutdown drains the queue before the writer exits

mod adapter;
mod worker;

pub use adapter::{Adapter, Payload};
pub use worker::{EventSender, IngestHandle, IngestStats, Ingestor};
