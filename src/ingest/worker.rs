//! Ingestion worker
//!
//! The single writer: a dedicated thread draining a crossbeam channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::engine::Engine;
use crate::error::{Result, ThermoError};
use crate::event::Event;

/// Counters reported by the writer when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events persisted and aggregated
    pub recorded: u64,

    /// Events persisted as absent records (slot cleared)
    pub cleared: u64,

    /// Events rejected and skipped
    pub rejected: u64,
}

/// Cloneable handle for submitting events to the writer
#[derive(Clone)]
pub struct EventSender {
    events: Sender<Event>,
}

impl EventSender {
    /// Queue an event (blocks while a bounded queue is full)
    pub fn send(&self, event: Event) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| ThermoError::Ingest("writer has stopped".to_string()))
    }

    /// Number of events waiting in the queue
    pub fn queued(&self) -> usize {
        self.events.len()
    }
}

/// Spawns the writer thread
pub struct Ingestor;

impl Ingestor {
    /// Start the writer for an engine
    ///
    /// The queue is bounded by `config.queue_capacity` when set.
    pub fn spawn(engine: Arc<Engine>) -> Result<IngestHandle> {
        let (events_tx, events_rx) = match engine.config().queue_capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        let worker = thread::Builder::new()
            .name("thermodb-writer".to_string())
            .spawn(move || run(engine, events_rx, shutdown_rx))?;

        Ok(IngestHandle {
            sender: EventSender { events: events_tx },
            shutdown: shutdown_tx,
            worker,
        })
    }
}

/// Owner of the running writer thread
pub struct IngestHandle {
    sender: EventSender,
    shutdown: Sender<()>,
    worker: JoinHandle<IngestStats>,
}

impl IngestHandle {
    /// A new sender for this writer
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Queue an event
    pub fn send(&self, event: Event) -> Result<()> {
        self.sender.send(event)
    }

    /// Stop the writer after draining every queued event
    ///
    /// Senders still held elsewhere get an error on their next send.
    pub fn shutdown(self) -> Result<IngestStats> {
        // The writer may already have exited if all senders were dropped
        let _ = self.shutdown.send(());
        drop(self.sender);

        self.worker
            .join()
            .map_err(|_| ThermoError::Ingest("writer thread panicked".to_string()))
    }
}

/// Writer loop: process events in FIFO order until told to stop
fn run(engine: Arc<Engine>, events: Receiver<Event>, shutdown: Receiver<()>) -> IngestStats {
    let mut stats = IngestStats::default();
    tracing::debug!("Writer started");

    loop {
        channel::select! {
            recv(events) -> msg => match msg {
                Ok(event) => process(&engine, &event, &mut stats),
                // Every sender is gone
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                for event in events.try_iter() {
                    process(&engine, &event, &mut stats);
                }
                break;
            }
        }
    }

    tracing::info!(
        recorded = stats.recorded,
        cleared = stats.cleared,
        rejected = stats.rejected,
        "Writer stopped"
    );
    stats
}

/// Record one event; failures are logged and skipped
fn process(engine: &Engine, event: &Event, stats: &mut IngestStats) {
    match engine.record(event) {
        Ok(true) => stats.recorded += 1,
        Ok(false) => stats.cleared += 1,
        Err(e) => {
            tracing::warn!(
                sensor = event.sensor,
                timestamp = %event.timestamp,
                error = %e,
                "Rejected event"
            );
            stats.rejected += 1;
        }
    }
}
