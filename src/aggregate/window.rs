//! Rolling window of recent samples

use std::collections::VecDeque;

use jiff::Timestamp;

/// One `(timestamp, temperature)` sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub temperature: f64,
}

/// Time-ordered samples newer than a moving cutoff
///
/// Pruning only happens on insert or an explicit `prune`; readers that need
/// a current view filter with `since`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingWindow {
    samples: VecDeque<Sample>,
}

impl RollingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in timestamp order, then drop everything older than `cutoff`
    pub fn insert(&mut self, sample: Sample, cutoff: Timestamp) {
        let index = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(index, sample);
        self.prune(cutoff);
    }

    /// Drop samples older than `cutoff`
    pub fn prune(&mut self, cutoff: Timestamp) {
        while let Some(front) = self.samples.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Samples at or after `cutoff`, oldest first
    pub fn since(&self, cutoff: Timestamp) -> Vec<Sample> {
        let start = self.samples.partition_point(|s| s.timestamp < cutoff);
        self.samples.iter().skip(start).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
