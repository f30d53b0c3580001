//! Worker completion tracking for forwarded operations.
//!
//! The parser registers the version of every op it forwards; the worker completes it after
//! executing the op on the device. A checkpoint at version `v` may capture only once no
//! forwarded op below `v` is outstanding.

use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct WorkerProgress {
    outstanding: Mutex<BTreeSet<u64>>,
}

impl WorkerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the op at `version` was handed to the worker
    pub fn forward(&self, version: u64) {
        self.outstanding.lock().insert(version);
    }

    /// Record that the worker finished the op at `version`; false if it was not outstanding
    pub fn complete(&self, version: u64) -> bool {
        self.outstanding.lock().remove(&version)
    }

    /// Oldest forwarded op the worker has not finished
    pub fn oldest_outstanding(&self) -> Option<u64> {
        self.outstanding.lock().first().copied()
    }

    /// Whether every forwarded op logged before `version` has completed
    pub fn is_settled_before(&self, version: u64) -> bool {
        self.oldest_outstanding().map_or(true, |oldest| oldest >= version)
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.lock().len()
    }
}
