//! # Checkpoint Bags
//!
//! Every handle owns one [`CheckpointBag`]: a version-ordered store of captured state.
//! The version of a slot is the index of the DAG operation that produced it.
//!
//! Kinds captured by reconstruction (streams, modules) never hold bytes; their bag
//! refuses slots and keeps a restore marker instead.

pub mod store;
pub mod timer;

pub use store::{CheckpointStore, DirectoryStore};
pub use timer::CheckpointTimer;

use crate::error::{PhosError, Result};
use crate::handle::CaptureStrategy;
use std::collections::BTreeMap;

/// Captured state of one handle at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSlot {
    version: u64,
    data: Vec<u8>,
}

impl CheckpointSlot {
    fn new(version: u64, capacity: u64) -> Self {
        Self {
            version,
            data: Vec::with_capacity(capacity as usize),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn fill(&mut self, bytes: Vec<u8>) {
        self.data = bytes;
    }
}

#[derive(Debug)]
pub struct CheckpointBag {
    capture: CaptureStrategy,
    state_size: u64,
    slots: BTreeMap<u64, CheckpointSlot>,
    latest_marker: Option<u64>,
}

impl CheckpointBag {
    pub fn new(capture: CaptureStrategy, state_size: u64) -> Self {
        Self {
            capture,
            state_size,
            slots: BTreeMap::new(),
            latest_marker: None,
        }
    }

    pub fn capture_strategy(&self) -> CaptureStrategy {
        self.capture
    }

    /// Allocate the slot for `version`
    ///
    /// Fails with `Unsupported` when this bag's kind is not captured by bytes, and with
    /// `PreconditionFailed` when `version` does not follow the latest one.
    pub fn apply_new_checkpoint(&mut self, version: u64) -> Result<&mut CheckpointSlot> {
        if self.capture != CaptureStrategy::Materialize {
            return Err(PhosError::Unsupported(format!(
                "byte capture for {:?} checkpoints",
                self.capture
            )));
        }
        if let Some(latest) = self.latest_version() {
            if version <= latest {
                return Err(PhosError::precondition(format!(
                    "checkpoint version {version} does not follow {latest}"
                )));
            }
        }
        let state_size = self.state_size;
        Ok(self
            .slots
            .entry(version)
            .or_insert_with(|| CheckpointSlot::new(version, state_size)))
    }

    /// Record that the handle's state at `version` is rebuilt by re-running restore
    pub fn record_marker(&mut self, version: u64) -> Result<()> {
        if self.capture != CaptureStrategy::ReDerive {
            return Err(PhosError::Unsupported(format!(
                "restore markers for {:?} checkpoints",
                self.capture
            )));
        }
        if matches!(self.latest_marker, Some(latest) if version <= latest) {
            return Err(PhosError::precondition(format!(
                "marker version {version} is not newer than the latest marker"
            )));
        }
        self.latest_marker = Some(version);
        Ok(())
    }

    pub fn latest_marker(&self) -> Option<u64> {
        self.latest_marker
    }

    pub fn latest(&self) -> Option<&CheckpointSlot> {
        self.slots.values().next_back()
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.slots.keys().next_back().copied()
    }

    pub fn get(&self, version: u64) -> Option<&CheckpointSlot> {
        self.slots.get(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.keys().copied()
    }

    /// Total bytes held across all slots
    pub fn memory_consumption(&self) -> u64 {
        self.slots.values().map(CheckpointSlot::size).sum()
    }

    /// Drop slots older than `version`; the most recent slot always survives
    pub fn evict_before(&mut self, version: u64) -> usize {
        let Some(latest) = self.latest_version() else {
            return 0;
        };
        let cutoff = version.min(latest);
        let kept = self.slots.split_off(&cutoff);
        let evicted = self.slots.len();
        self.slots = kept;
        evicted
    }

    /// Keep at most `count` (at least one) of the newest slots
    pub fn retain_latest(&mut self, count: usize) -> usize {
        let count = count.max(1);
        if self.slots.len() <= count {
            return 0;
        }
        let cutoff = self
            .slots
            .keys()
            .rev()
            .nth(count - 1)
            .copied()
            .unwrap_or_default();
        self.evict_before(cutoff)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
