//! Operations recorded in a client's DAG.

use crate::constants::reserved::CHECKPOINT_API_ID;
use crate::error::PhosError;
use crate::handle::{Handle, HandleKey};
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Api { api_id: u64 },
    Checkpoint,
}

/// What a checkpoint operation did with each listed handle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointOutcome {
    /// Device bytes copied into a new slot
    pub captured: Vec<HandleKey>,
    /// Restore marker recorded
    pub rederived: Vec<HandleKey>,
    /// Not Active yet, nothing on the device to capture
    pub deferred: Vec<HandleKey>,
    /// Removed from its manager before the capture ran
    pub released: Vec<HandleKey>,
    pub failed: Vec<(HandleKey, PhosError)>,
}

impl CheckpointOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Keys the next incremental checkpoint has to list again
    pub fn missed(&self) -> impl Iterator<Item = HandleKey> + '_ {
        self.deferred
            .iter()
            .copied()
            .chain(self.failed.iter().map(|(key, _)| *key))
    }
}

/// A logged operation
///
/// Handles are held weakly: the log never extends a handle's lifetime past its removal
/// from the owning manager.
#[derive(Debug, Clone)]
pub struct Operation {
    kind: OpKind,
    handles: Vec<(HandleKey, Weak<Handle>)>,
    keys: BTreeSet<HandleKey>,
    version: Option<u64>,
    outcome: Option<CheckpointOutcome>,
}

impl Operation {
    pub fn api(api_id: u64, handles: Vec<Arc<Handle>>) -> Self {
        let mut op = Self::empty(OpKind::Api { api_id });
        op.record_handles(handles);
        op
    }

    pub fn checkpoint() -> Self {
        Self::empty(OpKind::Checkpoint)
    }

    fn empty(kind: OpKind) -> Self {
        Self {
            kind,
            handles: Vec::new(),
            keys: BTreeSet::new(),
            version: None,
            outcome: None,
        }
    }

    /// Add handles to this operation; a handle already listed is ignored
    pub fn record_handles(&mut self, handles: impl IntoIterator<Item = Arc<Handle>>) {
        for handle in handles {
            if self.keys.insert(handle.key()) {
                self.handles.push((handle.key(), Arc::downgrade(&handle)));
            }
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn api_id(&self) -> u64 {
        match self.kind {
            OpKind::Api { api_id } => api_id,
            OpKind::Checkpoint => CHECKPOINT_API_ID,
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        matches!(self.kind, OpKind::Checkpoint)
    }

    /// Listed handles that are still alive, in listing order
    pub fn handles(&self) -> Vec<Arc<Handle>> {
        self.handles
            .iter()
            .filter_map(|(_, handle)| handle.upgrade())
            .collect()
    }

    /// Every listed key, including handles removed since the op was logged
    pub fn handle_keys(&self) -> impl Iterator<Item = HandleKey> + '_ {
        self.handles.iter().map(|(key, _)| *key)
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub(super) fn entries(&self) -> &[(HandleKey, Weak<Handle>)] {
        &self.handles
    }

    pub fn touches(&self, key: &HandleKey) -> bool {
        self.keys.contains(key)
    }

    /// Position in the client log; set when launched
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Capture result of a checkpoint op; `None` until the capture has run
    pub fn outcome(&self) -> Option<&CheckpointOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_captured(&self) -> bool {
        self.outcome.is_some()
    }

    pub(super) fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }

    pub(super) fn set_outcome(&mut self, outcome: CheckpointOutcome) {
        self.outcome = Some(outcome);
    }
}
