//! # Operation DAG
//!
//! Append-only, totally ordered log of one client's operations. An operation's position
//! in the log is its version, and checkpoint operations tag the slots they capture with
//! that version.
//!
//! Capture of a checkpoint op waits until the worker has finished every op forwarded
//! before it ([`WorkerProgress`]), so the captured state holds exactly the mutations logged
//! before the checkpoint. Pending captures run strictly in log order.

pub mod operation;
pub mod progress;

pub use operation::{CheckpointOutcome, OpKind, Operation};
pub use progress::WorkerProgress;

use crate::device::DeviceRuntime;
use crate::error::{PhosError, Result};
use crate::handle::{CaptureStrategy, Handle, HandleKey};
use crate::logging::log_checkpoint_operation;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug)]
pub struct OperationDag {
    ops: Vec<Operation>,
    max_retained_versions: usize,
    progress: Arc<WorkerProgress>,
    /// Checkpoint versions whose capture has not run yet
    pending_captures: VecDeque<u64>,
}

impl Default for OperationDag {
    fn default() -> Self {
        Self::new(2)
    }
}

impl OperationDag {
    pub fn new(max_retained_versions: usize) -> Self {
        Self {
            ops: Vec::new(),
            max_retained_versions: max_retained_versions.max(1),
            progress: Arc::new(WorkerProgress::new()),
            pending_captures: VecDeque::new(),
        }
    }

    /// Completion tracker shared with the worker side
    pub fn progress(&self) -> Arc<WorkerProgress> {
        Arc::clone(&self.progress)
    }

    /// Append `op` and assign it the next version
    ///
    /// A checkpoint op is queued for capture; [`Self::capture_settled`] runs it.
    pub fn launch_op(&mut self, mut op: Operation) -> u64 {
        let version = self.ops.len() as u64;
        op.set_version(version);

        if op.is_checkpoint() {
            self.pending_captures.push_back(version);
        } else {
            debug!(version, api_id = op.api_id(), handles = op.handle_count(), "api op launched");
        }

        self.ops.push(op);
        version
    }

    /// Run every queued capture whose earlier forwarded ops have completed
    ///
    /// Returns the versions captured by this call, in log order.
    pub fn capture_settled(&mut self, device: &dyn DeviceRuntime) -> Vec<u64> {
        let mut captured = Vec::new();
        while let Some(&version) = self.pending_captures.front() {
            if !self.progress.is_settled_before(version) {
                trace!(
                    version,
                    outstanding = self.progress.outstanding_count(),
                    "checkpoint capture waiting on worker"
                );
                break;
            }
            self.pending_captures.pop_front();

            let outcome = match self.ops.get(version as usize) {
                Some(op) => self.capture(version, op, device),
                None => continue,
            };
            log_checkpoint_operation(
                "capture",
                version,
                self.ops[version as usize].handle_count(),
                outcome.captured.len(),
                outcome.deferred.len(),
                outcome.failed.len(),
            );
            self.ops[version as usize].set_outcome(outcome);
            captured.push(version);
        }
        captured
    }

    pub fn has_pending_capture(&self) -> bool {
        !self.pending_captures.is_empty()
    }

    fn capture(&self, version: u64, op: &Operation, device: &dyn DeviceRuntime) -> CheckpointOutcome {
        let mut outcome = CheckpointOutcome::default();
        for (key, handle) in op.entries() {
            let key = *key;
            let Some(handle) = handle.upgrade() else {
                outcome.released.push(key);
                continue;
            };
            if !handle.is_active() {
                outcome.deferred.push(key);
                continue;
            }
            match self.capture_one(version, &handle, device) {
                Ok(CaptureStrategy::Materialize) => outcome.captured.push(key),
                Ok(CaptureStrategy::ReDerive) => outcome.rederived.push(key),
                Ok(CaptureStrategy::Stateless) => {}
                Err(err) => {
                    warn!(handle = %key, version, error = %err, "checkpoint capture failed");
                    outcome.failed.push((key, err));
                }
            }
        }
        outcome
    }

    fn capture_one(
        &self,
        version: u64,
        handle: &Handle,
        device: &dyn DeviceRuntime,
    ) -> Result<CaptureStrategy> {
        let mut bag = handle.checkpoint_bag();
        let strategy = bag.capture_strategy();
        match strategy {
            CaptureStrategy::Materialize => {
                let server_addr = handle.server_addr().ok_or_else(|| {
                    PhosError::not_found(format!("server address of {}", handle.key()))
                })?;
                let len = if handle.state_size() > 0 {
                    handle.state_size()
                } else {
                    handle.size()
                };
                let bytes = device.read_memory(server_addr, len)?;
                bag.apply_new_checkpoint(version)?.fill(bytes);
                bag.retain_latest(self.max_retained_versions);
            }
            CaptureStrategy::ReDerive => bag.record_marker(version)?,
            CaptureStrategy::Stateless => {}
        }
        Ok(strategy)
    }

    pub fn get(&self, version: u64) -> Option<&Operation> {
        self.ops.get(version as usize)
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Version the next launched op will receive
    pub fn next_version(&self) -> u64 {
        self.ops.len() as u64
    }

    pub fn latest_checkpoint(&self) -> Option<&Operation> {
        self.ops.iter().rev().find(|op| op.is_checkpoint())
    }

    /// Ops that touch `key`, in log order
    pub fn ops_touching<'a>(&'a self, key: &'a HandleKey) -> impl Iterator<Item = &'a Operation> + 'a {
        self.ops.iter().filter(move |op| op.touches(key))
    }
}
