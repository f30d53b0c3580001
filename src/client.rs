//! # Client State
//!
//! Everything the parser knows about one connected process: its handle managers, the
//! parent/child side table, the operation log and the checkpoint cadence. A `Client` is
//! owned by its parser thread; only the readiness flag and handle activation are shared.

use crate::checkpoint::{CheckpointStore, CheckpointTimer};
use crate::config::{CheckpointPolicy, PhosConfig};
use crate::dag::{Operation, OperationDag, WorkerProgress};
use crate::device::DeviceRuntime;
use crate::error::{PhosError, Result};
use crate::handle::{
    restore, AllocationRequest, CaptureStrategy, Handle, HandleGraph, HandleKey, HandleManager,
    PoolOutcome, RelatedHandles, ResourceKind,
};
use crate::logging::log_handle_operation;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Client {
    id: Uuid,
    pid: u32,
    ready: Arc<AtomicBool>,
    managers: BTreeMap<ResourceKind, HandleManager>,
    graph: HandleGraph,
    dag: OperationDag,
    timer: CheckpointTimer,
    policy: CheckpointPolicy,
}

impl Client {
    pub fn new(pid: u32, config: &PhosConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            ready: Arc::new(AtomicBool::new(false)),
            managers: BTreeMap::new(),
            graph: HandleGraph::new(),
            dag: OperationDag::new(config.checkpoint.max_retained_versions),
            timer: CheckpointTimer::new(config.checkpoint.interval(), Instant::now()),
            policy: config.checkpoint.policy,
        }
    }

    /// Bootstrap the default context and stream on the device and fill the stream pool
    pub fn init(&mut self, pooled_handles: usize, device: &dyn DeviceRuntime) -> Result<()> {
        let contexts = self
            .managers
            .entry(ResourceKind::Context)
            .or_insert_with(|| HandleManager::new(ResourceKind::Context));
        contexts.init(&mut self.graph, RelatedHandles::new())?;
        let context = contexts
            .default_handle()
            .ok_or_else(|| PhosError::not_found("default context"))?;
        self.restore_handle(context.key(), device)?;

        let mut related = RelatedHandles::new();
        related.insert(ResourceKind::Context, vec![Arc::clone(&context)]);
        let streams = self
            .managers
            .entry(ResourceKind::Stream)
            .or_insert_with(|| HandleManager::new(ResourceKind::Stream));
        streams.init(&mut self.graph, related)?;
        let stream = streams
            .default_handle()
            .ok_or_else(|| PhosError::not_found("default stream"))?;
        self.restore_handle(stream.key(), device)?;

        let mut pooled = 0;
        for manager in self.managers.values_mut() {
            pooled += manager.preserve_pooled(pooled_handles, device)?;
        }

        info!(
            client_id = %self.id,
            pid = self.pid,
            pooled,
            "👤 CLIENT: default resources initialized"
        );
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    pub fn manager(&self, kind: ResourceKind) -> Option<&HandleManager> {
        self.managers.get(&kind)
    }

    /// Manager for `kind`, created on first use
    pub fn manager_mut(&mut self, kind: ResourceKind) -> &mut HandleManager {
        self.managers
            .entry(kind)
            .or_insert_with(|| HandleManager::new(kind))
    }

    pub fn managers(&self) -> impl Iterator<Item = &HandleManager> {
        self.managers.values()
    }

    pub fn graph(&self) -> &HandleGraph {
        &self.graph
    }

    pub fn dag(&self) -> &OperationDag {
        &self.dag
    }

    pub fn default_handle(&self, kind: ResourceKind) -> Option<Arc<Handle>> {
        self.manager(kind)?.default_handle()
    }

    pub fn get(&self, key: HandleKey) -> Option<Arc<Handle>> {
        self.manager(key.kind)?.get(key.id)
    }

    /// Resolve a client address against the manager of `kind`
    pub fn find_by_client_addr(&self, kind: ResourceKind, addr: u64) -> Option<(Arc<Handle>, u64)> {
        self.manager(kind)?.find_by_client_addr(addr)
    }

    pub fn allocate(&mut self, kind: ResourceKind, request: AllocationRequest) -> Result<Arc<Handle>> {
        let manager = self
            .managers
            .entry(kind)
            .or_insert_with(|| HandleManager::new(kind));
        let handle = manager.allocate(&mut self.graph, request)?;

        if kind.capabilities().supports_pooling {
            let parents_active = self
                .graph
                .parents_of(&handle.key())
                .iter()
                .all(|parent| self.get(*parent).is_some_and(|p| p.is_active()));
            if parents_active {
                self.take_from_pool(&handle);
            }
        }

        log_handle_operation(
            "allocate",
            Some(&self.id.to_string()),
            &handle.key().to_string(),
            &handle.status().to_string(),
            None,
        );
        Ok(handle)
    }

    pub fn remove(&mut self, key: HandleKey) -> Result<Arc<Handle>> {
        let manager = self
            .managers
            .get_mut(&key.kind)
            .ok_or_else(|| PhosError::not_found(format!("handle {key}")))?;
        let handle = manager.remove(&mut self.graph, key.id)?;
        log_handle_operation(
            "remove",
            Some(&self.id.to_string()),
            &key.to_string(),
            &handle.status().to_string(),
            None,
        );
        Ok(handle)
    }

    pub fn mark_modified(&mut self, key: HandleKey) -> Result<()> {
        self.managers
            .get_mut(&key.kind)
            .ok_or_else(|| PhosError::not_found(format!("handle {key}")))?
            .mark_modified(key.id)
    }

    /// Parent handles of `key` in recorded order; removed parents are skipped
    pub fn parents_of(&self, key: HandleKey) -> Vec<Arc<Handle>> {
        self.graph
            .parents_of(&key)
            .iter()
            .filter_map(|parent| self.get(*parent))
            .collect()
    }

    /// Materialize a Pending handle, preferring an idle pooled resource
    pub fn restore_handle(&mut self, key: HandleKey, device: &dyn DeviceRuntime) -> Result<()> {
        let handle = self
            .get(key)
            .ok_or_else(|| PhosError::not_found(format!("handle {key}")))?;
        let parents = self.parents_of(key);
        if parents.len() < self.graph.parents_of(&key).len() {
            return Err(PhosError::not_found(format!("removed parent of {key}")));
        }

        if parents.iter().all(|parent| parent.is_active()) && self.take_from_pool(&handle) {
            return Ok(());
        }
        restore::restore(&handle, &parents, device)
    }

    /// Bind `handle` to an idle pooled resource; false when none was taken
    fn take_from_pool(&mut self, handle: &Handle) -> bool {
        let Some(manager) = self.managers.get_mut(&handle.kind()) else {
            return false;
        };
        match manager.try_restore_from_pool(handle) {
            Ok(PoolOutcome::Restored) => {
                debug!(handle = %handle.key(), pooled = manager.pooled_count(), "restored from pool");
                true
            }
            Ok(PoolOutcome::NotAvailable) => false,
            Err(err) => {
                warn!(handle = %handle.key(), error = %err, "pooled restore refused");
                false
            }
        }
    }

    /// Restore `key` and write its most recent captured bytes back to the device
    pub fn restore_from_checkpoint(&mut self, key: HandleKey, device: &dyn DeviceRuntime) -> Result<()> {
        let handle = self
            .get(key)
            .ok_or_else(|| PhosError::not_found(format!("handle {key}")))?;
        if !handle.is_active() {
            self.restore_handle(key, device)?;
        }
        if key.kind.capabilities().capture != CaptureStrategy::Materialize {
            return Ok(());
        }

        let bytes = {
            let bag = handle.checkpoint_bag();
            let slot = bag
                .latest()
                .ok_or_else(|| PhosError::not_found(format!("checkpoint of {key}")))?;
            slot.data().to_vec()
        };
        restore::write_back(&handle, &bytes, device)?;
        log_handle_operation(
            "restore_from_checkpoint",
            Some(&self.id.to_string()),
            &key.to_string(),
            &handle.status().to_string(),
            None,
        );
        Ok(())
    }

    /// Persist the latest captured state of every stateful handle, returning how many
    pub fn persist_latest(&self, store: &dyn CheckpointStore) -> Result<usize> {
        let mut persisted = 0;
        for handle in self.stateful_handles() {
            let key = handle.key();
            let (version, data) = {
                let bag = handle.checkpoint_bag();
                match (bag.latest(), bag.latest_marker()) {
                    (Some(slot), _) => (slot.version(), slot.data().to_vec()),
                    (None, Some(marker)) => (marker, Vec::new()),
                    (None, None) => continue,
                }
            };
            let record = handle.record(version, self.graph.parents_of(&key).to_vec());
            store.persist(self.id, &record, &data)?;
            persisted += 1;
        }
        Ok(persisted)
    }

    /// Every handle of every stateful kind, in kind then id order
    pub fn stateful_handles(&self) -> Vec<Arc<Handle>> {
        self.managers
            .values()
            .filter(|manager| manager.kind().is_stateful())
            .flat_map(|manager| manager.handles().cloned())
            .collect()
    }

    pub fn stateful_handle_count(&self) -> usize {
        self.managers
            .values()
            .filter(|manager| manager.kind().is_stateful())
            .map(HandleManager::len)
            .sum()
    }

    /// Modified handles of stateful kinds; every modified set is cleared
    pub fn take_modified_handles(&mut self) -> Vec<Arc<Handle>> {
        let mut modified = Vec::new();
        for manager in self.managers.values_mut() {
            if manager.kind().is_stateful() {
                modified.extend(manager.get_modified_handles());
            }
            manager.clear_modified_handles();
        }
        modified
    }

    /// Append `op` to the log and run any capture the worker has caught up with
    pub fn launch_op(&mut self, op: Operation, device: &dyn DeviceRuntime) -> u64 {
        let version = self.dag.launch_op(op);
        self.capture_settled(device);
        version
    }

    /// Run queued checkpoint captures whose earlier forwarded ops have completed
    ///
    /// Handles a capture deferred or failed on go back into their modified set, so the
    /// next incremental checkpoint lists them again. Returns the captured versions.
    pub fn capture_settled(&mut self, device: &dyn DeviceRuntime) -> Vec<u64> {
        let captured = self.dag.capture_settled(device);
        let missed: Vec<HandleKey> = captured
            .iter()
            .filter_map(|version| self.dag.get(*version)?.outcome())
            .flat_map(|outcome| outcome.missed())
            .collect();
        for key in missed {
            let requeued = self
                .managers
                .get_mut(&key.kind)
                .is_some_and(|manager| manager.requeue_modified(key.id));
            if !requeued {
                debug!(handle = %key, "missed handle already removed");
            }
        }
        captured
    }

    pub fn has_pending_capture(&self) -> bool {
        self.dag.has_pending_capture()
    }

    /// Completion tracker the worker side reports executed versions to
    pub fn worker_progress(&self) -> Arc<WorkerProgress> {
        self.dag.progress()
    }

    pub fn is_time_for_ckpt(&self, now: Instant) -> bool {
        self.policy.is_enabled() && self.timer.is_due(now)
    }

    pub fn reset_ckpt_timer(&mut self, now: Instant) {
        self.timer.reset(now);
    }
}
