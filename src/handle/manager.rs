//! # Handle Manager
//!
//! A typed pool of handles of one [`ResourceKind`] for one client. Owns allocation,
//! pooled reuse of pre-created device resources and the *modified set* that drives
//! incremental checkpointing.
//!
//! Only the parser thread owning the client mutates a manager.

use super::capabilities::ResourceKind;
use super::graph::HandleGraph;
use super::restore;
use super::{Handle, HandleExtra, HandleKey};
use crate::constants::HandleStatus;
use crate::device::DeviceRuntime;
use crate::error::{PhosError, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parent handles offered to an allocation, grouped by kind
pub type RelatedHandles = BTreeMap<ResourceKind, Vec<Arc<Handle>>>;

const CLIENT_ADDR_ALIGN: u64 = 256;
/// Width of the mocked client address range of one kind
const CLIENT_ADDR_RANGE: u64 = 1 << 40;

/// Arguments of [`HandleManager::allocate`]
#[derive(Debug, Clone, Default)]
pub struct AllocationRequest {
    pub related: RelatedHandles,
    pub size: u64,
    /// Client address the new handle must take instead of a generated one
    pub expected_addr: Option<u64>,
    pub state_size: u64,
    pub extra: HandleExtra,
}

impl AllocationRequest {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_parents(mut self, kind: ResourceKind, parents: Vec<Arc<Handle>>) -> Self {
        self.related.insert(kind, parents);
        self
    }

    pub fn with_related(mut self, related: RelatedHandles) -> Self {
        self.related = related;
        self
    }

    pub fn at_addr(mut self, addr: u64) -> Self {
        self.expected_addr = Some(addr);
        self
    }

    pub fn with_state_size(mut self, state_size: u64) -> Self {
        self.state_size = state_size;
        self
    }

    pub fn with_extra(mut self, extra: HandleExtra) -> Self {
        self.extra = extra;
        self
    }
}

/// Result of trying to satisfy a restore from the idle pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    Restored,
    /// Pool empty or pooling unsupported; caller restores from scratch
    NotAvailable,
}

#[derive(Debug)]
pub struct HandleManager {
    kind: ResourceKind,
    handles: BTreeMap<u64, Arc<Handle>>,
    /// client address -> handle id
    by_client_addr: BTreeMap<u64, u64>,
    next_id: u64,
    next_client_addr: u64,
    modified: BTreeSet<u64>,
    latest_used: Option<u64>,
    default_handle: Option<u64>,
    /// Server addresses of pre-created device resources
    pool: VecDeque<u64>,
}

impl HandleManager {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            handles: BTreeMap::new(),
            by_client_addr: BTreeMap::new(),
            next_id: 0,
            next_client_addr: kind.client_addr_base(),
            modified: BTreeSet::new(),
            latest_used: None,
            default_handle: None,
            pool: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// One-time bootstrap; kinds with an implicit default allocate it here
    pub fn init(&mut self, graph: &mut HandleGraph, related: RelatedHandles) -> Result<()> {
        let caps = self.kind.capabilities();
        if !caps.has_default_handle || self.default_handle.is_some() {
            return Ok(());
        }

        let handle = self.allocate(
            graph,
            AllocationRequest::new(std::mem::size_of::<u64>() as u64)
                .with_related(related)
                .at_addr(0),
        )?;
        self.latest_used = Some(handle.id());
        self.default_handle = Some(handle.id());

        info!(
            resource = %self.kind,
            handle_id = handle.id(),
            "🧩 HANDLE_MANAGER: default handle allocated"
        );
        Ok(())
    }

    /// Create a new Pending handle after validating its parents
    ///
    /// A failed allocation leaves the owned set untouched.
    pub fn allocate(
        &mut self,
        graph: &mut HandleGraph,
        request: AllocationRequest,
    ) -> Result<Arc<Handle>> {
        let parents = self.validate_parents(&request)?;
        self.validate_extra(&request.extra)?;

        let client_addr = match request.expected_addr {
            Some(addr) => {
                if self.by_client_addr.contains_key(&addr) {
                    return Err(PhosError::precondition(format!(
                        "{} client address {addr:#x} already in use",
                        self.kind
                    )));
                }
                addr
            }
            None => self.reserve_client_range(request.size)?,
        };

        let key = HandleKey::new(self.kind, self.next_id);
        self.next_id += 1;

        let handle = Arc::new(Handle::new(
            key,
            client_addr,
            request.size,
            request.state_size,
            request.extra,
        ));

        graph.insert(key, parents);
        self.by_client_addr.insert(client_addr, key.id);
        self.handles.insert(key.id, Arc::clone(&handle));

        debug!(
            handle = %key,
            client_addr = format_args!("{client_addr:#x}"),
            size = request.size,
            "mocked handle allocated"
        );
        Ok(handle)
    }

    /// Claim the next aligned client range of `size` bytes in this kind's address window
    fn reserve_client_range(&mut self, size: u64) -> Result<u64> {
        let addr = self.next_client_addr;
        let limit = self.kind.client_addr_base() + CLIENT_ADDR_RANGE;
        let next = size
            .max(1)
            .checked_next_multiple_of(CLIENT_ADDR_ALIGN)
            .and_then(|span| addr.checked_add(span))
            .filter(|next| *next <= limit)
            .ok_or_else(|| {
                PhosError::precondition(format!(
                    "{} allocation of {size} bytes exceeds the client address range",
                    self.kind
                ))
            })?;
        self.next_client_addr = next;
        Ok(addr)
    }

    fn validate_parents(&self, request: &AllocationRequest) -> Result<Vec<HandleKey>> {
        let mut parent_keys = Vec::new();
        for requirement in self.kind.capabilities().required_parents {
            let offered = request
                .related
                .get(&requirement.kind)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            if offered.is_empty() {
                return Err(PhosError::precondition(format!(
                    "{} allocation requires a {} parent",
                    self.kind, requirement.kind
                )));
            }
            if !requirement.arity.accepts(offered.len()) {
                return Err(PhosError::precondition(format!(
                    "{} allocation expects {:?} {} parent, got {}",
                    self.kind,
                    requirement.arity,
                    requirement.kind,
                    offered.len()
                )));
            }
            for parent in offered {
                if parent.kind() != requirement.kind {
                    return Err(PhosError::precondition(format!(
                        "handle {} offered as a {} parent",
                        parent.key(),
                        requirement.kind
                    )));
                }
                if requirement.require_active && !parent.is_active() {
                    return Err(PhosError::precondition(format!(
                        "{} parent {} is {}, not active",
                        self.kind,
                        parent.key(),
                        parent.status()
                    )));
                }
                parent_keys.push(parent.key());
            }
        }
        Ok(parent_keys)
    }

    fn validate_extra(&self, extra: &HandleExtra) -> Result<()> {
        match (self.kind, extra) {
            (ResourceKind::Var, HandleExtra::Var { global_name }) if !global_name.is_empty() => {
                Ok(())
            }
            (ResourceKind::Var, _) => Err(PhosError::precondition(
                "var allocation requires a global symbol name",
            )),
            (ResourceKind::Module, HandleExtra::Module { .. }) => Ok(()),
            (ResourceKind::Module, _) => Err(PhosError::precondition(
                "module allocation requires a module image",
            )),
            _ => Ok(()),
        }
    }

    /// Pre-create `amount` device resources for later pooled restores
    ///
    /// A no-op for kinds without pooling support. Returns how many were added.
    pub fn preserve_pooled(&mut self, amount: usize, device: &dyn DeviceRuntime) -> Result<usize> {
        if !self.kind.capabilities().supports_pooling {
            return Ok(0);
        }
        for _ in 0..amount {
            let server_addr = restore::create_pooled(self.kind, device)?;
            self.pool.push_back(server_addr);
        }
        debug!(resource = %self.kind, amount, pooled = self.pool.len(), "pool replenished");
        Ok(amount)
    }

    /// Bind `handle` to a pooled device resource if one is idle
    pub fn try_restore_from_pool(&mut self, handle: &Handle) -> Result<PoolOutcome> {
        if handle.kind() != self.kind {
            return Err(PhosError::precondition(format!(
                "handle {} restored through the {} pool",
                handle.key(),
                self.kind
            )));
        }
        if !self.kind.capabilities().supports_pooling {
            return Ok(PoolOutcome::NotAvailable);
        }
        let Some(server_addr) = self.pool.pop_front() else {
            return Ok(PoolOutcome::NotAvailable);
        };
        if let Err(err) = handle.activate(server_addr) {
            self.pool.push_front(server_addr);
            return Err(err);
        }
        Ok(PoolOutcome::Restored)
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    /// Record a mutation of handle `id` for the next incremental checkpoint
    pub fn mark_modified(&mut self, id: u64) -> Result<()> {
        let handle = self
            .handles
            .get(&id)
            .ok_or_else(|| PhosError::not_found(format!("{} handle {id}", self.kind)))?;
        handle.bump_version();
        self.modified.insert(id);
        self.latest_used = Some(id);
        Ok(())
    }

    /// Put handle `id` back in the modified set without counting a new mutation
    ///
    /// Returns false when the handle is no longer owned.
    pub fn requeue_modified(&mut self, id: u64) -> bool {
        if !self.handles.contains_key(&id) {
            return false;
        }
        self.modified.insert(id);
        true
    }

    pub fn get_modified_handles(&self) -> Vec<Arc<Handle>> {
        self.modified
            .iter()
            .filter_map(|id| self.handles.get(id).cloned())
            .collect()
    }

    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }

    pub fn clear_modified_handles(&mut self) {
        self.modified.clear();
    }

    /// Delete handle `id` from the owned set
    pub fn remove(&mut self, graph: &mut HandleGraph, id: u64) -> Result<Arc<Handle>> {
        let handle = self
            .handles
            .remove(&id)
            .ok_or_else(|| PhosError::not_found(format!("{} handle {id}", self.kind)))?;

        if let Err(err) = handle.mark_status(HandleStatus::Deleted) {
            warn!(handle = %handle.key(), error = %err, "deleting handle in unexpected state");
        }
        self.by_client_addr.remove(&handle.client_addr());
        self.modified.remove(&id);
        if self.default_handle == Some(id) {
            self.default_handle = None;
        }
        if self.latest_used == Some(id) {
            self.latest_used = self.default_handle;
        }
        graph.remove(&handle.key());
        Ok(handle)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Handle>> {
        self.handles.get(&id).cloned()
    }

    /// Resolve a client address to the handle covering it, with the offset into it
    pub fn find_by_client_addr(&self, addr: u64) -> Option<(Arc<Handle>, u64)> {
        let (_, id) = self.by_client_addr.range(..=addr).next_back()?;
        let handle = self.handles.get(id)?;
        handle
            .contains_client_addr(addr)
            .then(|| (Arc::clone(handle), addr - handle.client_addr()))
    }

    pub fn handles(&self) -> impl Iterator<Item = &Arc<Handle>> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn latest_used(&self) -> Option<Arc<Handle>> {
        self.latest_used.and_then(|id| self.get(id))
    }

    pub fn default_handle(&self) -> Option<Arc<Handle>> {
        self.default_handle.and_then(|id| self.get(id))
    }

    pub fn touch(&mut self, id: u64) {
        if self.handles.contains_key(&id) {
            self.latest_used = Some(id);
        }
    }
}
