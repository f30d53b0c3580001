//! # Virtualized Resource Handles
//!
//! A [`Handle`] is the parser-side stand-in for one device resource. Clients only ever
//! see its *client address*; the *server address* of the real resource is bound once the
//! handle is restored and becomes Active.
//!
//! ## Concurrency
//!
//! Handles are shared as `Arc<Handle>` between the parser thread that owns the client and
//! the worker thread. The worker's only write is activation, which goes through the same
//! locked status/address path as every parser-side status change.
//!
//! ## Module Organization
//!
//! - [`capabilities`] - per-kind parent arity, pooling and capture strategy
//! - [`manager`] - typed handle pools with modified-set tracking
//! - [`graph`] - non-owning parent/child side table
//! - [`restore`] - per-kind materialization of Pending handles

pub mod capabilities;
pub mod graph;
pub mod manager;
pub mod restore;

pub use capabilities::{
    CaptureStrategy, ParentArity, ParentRequirement, ResourceCapabilities, ResourceKind,
};
pub use graph::HandleGraph;
pub use manager::{AllocationRequest, HandleManager, PoolOutcome, RelatedHandles};

use crate::checkpoint::CheckpointBag;
use crate::constants::HandleStatus;
use crate::error::{PhosError, Result};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a handle within one client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleKey {
    pub kind: ResourceKind,
    pub id: u64,
}

impl HandleKey {
    pub fn new(kind: ResourceKind, id: u64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Resource-kind-specific payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandleExtra {
    #[default]
    None,
    /// Device variable resolved by symbol name inside its parent module
    Var { global_name: String },
    /// Module image used to reload the module on restore
    Module { image: Arc<[u8]> },
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    status: HandleStatus,
    server_addr: u64,
}

/// One virtualized device resource
#[derive(Debug)]
pub struct Handle {
    key: HandleKey,
    client_addr: u64,
    size: u64,
    state_size: u64,
    extra: HandleExtra,
    binding: RwLock<Binding>,
    version: AtomicU64,
    ckpt_bag: Mutex<CheckpointBag>,
}

impl Handle {
    /// New mocked handle in `Pending` state
    pub(crate) fn new(
        key: HandleKey,
        client_addr: u64,
        size: u64,
        state_size: u64,
        extra: HandleExtra,
    ) -> Self {
        let capture = key.kind.capabilities().capture;
        Self {
            key,
            client_addr,
            size,
            state_size,
            extra,
            binding: RwLock::new(Binding {
                status: HandleStatus::Pending,
                server_addr: 0,
            }),
            version: AtomicU64::new(0),
            ckpt_bag: Mutex::new(CheckpointBag::new(capture, state_size)),
        }
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    pub fn id(&self) -> u64 {
        self.key.id
    }

    pub fn client_addr(&self) -> u64 {
        self.client_addr
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size of the serialized device state captured by a checkpoint
    pub fn state_size(&self) -> u64 {
        self.state_size
    }

    pub fn extra(&self) -> &HandleExtra {
        &self.extra
    }

    pub fn global_name(&self) -> Option<&str> {
        match &self.extra {
            HandleExtra::Var { global_name } => Some(global_name),
            _ => None,
        }
    }

    pub fn module_image(&self) -> Option<&[u8]> {
        match &self.extra {
            HandleExtra::Module { image } => Some(image),
            _ => None,
        }
    }

    pub fn status(&self) -> HandleStatus {
        self.binding.read().status
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Real device address; only meaningful while Active
    pub fn server_addr(&self) -> Option<u64> {
        let binding = self.binding.read();
        binding.status.is_active().then_some(binding.server_addr)
    }

    /// Whether `addr` falls inside this handle's client address range
    pub fn contains_client_addr(&self, addr: u64) -> bool {
        addr >= self.client_addr && addr - self.client_addr < self.size.max(1)
    }

    pub fn mark_status(&self, next: HandleStatus) -> Result<()> {
        let mut binding = self.binding.write();
        Self::transition(&self.key, &mut binding, next)
    }

    /// Bind the real device address and flip to Active
    ///
    /// Used by restore on the parser side and by the worker after device-side creation.
    pub fn activate(&self, server_addr: u64) -> Result<()> {
        let mut binding = self.binding.write();
        Self::transition(&self.key, &mut binding, HandleStatus::Active)?;
        binding.server_addr = server_addr;
        Ok(())
    }

    fn transition(key: &HandleKey, binding: &mut Binding, next: HandleStatus) -> Result<()> {
        if !binding.status.can_transition_to(next) {
            return Err(PhosError::InvalidStateTransition(format!(
                "handle {key}: {} -> {next}",
                binding.status
            )));
        }
        binding.status = next;
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Advance the version counter after a mutation, returning the new version
    pub(crate) fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn checkpoint_bag(&self) -> MutexGuard<'_, CheckpointBag> {
        self.ckpt_bag.lock()
    }

    /// Metadata describing this handle at a checkpoint version
    pub fn record(&self, version: u64, parents: Vec<HandleKey>) -> HandleRecord {
        HandleRecord {
            key: self.key,
            version,
            status: self.status(),
            client_addr: self.client_addr,
            size: self.size,
            state_size: self.state_size,
            global_name: self.global_name().map(str::to_string),
            parents,
        }
    }
}

/// Serializable description of a handle, persisted next to its captured bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    pub key: HandleKey,
    pub version: u64,
    pub status: HandleStatus,
    pub client_addr: u64,
    pub size: u64,
    pub state_size: u64,
    pub global_name: Option<String>,
    pub parents: Vec<HandleKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: u64) -> Handle {
        Handle::new(
            HandleKey::new(ResourceKind::Stream, id),
            0x1000,
            8,
            0,
            HandleExtra::None,
        )
    }

    #[test]
    fn test_server_addr_only_visible_when_active() {
        let handle = stream(0);
        assert_eq!(handle.status(), HandleStatus::Pending);
        assert_eq!(handle.server_addr(), None);

        handle.activate(0xdead_0000).unwrap();
        assert_eq!(handle.server_addr(), Some(0xdead_0000));

        handle.mark_status(HandleStatus::Deleted).unwrap();
        assert_eq!(handle.server_addr(), None);
    }

    #[test]
    fn test_rebinding_an_active_handle_is_refused() {
        let handle = stream(1);
        handle.activate(0x10).unwrap();
        let err = handle.activate(0x20).unwrap_err();
        assert!(matches!(err, PhosError::InvalidStateTransition(_)));
        assert_eq!(handle.server_addr(), Some(0x10));
    }

    #[test]
    fn test_activation_from_another_thread() {
        let handle = Arc::new(stream(2));
        let worker_side = Arc::clone(&handle);
        std::thread::spawn(move || worker_side.activate(0x42).unwrap())
            .join()
            .unwrap();
        assert!(handle.is_active());
        assert_eq!(handle.server_addr(), Some(0x42));
    }

    #[test]
    fn test_client_addr_range() {
        let handle = stream(3);
        assert!(handle.contains_client_addr(0x1000));
        assert!(handle.contains_client_addr(0x1007));
        assert!(!handle.contains_client_addr(0x1008));

        let huge = Handle::new(
            HandleKey::new(ResourceKind::Memory, 1),
            u64::MAX - 4,
            u64::MAX,
            0,
            HandleExtra::None,
        );
        assert!(huge.contains_client_addr(u64::MAX));
        assert!(!huge.contains_client_addr(0));
    }
}
