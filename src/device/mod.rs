//! # Device Runtime Binding
//!
//! The seam between the virtualization core and the real GPU runtime library. Restore
//! procedures create or look up device resources through [`DeviceRuntime`], and
//! materialize-and-persist checkpoints read device memory through it.
//!
//! Addresses are opaque 64-bit values in the *server* address space.

pub mod in_memory;

pub use in_memory::InMemoryDevice;

use crate::error::PhosError;
use thiserror::Error;

/// Failure reported by the device runtime for one call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed with code {code}")]
pub struct DeviceError {
    pub call: &'static str,
    pub code: i32,
}

impl DeviceError {
    pub fn new(call: &'static str, code: i32) -> Self {
        Self { call, code }
    }
}

impl From<DeviceError> for PhosError {
    fn from(err: DeviceError) -> Self {
        PhosError::DriverError {
            call: err.call.to_string(),
            code: err.code,
        }
    }
}

pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Resource creation, lookup and memory access on the real device
pub trait DeviceRuntime: Send + Sync {
    fn create_context(&self) -> DeviceResult<u64>;

    fn create_stream(&self) -> DeviceResult<u64>;

    /// Load a module image, returning the module address
    fn load_module(&self, image: &[u8]) -> DeviceResult<u64>;

    /// Resolve a global symbol inside a loaded module, returning `(address, size)`
    fn module_get_global(&self, module: u64, name: &str) -> DeviceResult<(u64, u64)>;

    fn malloc(&self, size: u64) -> DeviceResult<u64>;

    fn read_memory(&self, addr: u64, size: u64) -> DeviceResult<Vec<u8>>;

    fn write_memory(&self, addr: u64, data: &[u8]) -> DeviceResult<()>;
}
