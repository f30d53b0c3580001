//! Host-memory device used for dry runs and tests.
//!
//! Every resource is an entry in a table keyed by a monotonically assigned address;
//! module images carry their symbol tables, registered up front with
//! [`InMemoryDevice::register_module_image`].

use super::{DeviceError, DeviceResult, DeviceRuntime};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

// Codes mirror the CUDA driver error space
const ERROR_INVALID_VALUE: i32 = 1;
const ERROR_MEMORY_ALLOCATION: i32 = 2;
const ERROR_INVALID_HANDLE: i32 = 400;
const ERROR_NOT_FOUND: i32 = 500;
const ERROR_UNKNOWN: i32 = 999;

/// Largest single buffer the host-backed device will hold
const MAX_ALLOCATION: u64 = 1 << 32;

const ADDRESS_BASE: u64 = 0x7f00_0000_0000;
const ADDRESS_ALIGN: u64 = 256;

#[derive(Debug, Default)]
struct DeviceTables {
    next_addr: u64,
    contexts: Vec<u64>,
    streams: Vec<u64>,
    /// module address -> image key
    modules: HashMap<u64, Vec<u8>>,
    /// image -> symbols (name, size)
    images: HashMap<Vec<u8>, Vec<(String, u64)>>,
    /// (module address, symbol) -> global address
    globals: HashMap<(u64, String), u64>,
    memory: HashMap<u64, Vec<u8>>,
    /// call name -> error code for the next invocation of that call
    injected_failures: HashMap<&'static str, i32>,
}

/// Device runtime backed entirely by host memory
#[derive(Debug)]
pub struct InMemoryDevice {
    tables: Mutex<DeviceTables>,
}

impl Default for InMemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDevice {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(DeviceTables {
                next_addr: ADDRESS_BASE,
                ..DeviceTables::default()
            }),
        }
    }

    /// Declare the global symbols a module image defines
    pub fn register_module_image(&self, image: &[u8], symbols: &[(&str, u64)]) {
        let mut tables = self.tables.lock();
        tables.images.insert(
            image.to_vec(),
            symbols
                .iter()
                .map(|(name, size)| (name.to_string(), *size))
                .collect(),
        );
    }

    /// Make the next call named `call` fail with `code`
    pub fn fail_next(&self, call: &'static str, code: i32) {
        self.tables.lock().injected_failures.insert(call, code);
    }

    pub fn stream_count(&self) -> usize {
        self.tables.lock().streams.len()
    }

    pub fn context_count(&self) -> usize {
        self.tables.lock().contexts.len()
    }

    fn check_injected(tables: &mut DeviceTables, call: &'static str) -> DeviceResult<()> {
        match tables.injected_failures.remove(call) {
            Some(code) => Err(DeviceError::new(call, code)),
            None => Ok(()),
        }
    }

    fn bump(tables: &mut DeviceTables, api: &'static str, size: u64) -> DeviceResult<u64> {
        let addr = tables.next_addr;
        let next = size
            .max(1)
            .checked_next_multiple_of(ADDRESS_ALIGN)
            .and_then(|span| addr.checked_add(span))
            .ok_or(DeviceError::new(api, ERROR_MEMORY_ALLOCATION))?;
        tables.next_addr = next;
        Ok(addr)
    }
}

impl DeviceRuntime for InMemoryDevice {
    fn create_context(&self) -> DeviceResult<u64> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cuCtxCreate")?;
        let addr = Self::bump(&mut tables, "cuCtxCreate", 1)?;
        tables.contexts.push(addr);
        debug!(addr = format_args!("{addr:#x}"), "context created");
        Ok(addr)
    }

    fn create_stream(&self) -> DeviceResult<u64> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cudaStreamCreate")?;
        let addr = Self::bump(&mut tables, "cudaStreamCreate", 1)?;
        tables.streams.push(addr);
        Ok(addr)
    }

    fn load_module(&self, image: &[u8]) -> DeviceResult<u64> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cuModuleLoadData")?;
        if !tables.images.contains_key(image) {
            return Err(DeviceError::new("cuModuleLoadData", ERROR_INVALID_VALUE));
        }
        let addr = Self::bump(&mut tables, "cuModuleLoadData", 1)?;
        tables.modules.insert(addr, image.to_vec());
        Ok(addr)
    }

    fn module_get_global(&self, module: u64, name: &str) -> DeviceResult<(u64, u64)> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cuModuleGetGlobal")?;
        let image = tables
            .modules
            .get(&module)
            .cloned()
            .ok_or(DeviceError::new("cuModuleGetGlobal", ERROR_INVALID_HANDLE))?;
        let size = tables
            .images
            .get(&image)
            .and_then(|symbols| symbols.iter().find(|(sym, _)| sym == name))
            .map(|(_, size)| *size)
            .ok_or(DeviceError::new("cuModuleGetGlobal", ERROR_NOT_FOUND))?;

        if let Some(addr) = tables.globals.get(&(module, name.to_string())) {
            return Ok((*addr, size));
        }
        let addr = Self::bump(&mut tables, "cuModuleGetGlobal", size)?;
        tables.memory.insert(addr, vec![0u8; size as usize]);
        tables.globals.insert((module, name.to_string()), addr);
        Ok((addr, size))
    }

    fn malloc(&self, size: u64) -> DeviceResult<u64> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cudaMalloc")?;
        if size == 0 {
            return Err(DeviceError::new("cudaMalloc", ERROR_INVALID_VALUE));
        }
        if size > MAX_ALLOCATION {
            return Err(DeviceError::new("cudaMalloc", ERROR_MEMORY_ALLOCATION));
        }
        let addr = Self::bump(&mut tables, "cudaMalloc", size)?;
        tables.memory.insert(addr, vec![0u8; size as usize]);
        Ok(addr)
    }

    fn read_memory(&self, addr: u64, size: u64) -> DeviceResult<Vec<u8>> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cudaMemcpyDtoH")?;
        let buffer = tables
            .memory
            .get(&addr)
            .ok_or(DeviceError::new("cudaMemcpyDtoH", ERROR_INVALID_VALUE))?;
        if size as usize > buffer.len() {
            return Err(DeviceError::new("cudaMemcpyDtoH", ERROR_INVALID_VALUE));
        }
        Ok(buffer[..size as usize].to_vec())
    }

    fn write_memory(&self, addr: u64, data: &[u8]) -> DeviceResult<()> {
        let mut tables = self.tables.lock();
        Self::check_injected(&mut tables, "cudaMemcpyHtoD")?;
        let buffer = tables
            .memory
            .get_mut(&addr)
            .ok_or(DeviceError::new("cudaMemcpyHtoD", ERROR_UNKNOWN))?;
        if data.len() > buffer.len() {
            return Err(DeviceError::new("cudaMemcpyHtoD", ERROR_INVALID_VALUE));
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }
}
