//! Fixture APIs and parsing functions standing in for the generated tables.

use phos_core::api::{ApiMeta, ApiRegistry, ApiRequest};
use phos_core::config::{CheckpointPolicy, PhosConfig};
use phos_core::constants::{ApiExecuteStatus, ApiFamily, ApiType};
use phos_core::device::InMemoryDevice;
use phos_core::handle::{AllocationRequest, HandleExtra, ResourceKind};
use phos_core::parser::{ParserFn, ParserRegistry};
use phos_core::workspace::Workspace;
use phos_core::{Client, PhosError, Result};
use std::sync::Arc;

pub const STREAM_CREATE: u64 = 1;
pub const MALLOC: u64 = 2;
pub const FREE: u64 = 3;
pub const MODULE_LOAD: u64 = 4;
pub const REGISTER_VAR: u64 = 5;
pub const MEMCPY_TO_SYMBOL: u64 = 6;
pub const MEMCPY_H2D: u64 = 7;
pub const GET_DEVICE_COUNT: u64 = 8;
/// Known API whose parsing function is deliberately never registered
pub const UNWIRED: u64 = 9;

pub const MODULE_IMAGE: &[u8] = b"fatbin:W";
pub const GLOBAL_NAME: &str = "W";
pub const GLOBAL_SIZE: u64 = 16;

pub fn api_registry() -> ApiRegistry {
    ApiRegistry::from_metas([
        ApiMeta::new(STREAM_CREATE, "cudaStreamCreate", ApiType::CreateResource, ApiFamily::CudaRuntime),
        ApiMeta::new(MALLOC, "cudaMalloc", ApiType::CreateResource, ApiFamily::CudaRuntime),
        ApiMeta::new(FREE, "cudaFree", ApiType::DeleteResource, ApiFamily::CudaRuntime),
        ApiMeta::new(MODULE_LOAD, "cuModuleLoadData", ApiType::CreateResource, ApiFamily::CudaDriver),
        ApiMeta::new(REGISTER_VAR, "__cudaRegisterVar", ApiType::CreateResource, ApiFamily::CudaDriver),
        ApiMeta::new(MEMCPY_TO_SYMBOL, "cudaMemcpyToSymbol", ApiType::SetResource, ApiFamily::CudaRuntime),
        ApiMeta::new(MEMCPY_H2D, "cudaMemcpyH2D", ApiType::SetResource, ApiFamily::CudaRuntime),
        ApiMeta::new(GET_DEVICE_COUNT, "cudaGetDeviceCount", ApiType::GetResource, ApiFamily::CudaRuntime),
        ApiMeta::new(UNWIRED, "cublasCreate", ApiType::CreateResource, ApiFamily::CuBlas),
    ])
}

pub fn parser_registry() -> ParserRegistry {
    let registrations: [(u64, ParserFn); 8] = [
        (STREAM_CREATE, parse_stream_create),
        (MALLOC, parse_malloc),
        (FREE, parse_free),
        (MODULE_LOAD, parse_module_load),
        (REGISTER_VAR, parse_register_var),
        (MEMCPY_TO_SYMBOL, parse_memcpy_to_symbol),
        (MEMCPY_H2D, parse_memcpy_h2d),
        (GET_DEVICE_COUNT, parse_get_device_count),
    ];
    ParserRegistry::from_registrations(registrations)
}

pub fn test_config(policy: CheckpointPolicy, interval_ms: u64) -> PhosConfig {
    let mut config = PhosConfig::default();
    config.checkpoint.policy = policy;
    config.checkpoint.interval_ms = interval_ms;
    config
}

/// Device with the fixture module image registered
pub fn device() -> Arc<InMemoryDevice> {
    let device = Arc::new(InMemoryDevice::new());
    device.register_module_image(MODULE_IMAGE, &[(GLOBAL_NAME, GLOBAL_SIZE)]);
    device
}

pub fn workspace(config: PhosConfig, device: Arc<InMemoryDevice>) -> Arc<Workspace> {
    Workspace::new(config, api_registry(), parser_registry(), device).unwrap()
}

/// Initialized client outside of any pipeline
pub fn client(device: &InMemoryDevice) -> Client {
    let mut client = Client::new(4242, &PhosConfig::default());
    client.init(0, device).unwrap();
    client
}

fn default_context(client: &Client) -> Result<Arc<phos_core::Handle>> {
    client
        .default_handle(ResourceKind::Context)
        .ok_or_else(|| PhosError::not_found("default context"))
}

fn parse_stream_create(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let context = default_context(client)?;
    let stream = client.allocate(
        ResourceKind::Stream,
        AllocationRequest::new(8).with_parents(ResourceKind::Context, vec![Arc::clone(&context)]),
    )?;
    request.set_ret_u64(stream.client_addr());
    request.record_handle(stream);
    request.record_parent(context);
    Ok(())
}

fn parse_malloc(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let size = request.param_u64(0)?;
    if size == 0 {
        return Err(PhosError::precondition("zero-sized allocation"));
    }
    let context = default_context(client)?;
    let buffer = client.allocate(
        ResourceKind::Memory,
        AllocationRequest::new(size)
            .with_state_size(size)
            .with_parents(ResourceKind::Context, vec![Arc::clone(&context)]),
    )?;
    request.set_ret_u64(buffer.client_addr());
    request.record_handle(buffer);
    request.record_parent(context);
    Ok(())
}

fn parse_free(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let addr = request.param_u64(0)?;
    let (buffer, offset) = client
        .find_by_client_addr(ResourceKind::Memory, addr)
        .ok_or_else(|| PhosError::not_found(format!("buffer at {addr:#x}")))?;
    if offset != 0 {
        return Err(PhosError::precondition("free of an interior pointer"));
    }
    let removed = client.remove(buffer.key())?;
    request.record_handle(removed);
    Ok(())
}

fn parse_module_load(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let image: Arc<[u8]> = Arc::from(request.param(0)?);
    let context = default_context(client)?;
    let module = client.allocate(
        ResourceKind::Module,
        AllocationRequest::new(8)
            .with_parents(ResourceKind::Context, vec![Arc::clone(&context)])
            .with_extra(HandleExtra::Module { image }),
    )?;
    request.set_ret_u64(module.client_addr());
    request.record_handle(module);
    request.record_parent(context);
    Ok(())
}

fn parse_register_var(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let module_addr = request.param_u64(0)?;
    let global_name = request.param_str(1)?.to_string();
    let size = request.param_u64(2)?;
    let (module, _) = client
        .find_by_client_addr(ResourceKind::Module, module_addr)
        .ok_or_else(|| PhosError::not_found(format!("module at {module_addr:#x}")))?;
    let var = client.allocate(
        ResourceKind::Var,
        AllocationRequest::new(size)
            .with_state_size(size)
            .with_parents(ResourceKind::Module, vec![Arc::clone(&module)])
            .with_extra(HandleExtra::Var { global_name }),
    )?;
    request.set_ret_u64(var.client_addr());
    request.record_handle(var);
    request.record_parent(module);
    Ok(())
}

fn parse_memcpy_to_symbol(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let addr = request.param_u64(0)?;
    let (var, _) = client
        .find_by_client_addr(ResourceKind::Var, addr)
        .ok_or_else(|| PhosError::not_found(format!("var at {addr:#x}")))?;
    if request.param(1)?.len() as u64 > var.size() {
        return Err(PhosError::precondition("copy larger than symbol"));
    }
    client.mark_modified(var.key())?;
    request.record_handle(var);
    Ok(())
}

fn parse_memcpy_h2d(_: &Workspace, client: &mut Client, request: &mut ApiRequest) -> Result<()> {
    let addr = request.param_u64(0)?;
    let (buffer, offset) = client
        .find_by_client_addr(ResourceKind::Memory, addr)
        .ok_or_else(|| PhosError::not_found(format!("buffer at {addr:#x}")))?;
    if offset + request.param(1)?.len() as u64 > buffer.size() {
        return Err(PhosError::precondition("copy past end of buffer"));
    }
    client.mark_modified(buffer.key())?;
    request.record_handle(buffer);
    Ok(())
}

fn parse_get_device_count(_: &Workspace, _: &mut Client, request: &mut ApiRequest) -> Result<()> {
    request.set_ret_u64(1);
    request.status = ApiExecuteStatus::ReturnWithoutWorker;
    Ok(())
}
