//! Per-kind restore procedures that turn a Pending handle into an Active one.

use super::capabilities::ResourceKind;
use super::Handle;
use crate::constants::HandleStatus;
use crate::device::DeviceRuntime;
use crate::error::{PhosError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Materialize `handle` on the device and flip it to Active
///
/// `parents` are the handle's parent links in recorded order. Every required parent must
/// be present and Active, otherwise the restore fails with `NotFound`.
pub fn restore(handle: &Handle, parents: &[Arc<Handle>], device: &dyn DeviceRuntime) -> Result<()> {
    if handle.status() != HandleStatus::Pending {
        return Err(PhosError::InvalidStateTransition(format!(
            "handle {} cannot be restored from {}",
            handle.key(),
            handle.status()
        )));
    }
    check_parents(handle, parents)?;

    let server_addr = match handle.kind() {
        ResourceKind::Context => device.create_context()?,
        ResourceKind::Stream => device.create_stream()?,
        ResourceKind::Module => {
            let image = handle.module_image().ok_or_else(|| {
                PhosError::precondition(format!("module {} has no image", handle.key()))
            })?;
            device.load_module(image)?
        }
        ResourceKind::Var => {
            let module = parent_of_kind(parents, ResourceKind::Module)?;
            let module_addr = module
                .server_addr()
                .ok_or_else(|| PhosError::not_found(format!("module {} not active", module.key())))?;
            let name = handle.global_name().ok_or_else(|| {
                PhosError::precondition(format!("var {} has no global name", handle.key()))
            })?;
            let (addr, size) = device.module_get_global(module_addr, name)?;
            if handle.size() != 0 && size != handle.size() {
                warn!(
                    handle = %handle.key(),
                    symbol = name,
                    expected = handle.size(),
                    actual = size,
                    "restored global has a different size than registered"
                );
            }
            addr
        }
        ResourceKind::Memory => device.malloc(handle.size())?,
    };

    handle.activate(server_addr)?;
    debug!(
        handle = %handle.key(),
        server_addr = format_args!("{server_addr:#x}"),
        "handle restored"
    );
    Ok(())
}

/// Create a blank device resource for a manager's idle pool
pub fn create_pooled(kind: ResourceKind, device: &dyn DeviceRuntime) -> Result<u64> {
    match kind {
        ResourceKind::Stream => Ok(device.create_stream()?),
        other => Err(PhosError::Unsupported(format!("pooling {other} resources"))),
    }
}

/// Write previously captured bytes back into an Active handle's device state
pub fn write_back(handle: &Handle, bytes: &[u8], device: &dyn DeviceRuntime) -> Result<()> {
    let server_addr = handle
        .server_addr()
        .ok_or_else(|| PhosError::not_found(format!("handle {} not active", handle.key())))?;
    device.write_memory(server_addr, bytes)?;
    Ok(())
}

fn check_parents(handle: &Handle, parents: &[Arc<Handle>]) -> Result<()> {
    for requirement in handle.kind().capabilities().required_parents {
        if !parents.iter().any(|p| p.kind() == requirement.kind) {
            return Err(PhosError::not_found(format!(
                "{} parent of {}",
                requirement.kind,
                handle.key()
            )));
        }
    }
    if let Some(inactive) = parents.iter().find(|p| !p.is_active()) {
        return Err(PhosError::not_found(format!(
            "active parent {} of {} (currently {})",
            inactive.key(),
            handle.key(),
            inactive.status()
        )));
    }
    Ok(())
}

fn parent_of_kind(parents: &[Arc<Handle>], kind: ResourceKind) -> Result<&Arc<Handle>> {
    parents
        .iter()
        .find(|p| p.kind() == kind)
        .ok_or_else(|| PhosError::not_found(format!("{kind} parent")))
}
