//! Handle allocation, parent validation and lifecycle through a client.

mod common;

use common::*;
use phos_core::constants::HandleStatus;
use phos_core::handle::{AllocationRequest, HandleExtra, ResourceKind};
use phos_core::PhosError;
use std::sync::Arc;

#[test]
fn test_missing_parent_fails_without_changing_owned_count() {
    let device = device();
    let mut client = client(&device);
    let before = client
        .manager(ResourceKind::Memory)
        .map_or(0, |manager| manager.len());

    let err = client
        .allocate(ResourceKind::Memory, AllocationRequest::new(128))
        .unwrap_err();

    assert!(matches!(err, PhosError::PreconditionFailed(_)));
    assert_eq!(
        client.manager(ResourceKind::Memory).map_or(0, |m| m.len()),
        before
    );
}

#[test]
fn test_wrong_parent_kind_is_rejected() {
    let device = device();
    let mut client = client(&device);
    let stream = client.default_handle(ResourceKind::Stream).unwrap();

    let err = client
        .allocate(
            ResourceKind::Memory,
            AllocationRequest::new(64).with_parents(ResourceKind::Context, vec![stream]),
        )
        .unwrap_err();
    assert!(matches!(err, PhosError::PreconditionFailed(_)));
}

#[test]
fn test_stream_accepts_several_contexts() {
    let device = device();
    let mut client = client(&device);
    let first = client.default_handle(ResourceKind::Context).unwrap();
    let second = client
        .allocate(ResourceKind::Context, AllocationRequest::new(8))
        .unwrap();

    let stream = client
        .allocate(
            ResourceKind::Stream,
            AllocationRequest::new(8)
                .with_parents(ResourceKind::Context, vec![first.clone(), second.clone()]),
        )
        .unwrap();

    assert_eq!(client.graph().parents_of(&stream.key()), &[first.key(), second.key()]);
    assert!(client.graph().children_of(&second.key()).contains(&stream.key()));
}

#[test]
fn test_var_needs_active_module_and_extra() {
    let device = device();
    let mut client = client(&device);
    let context = client.default_handle(ResourceKind::Context).unwrap();
    let module = client
        .allocate(
            ResourceKind::Module,
            AllocationRequest::new(8)
                .with_parents(ResourceKind::Context, vec![context])
                .with_extra(HandleExtra::Module {
                    image: Arc::from(MODULE_IMAGE),
                }),
        )
        .unwrap();

    let var_request = || {
        AllocationRequest::new(GLOBAL_SIZE)
            .with_parents(ResourceKind::Module, vec![module.clone()])
            .with_extra(HandleExtra::Var {
                global_name: GLOBAL_NAME.to_string(),
            })
    };

    assert!(matches!(
        client.allocate(ResourceKind::Var, var_request()),
        Err(PhosError::PreconditionFailed(_))
    ));

    client.restore_handle(module.key(), device.as_ref()).unwrap();
    assert!(matches!(
        client.allocate(
            ResourceKind::Var,
            AllocationRequest::new(GLOBAL_SIZE)
                .with_parents(ResourceKind::Module, vec![module.clone()])
        ),
        Err(PhosError::PreconditionFailed(_))
    ));

    let var = client.allocate(ResourceKind::Var, var_request()).unwrap();
    assert_eq!(var.status(), HandleStatus::Pending);
    assert_eq!(var.global_name(), Some(GLOBAL_NAME));
}

#[test]
fn test_active_implies_parents_active() {
    let device = device();
    let mut client = client(&device);
    let context = client
        .allocate(ResourceKind::Context, AllocationRequest::new(8))
        .unwrap();
    let buffer = client
        .allocate(
            ResourceKind::Memory,
            AllocationRequest::new(256).with_parents(ResourceKind::Context, vec![context.clone()]),
        )
        .unwrap();

    assert!(matches!(
        client.restore_handle(buffer.key(), device.as_ref()),
        Err(PhosError::NotFound(_))
    ));
    assert!(!buffer.is_active());

    client.restore_handle(context.key(), device.as_ref()).unwrap();
    client.restore_handle(buffer.key(), device.as_ref()).unwrap();

    for manager in client.managers() {
        for handle in manager.handles().filter(|h| h.is_active()) {
            for parent in client.parents_of(handle.key()) {
                assert!(parent.is_active(), "{} active before {}", handle.key(), parent.key());
            }
        }
    }
}

#[test]
fn test_driver_failure_surfaces_and_handle_stays_pending() {
    let device = device();
    let mut client = client(&device);
    let context = client.default_handle(ResourceKind::Context).unwrap();
    let buffer = client
        .allocate(
            ResourceKind::Memory,
            AllocationRequest::new(64).with_parents(ResourceKind::Context, vec![context]),
        )
        .unwrap();

    device.fail_next("cudaMalloc", 2);
    let err = client.restore_handle(buffer.key(), device.as_ref()).unwrap_err();
    assert_eq!(
        err,
        PhosError::DriverError {
            call: "cudaMalloc".to_string(),
            code: 2
        }
    );
    assert_eq!(buffer.status(), HandleStatus::Pending);

    client.restore_handle(buffer.key(), device.as_ref()).unwrap();
    assert!(buffer.server_addr().is_some());
}

#[test]
fn test_remove_clears_modified_set_and_lookup() {
    let device = device();
    let mut client = client(&device);
    let context = client.default_handle(ResourceKind::Context).unwrap();
    let buffer = client
        .allocate(
            ResourceKind::Memory,
            AllocationRequest::new(64).with_parents(ResourceKind::Context, vec![context]),
        )
        .unwrap();
    client.mark_modified(buffer.key()).unwrap();

    client.remove(buffer.key()).unwrap();

    assert_eq!(buffer.status(), HandleStatus::Deleted);
    assert!(client.get(buffer.key()).is_none());
    assert!(client
        .find_by_client_addr(ResourceKind::Memory, buffer.client_addr())
        .is_none());
    assert_eq!(client.manager(ResourceKind::Memory).unwrap().modified_count(), 0);
}
