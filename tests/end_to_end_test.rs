//! Full client flow: module and global registration, mutation, dump and restore.

mod common;

use common::*;
use phos_core::config::CheckpointPolicy;
use phos_core::constants::{command_ids, ApiExecuteStatus, HandleStatus};
use phos_core::device::DeviceRuntime;
use phos_core::handle::ResourceKind;
use phos_core::ApiRequest;

#[test]
fn test_module_global_checkpoint_and_restore() {
    let device = device();
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(CheckpointPolicy::Incremental, 60_000);
    config.checkpoint.directory = dir.path().to_path_buf();
    let workspace = workspace(config, device.clone());
    let endpoints = workspace.handshake(7).unwrap();
    let client_id = endpoints.client_id;
    workspace.set_client_ready(client_id).unwrap();

    // Module is parsed but not yet materialized by the worker
    endpoints
        .requests
        .send(ApiRequest::new(MODULE_LOAD, client_id, 0).with_param(MODULE_IMAGE.to_vec()))
        .unwrap();
    let module_request = endpoints.worker.requests.recv_timeout(WAIT).unwrap();
    let module = module_request.handles()[0].clone();
    let module_addr = module_request.ret_u64().unwrap();
    assert_eq!(module.status(), HandleStatus::Pending);

    let register_var = |seq| {
        ApiRequest::new(REGISTER_VAR, client_id, seq)
            .with_u64(module_addr)
            .with_str(GLOBAL_NAME)
            .with_u64(GLOBAL_SIZE)
    };
    let early = call(device.as_ref(), &endpoints, register_var(1));
    assert_eq!(early.status, ApiExecuteStatus::ParseFailed);
    assert_eq!(early.return_code, 1);

    let module_reply = execute(device.as_ref(), module_request);
    assert_eq!(module_reply.return_code, 0);
    assert!(module.is_active());

    endpoints.requests.send(register_var(2)).unwrap();
    let var_request = endpoints.worker.requests.recv_timeout(WAIT).unwrap();
    let var = var_request.handles()[0].clone();
    assert_eq!(var.status(), HandleStatus::Pending);
    let var_addr = var_request.ret_u64().unwrap();

    let var_reply = execute(device.as_ref(), var_request);
    assert_eq!(var_reply.return_code, 0);
    assert!(var.is_active());
    let (global, size) = device
        .module_get_global(module.server_addr().unwrap(), GLOBAL_NAME)
        .unwrap();
    assert_eq!(var.server_addr(), Some(global));
    assert_eq!(size, GLOBAL_SIZE);

    let payload: Vec<u8> = (0..GLOBAL_SIZE as u8).collect();
    let copied = call(
        device.as_ref(),
        &endpoints,
        ApiRequest::new(MEMCPY_TO_SYMBOL, client_id, 3)
            .with_u64(var_addr)
            .with_param(payload.clone()),
    );
    assert_eq!(copied.return_code, 0);

    // Two dumps back to back: the second has nothing new to record
    for _ in 0..2 {
        assert!(endpoints.send_command(command_ids::OOB_DUMP_START));
        assert_eq!(next_completion(&endpoints).result, Ok(()));
    }

    let mut exit = workspace.teardown(client_id).unwrap();
    assert!(exit.defect.is_none());
    assert_eq!(exit.stats.checkpoints_inserted, 2);

    let checkpoints: Vec<_> = exit
        .client
        .dag()
        .ops()
        .iter()
        .filter(|op| op.is_checkpoint())
        .collect();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(
        checkpoints[0].handle_keys().collect::<Vec<_>>(),
        vec![var.key()]
    );
    assert!(checkpoints[1].handles().is_empty());
    assert_eq!(var.checkpoint_bag().latest().unwrap().data(), payload.as_slice());

    // Clobber device state, then restore it from the retained checkpoint
    device
        .write_memory(global, &vec![0; GLOBAL_SIZE as usize])
        .unwrap();
    exit.client
        .restore_from_checkpoint(var.key(), device.as_ref())
        .unwrap();
    assert_eq!(device.read_memory(global, GLOBAL_SIZE).unwrap(), payload);

    assert_eq!(
        exit.client
            .find_by_client_addr(ResourceKind::Var, var_addr)
            .map(|(handle, offset)| (handle.key(), offset)),
        Some((var.key(), 0))
    );
}

#[test]
fn test_stream_create_draws_from_pool() {
    let device = device();
    let mut config = test_config(CheckpointPolicy::Disabled, 1000);
    config.parser.pooled_handles = 1;
    let workspace = workspace(config, device.clone());
    let endpoints = workspace.handshake(8).unwrap();
    workspace.set_client_ready(endpoints.client_id).unwrap();

    // default stream plus one pooled
    assert_eq!(device.stream_count(), 2);

    let created = call(
        device.as_ref(),
        &endpoints,
        ApiRequest::new(STREAM_CREATE, endpoints.client_id, 0),
    );
    assert_eq!(created.return_code, 0);
    assert!(created.handles()[0].is_active());
    // the pooled stream was bound, none created
    assert_eq!(device.stream_count(), 2);

    // pool exhausted: the worker creates the next one
    let second = call(
        device.as_ref(),
        &endpoints,
        ApiRequest::new(STREAM_CREATE, endpoints.client_id, 1),
    );
    assert!(second.handles()[0].is_active());
    assert_eq!(device.stream_count(), 3);

    let exit = workspace.teardown(endpoints.client_id).unwrap();
    let streams = exit.client.manager(ResourceKind::Stream).unwrap();
    assert_eq!(streams.len(), 3);
    assert_eq!(streams.pooled_count(), 0);
}
