//! Worker-side stand-in: materializes forwarded requests on the device and replies.

use super::fixtures::*;
use phos_core::api::ApiRequest;
use phos_core::device::DeviceRuntime;
use phos_core::handle::restore;
use phos_core::transport::{ClientEndpoints, WorkerEndpoints};
use phos_core::CommandCompletion;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

/// Execute one forwarded request against the device
pub fn execute(device: &dyn DeviceRuntime, mut request: ApiRequest) -> ApiRequest {
    let result = match request.api_id {
        STREAM_CREATE | MALLOC | MODULE_LOAD | REGISTER_VAR => request
            .handles()
            .iter()
            .filter(|handle| !handle.is_active())
            .try_for_each(|handle| restore::restore(handle, request.parents(), device)),
        MEMCPY_TO_SYMBOL | MEMCPY_H2D => {
            let data = request.param(1).map(<[u8]>::to_vec);
            match (request.handles().first().and_then(|h| h.server_addr()), data) {
                (Some(addr), Ok(data)) => device.write_memory(addr, &data).map_err(Into::into),
                _ => Err(phos_core::PhosError::not_found("copy target")),
            }
        }
        _ => Ok(()),
    };
    if result.is_err() {
        request.return_code = 999;
    }
    request
}

/// Serve up to `count` forwarded requests, waiting at most [`WAIT`] for each
pub fn serve(device: &dyn DeviceRuntime, worker: &WorkerEndpoints, count: usize) -> usize {
    let mut served = 0;
    while served < count {
        let Ok(request) = worker.requests.recv_timeout(WAIT) else {
            break;
        };
        assert!(worker.reply(execute(device, request)));
        served += 1;
    }
    served
}

/// Submit a request and wait for its reply, running the worker if it gets forwarded
pub fn call(device: &dyn DeviceRuntime, endpoints: &ClientEndpoints, request: ApiRequest) -> ApiRequest {
    endpoints.requests.send(request).unwrap();
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Ok(reply) = endpoints.replies.try_recv() {
            return reply;
        }
        if let Ok(forwarded) = endpoints.worker.requests.recv_timeout(Duration::from_millis(5)) {
            assert!(endpoints.worker.reply(execute(device, forwarded)));
            return endpoints.replies.recv_timeout(WAIT).unwrap();
        }
    }
    panic!("no reply within {WAIT:?}");
}

pub fn next_completion(endpoints: &ClientEndpoints) -> CommandCompletion {
    endpoints.completions.recv_timeout(WAIT).unwrap()
}
