//! Checkpoint insertion policies.

use crate::client::Client;
use crate::config::CheckpointPolicy;
use crate::dag::Operation;
use crate::device::DeviceRuntime;
use tracing::debug;

/// Append one checkpoint operation to `client`'s log using `policy`
///
/// Returns the version of the inserted op, or `None` when the policy is disabled.
pub fn insert_checkpoint(
    client: &mut Client,
    policy: CheckpointPolicy,
    device: &dyn DeviceRuntime,
) -> Option<u64> {
    let handles = match policy {
        CheckpointPolicy::Disabled => return None,
        CheckpointPolicy::Naive => client.stateful_handles(),
        CheckpointPolicy::Incremental => client.take_modified_handles(),
    };

    let mut op = Operation::checkpoint();
    op.record_handles(handles);
    let listed = op.handle_count();
    let version = client.launch_op(op, device);

    debug!(
        client_id = %client.id(),
        policy = ?policy,
        version,
        listed,
        "checkpoint inserted"
    );
    Some(version)
}
