mod common;

use common::strategies::*;
use common::{client, device};
use phos_core::config::CheckpointPolicy;
use phos_core::handle::{AllocationRequest, ResourceKind};
use phos_core::parser::insert_checkpoint;
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    /// Property: DAG versions are the log positions, strictly increasing without gaps
    #[test]
    fn dag_versions_are_gapless(workload in workload_strategy()) {
        let device = device();
        let mut client = client(&device);
        run_workload(&mut client, &device, &workload, CheckpointPolicy::Incremental);

        for (position, op) in client.dag().ops().iter().enumerate() {
            prop_assert_eq!(op.version(), Some(position as u64));
        }
    }

    /// Property: an incremental checkpoint lists exactly the handles mutated since the last one
    #[test]
    fn incremental_checkpoints_list_each_mutation_once(workload in workload_strategy()) {
        let device = device();
        let mut client = client(&device);
        let context = client.default_handle(ResourceKind::Context).unwrap();
        let mut buffers = Vec::new();
        let mut pending = BTreeSet::new();

        for step in &workload {
            match step {
                WorkloadStep::Allocate(size) => buffers.push(
                    client
                        .allocate(
                            ResourceKind::Memory,
                            AllocationRequest::new(*size)
                                .with_parents(ResourceKind::Context, vec![context.clone()]),
                        )
                        .unwrap(),
                ),
                WorkloadStep::Mutate(index) if !buffers.is_empty() => {
                    let key = buffers[index % buffers.len()].key();
                    client.mark_modified(key).unwrap();
                    pending.insert(key);
                }
                WorkloadStep::Mutate(_) => {}
                WorkloadStep::Checkpoint => {
                    let version = insert_checkpoint(
                        &mut client,
                        CheckpointPolicy::Incremental,
                        device.as_ref(),
                    )
                    .unwrap();
                    let op = client.dag().get(version).unwrap();
                    let listed: Vec<_> = op.handle_keys().collect();
                    let unique: BTreeSet<_> = listed.iter().copied().collect();
                    prop_assert_eq!(listed.len(), unique.len());
                    prop_assert_eq!(&unique, &pending);
                    // Buffers never restored are deferred and carried to the next one
                    pending = op.outcome().unwrap().missed().collect();
                }
            }
        }
    }

    /// Property: a naive checkpoint lists every stateful handle regardless of history
    #[test]
    fn naive_checkpoints_cover_owned_state(workload in workload_strategy()) {
        let device = device();
        let mut client = client(&device);
        run_workload(&mut client, &device, &workload, CheckpointPolicy::Naive);

        let version =
            insert_checkpoint(&mut client, CheckpointPolicy::Naive, device.as_ref()).unwrap();
        prop_assert_eq!(
            client.dag().get(version).unwrap().handles().len(),
            client.stateful_handle_count()
        );
    }
}

fn run_workload(
    client: &mut phos_core::Client,
    device: &phos_core::InMemoryDevice,
    workload: &[WorkloadStep],
    policy: CheckpointPolicy,
) {
    let context = client.default_handle(ResourceKind::Context).unwrap();
    let mut buffers = Vec::new();
    for step in workload {
        match step {
            WorkloadStep::Allocate(size) => buffers.push(
                client
                    .allocate(
                        ResourceKind::Memory,
                        AllocationRequest::new(*size)
                            .with_parents(ResourceKind::Context, vec![context.clone()]),
                    )
                    .unwrap(),
            ),
            WorkloadStep::Mutate(index) if !buffers.is_empty() => {
                let key = buffers[index % buffers.len()].key();
                client.mark_modified(key).unwrap();
            }
            WorkloadStep::Mutate(_) => {}
            WorkloadStep::Checkpoint => {
                insert_checkpoint(client, policy, device).unwrap();
            }
        }
    }
}
