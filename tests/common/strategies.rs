use proptest::prelude::*;

/// One step of a generated client workload
#[derive(Debug, Clone)]
pub enum WorkloadStep {
    /// Allocate a buffer of the given size
    Allocate(u64),
    /// Mark the buffer at this index (modulo live buffers) modified
    Mutate(usize),
    /// Insert a checkpoint operation
    Checkpoint,
}

pub fn workload_step_strategy() -> impl Strategy<Value = WorkloadStep> {
    prop_oneof![
        (1u64..4096).prop_map(WorkloadStep::Allocate),
        (0usize..64).prop_map(WorkloadStep::Mutate),
        Just(WorkloadStep::Checkpoint),
    ]
}

pub fn workload_strategy() -> impl Strategy<Value = Vec<WorkloadStep>> {
    prop::collection::vec(workload_step_strategy(), 1..48)
}
