// Work order aggregate: a work order exclusively owns its ordered checkpoints

pub mod types;

pub use types::{Checkpoint, CheckpointStatus, WorkOrder, WorkOrderHeader, WorkOrderProgress};
