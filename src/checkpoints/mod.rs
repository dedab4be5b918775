// Checkpoint lifecycle: PENDING -> PROCESSING -> {COMPLETED | RETURNED | PROBLEM}

pub mod transitions;

pub use transitions::{
    available_actions, first_incomplete_predecessor, next_status, plan_transition,
    validate_transition, CheckpointAction, TransitionPlan,
};
