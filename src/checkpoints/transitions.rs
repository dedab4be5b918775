// Checkpoint state machine: one transition table, one validation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::authorization::{authorize, can_act, ActingUser};
use crate::departments::DepartmentRegistry;
use crate::error::EngineError;
use crate::work_orders::{Checkpoint, CheckpointStatus};

/// The four actions a caller may request on a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointAction {
    Start,
    Complete,
    Return,
    Problem,
}

impl CheckpointAction {
    pub const ALL: [CheckpointAction; 4] = [
        CheckpointAction::Start,
        CheckpointAction::Complete,
        CheckpointAction::Return,
        CheckpointAction::Problem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointAction::Start => "start",
            CheckpointAction::Complete => "complete",
            CheckpointAction::Return => "return",
            CheckpointAction::Problem => "problem",
        }
    }

    /// Action name recorded in the activity log, e.g. `CHECKPOINT_START`
    pub fn activity_name(self) -> String {
        format!("CHECKPOINT_{}", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for CheckpointAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(CheckpointAction::Start),
            "complete" => Ok(CheckpointAction::Complete),
            "return" => Ok(CheckpointAction::Return),
            "problem" => Ok(CheckpointAction::Problem),
            other => Err(EngineError::InvalidAction {
                action: other.to_string(),
            }),
        }
    }
}

/// The transition table. `None` means the action is illegal from `from`.
pub fn next_status(from: CheckpointStatus, action: CheckpointAction) -> Option<CheckpointStatus> {
    use CheckpointAction as A;
    use CheckpointStatus as S;

    match (from, action) {
        (S::Pending, A::Start) => Some(S::Processing),
        (S::Processing, A::Complete) => Some(S::Completed),
        (S::Processing, A::Return) => Some(S::Returned),
        (S::Processing, A::Problem) => Some(S::Problem),
        _ => None,
    }
}

/// A validated transition, ready to be written with a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub action: CheckpointAction,
    pub from: CheckpointStatus,
    pub to: CheckpointStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// The write must re-check that every lower-ordered sibling is completed
    pub requires_completed_predecessors: bool,
}

impl TransitionPlan {
    /// The checkpoint as it looks once the plan is committed
    pub fn apply(&self, checkpoint: &Checkpoint) -> Checkpoint {
        Checkpoint {
            status: self.to,
            started_at: self.started_at,
            ended_at: self.ended_at,
            ..checkpoint.clone()
        }
    }
}

/// Status precondition and timestamp effects of `action` on `checkpoint`
pub fn plan_transition(
    checkpoint: &Checkpoint,
    action: CheckpointAction,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, EngineError> {
    let to = next_status(checkpoint.status, action).ok_or(EngineError::InvalidTransition {
        action,
        status: checkpoint.status,
    })?;

    let (started_at, ended_at) = match action {
        CheckpointAction::Start => (Some(now), checkpoint.ended_at),
        // Backfill a missing start so a finished checkpoint never has an end without a start
        CheckpointAction::Complete => {
            let started = checkpoint.started_at.unwrap_or(now);
            (Some(started), Some(now.max(started)))
        }
        CheckpointAction::Return | CheckpointAction::Problem => {
            (checkpoint.started_at, checkpoint.ended_at)
        }
    };

    Ok(TransitionPlan {
        action,
        from: checkpoint.status,
        to,
        started_at,
        ended_at,
        requires_completed_predecessors: action == CheckpointAction::Start,
    })
}

/// First sibling with a strictly smaller order that is not completed
pub fn first_incomplete_predecessor<'a>(
    checkpoint: &Checkpoint,
    siblings: &'a [Checkpoint],
) -> Option<&'a Checkpoint> {
    siblings
        .iter()
        .filter(|sibling| sibling.order < checkpoint.order)
        .filter(|sibling| sibling.status != CheckpointStatus::Completed)
        .min_by_key(|sibling| sibling.order)
}

fn check_sequence(checkpoint: &Checkpoint, siblings: &[Checkpoint]) -> Result<(), EngineError> {
    match first_incomplete_predecessor(checkpoint, siblings) {
        Some(blocker) => Err(EngineError::SequenceViolation {
            predecessor: blocker.name.clone(),
        }),
        None => Ok(()),
    }
}

/// Authorization, status and sequence checks in order; the first failure wins
pub fn validate_transition(
    checkpoint: &Checkpoint,
    siblings: &[Checkpoint],
    action: CheckpointAction,
    user: &ActingUser,
    departments: &DepartmentRegistry,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, EngineError> {
    authorize(user, checkpoint, departments)?;
    let plan = plan_transition(checkpoint, action, now)?;
    if plan.requires_completed_predecessors {
        check_sequence(checkpoint, siblings)?;
    }
    Ok(plan)
}

/// Actions `user` could successfully request on `checkpoint` right now
pub fn available_actions(
    checkpoint: &Checkpoint,
    siblings: &[Checkpoint],
    user: &ActingUser,
) -> Vec<CheckpointAction> {
    if !can_act(user, checkpoint) {
        return Vec::new();
    }

    CheckpointAction::ALL
        .into_iter()
        .filter(|action| next_status(checkpoint.status, *action).is_some())
        .filter(|action| {
            *action != CheckpointAction::Start
                || first_incomplete_predecessor(checkpoint, siblings).is_none()
        })
        .collect()
}
