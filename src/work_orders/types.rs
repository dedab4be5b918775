// Core types for the work order aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{CheckpointId, DepartmentId, UserId, WorkOrderId};
use crate::priority::Priority;

/// Lifecycle status of a single checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckpointStatus {
    /// Waiting for its turn
    Pending,
    /// Being worked on by the owning department
    Processing,
    Completed,
    /// Sent back by the owning department
    Returned,
    /// Flagged as having a problem
    Problem,
}

impl CheckpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "PENDING",
            CheckpointStatus::Processing => "PROCESSING",
            CheckpointStatus::Completed => "COMPLETED",
            CheckpointStatus::Returned => "RETURNED",
            CheckpointStatus::Problem => "PROBLEM",
        }
    }

    /// No action defined by the engine leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckpointStatus::Completed | CheckpointStatus::Returned | CheckpointStatus::Problem
        )
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CheckpointStatus::Pending),
            "PROCESSING" => Ok(CheckpointStatus::Processing),
            "COMPLETED" => Ok(CheckpointStatus::Completed),
            "RETURNED" => Ok(CheckpointStatus::Returned),
            "PROBLEM" => Ok(CheckpointStatus::Problem),
            other => Err(format!("unknown checkpoint status '{other}'")),
        }
    }
}

/// One stage of a work order's pipeline, owned by a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub work_order_id: WorkOrderId,
    pub order: i64,
    pub name: String,
    pub owner_dept_id: DepartmentId,
    pub status: CheckpointStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Time spent between start and completion, once both are known
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some(ended - started),
            _ => None,
        }
    }
}

/// Header fields of a work order, without its checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderHeader {
    pub id: WorkOrderId,
    pub company: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// A unit of work with its own, independent checkpoint sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub company: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    /// Sorted by `order`
    pub checkpoints: Vec<Checkpoint>,
}

impl WorkOrder {
    pub fn from_parts(header: WorkOrderHeader, mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by_key(|checkpoint| checkpoint.order);
        Self {
            id: header.id,
            company: header.company,
            title: header.title,
            description: header.description,
            priority: header.priority,
            deadline: header.deadline,
            created_by: header.created_by,
            created_at: header.created_at,
            checkpoints,
        }
    }

    pub fn header(&self) -> WorkOrderHeader {
        WorkOrderHeader {
            id: self.id,
            company: self.company.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            deadline: self.deadline,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }

    pub fn checkpoint(&self, id: &CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| &checkpoint.id == id)
    }

    pub fn checkpoint_by_order(&self, order: i64) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.order == order)
    }

    pub fn progress(&self) -> WorkOrderProgress {
        let total = self.checkpoints.len();
        let completed = self
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.status == CheckpointStatus::Completed)
            .count();
        let current = self
            .checkpoints
            .iter()
            .find(|checkpoint| checkpoint.status != CheckpointStatus::Completed)
            .map(|checkpoint| checkpoint.name.clone());
        let blocked = self.checkpoints.iter().any(|checkpoint| {
            matches!(
                checkpoint.status,
                CheckpointStatus::Returned | CheckpointStatus::Problem
            )
        });

        WorkOrderProgress {
            total,
            completed,
            current,
            blocked,
            finished: total > 0 && completed == total,
        }
    }
}

/// Summary of how far a work order has moved through its checkpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderProgress {
    pub total: usize,
    pub completed: usize,
    /// Name of the first checkpoint that is not completed yet
    pub current: Option<String>,
    /// Some checkpoint was returned or flagged as a problem
    pub blocked: bool,
    pub finished: bool,
}
