// Persistence boundary for work orders and checkpoints
// The engine only ever writes checkpoint status through a conditional update

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::checkpoints::TransitionPlan;
use crate::ids::{CheckpointId, WorkOrderId};
use crate::templates::CheckpointDef;
use crate::work_orders::{Checkpoint, CheckpointStatus, WorkOrder, WorkOrderHeader};

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryRepository;
#[cfg(feature = "database")]
pub use sqlite::SqliteRepository;

/// Errors raised by a persistence backend
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Work order {0} already exists")]
    DuplicateWorkOrder(WorkOrderId),

    #[error("Work order {0} does not exist")]
    MissingWorkOrder(WorkOrderId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Conditional status write: applied only while the stored status still
/// equals `expected` and, when requested, every lower-ordered sibling is
/// completed. Both conditions are checked in the same atomic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub checkpoint_id: CheckpointId,
    pub expected: CheckpointStatus,
    pub new_status: CheckpointStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub require_completed_predecessors: bool,
}

impl StatusUpdate {
    pub fn from_plan(checkpoint_id: CheckpointId, plan: &TransitionPlan) -> Self {
        Self {
            checkpoint_id,
            expected: plan.from,
            new_status: plan.to,
            started_at: plan.started_at,
            ended_at: plan.ended_at,
            require_completed_predecessors: plan.requires_completed_predecessors,
        }
    }
}

/// Repository used by the engine; every method is a single atomic unit
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// The checkpoint plus every checkpoint of its work order (itself included), sorted by order
    async fn load_checkpoint_with_siblings(
        &self,
        id: &CheckpointId,
    ) -> Result<Option<(Checkpoint, Vec<Checkpoint>)>, RepositoryError>;

    /// Apply `update`; `Ok(false)` means a condition no longer held and nothing was written
    async fn compare_and_swap_status(&self, update: &StatusUpdate) -> Result<bool, RepositoryError>;

    async fn insert_work_order(&self, header: &WorkOrderHeader) -> Result<(), RepositoryError>;

    /// Create fresh `PENDING` checkpoints for a work order, one per definition
    async fn create_checkpoints_for_work_order(
        &self,
        work_order_id: &WorkOrderId,
        defs: &[CheckpointDef],
    ) -> Result<Vec<Checkpoint>, RepositoryError>;

    async fn load_work_order(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>, RepositoryError>;

    /// Remove a work order and its checkpoints; used to undo a half-created work order
    async fn remove_work_order(&self, id: &WorkOrderId) -> Result<(), RepositoryError>;
}

/// Build the `PENDING` checkpoints cloned from template definitions
pub(crate) fn checkpoints_from_defs(work_order_id: WorkOrderId, defs: &[CheckpointDef]) -> Vec<Checkpoint> {
    defs.iter()
        .map(|def| Checkpoint {
            id: CheckpointId::new(),
            work_order_id,
            order: def.order,
            name: def.name.clone(),
            owner_dept_id: def.owner_dept_id.clone(),
            status: CheckpointStatus::Pending,
            started_at: None,
            ended_at: None,
        })
        .collect()
}
