use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{checkpoints_from_defs, RepositoryError, StatusUpdate, WorkflowRepository};
use crate::ids::{CheckpointId, WorkOrderId};
use crate::templates::CheckpointDef;
use crate::work_orders::{Checkpoint, CheckpointStatus, WorkOrder, WorkOrderHeader};

#[derive(Debug, Default)]
struct Tables {
    work_orders: HashMap<WorkOrderId, WorkOrderHeader>,
    checkpoints: HashMap<CheckpointId, Checkpoint>,
    by_work_order: HashMap<WorkOrderId, Vec<CheckpointId>>,
}

impl Tables {
    fn siblings(&self, work_order_id: &WorkOrderId) -> Vec<Checkpoint> {
        let mut siblings: Vec<Checkpoint> = self
            .by_work_order
            .get(work_order_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.checkpoints.get(id).cloned())
            .collect();
        siblings.sort_by_key(|checkpoint| checkpoint.order);
        siblings
    }
}

/// Process-local repository; each method holds the table guard for its whole
/// read-check-write, which makes the conditional update atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored checkpoint verbatim, bypassing the state machine.
    /// Only built for tests and the `testing` feature, to seed fixtures.
    #[cfg(any(test, feature = "testing"))]
    pub async fn overwrite_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.checkpoints.contains_key(&checkpoint.id) {
            return Err(RepositoryError::Corrupt(format!(
                "checkpoint {} is not stored",
                checkpoint.id
            )));
        }
        tables.checkpoints.insert(checkpoint.id, checkpoint);
        Ok(())
    }

    pub async fn work_order_count(&self) -> usize {
        self.tables.read().await.work_orders.len()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryRepository {
    async fn load_checkpoint_with_siblings(
        &self,
        id: &CheckpointId,
    ) -> Result<Option<(Checkpoint, Vec<Checkpoint>)>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.checkpoints.get(id).map(|checkpoint| {
            let siblings = tables.siblings(&checkpoint.work_order_id);
            (checkpoint.clone(), siblings)
        }))
    }

    async fn compare_and_swap_status(&self, update: &StatusUpdate) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;

        let Some(current) = tables.checkpoints.get(&update.checkpoint_id) else {
            return Ok(false);
        };
        if current.status != update.expected {
            return Ok(false);
        }
        if update.require_completed_predecessors {
            let order = current.order;
            let blocked = tables
                .siblings(&current.work_order_id)
                .iter()
                .any(|sibling| sibling.order < order && sibling.status != CheckpointStatus::Completed);
            if blocked {
                return Ok(false);
            }
        }

        if let Some(checkpoint) = tables.checkpoints.get_mut(&update.checkpoint_id) {
            checkpoint.status = update.new_status;
            checkpoint.started_at = update.started_at;
            checkpoint.ended_at = update.ended_at;
        }
        Ok(true)
    }

    async fn insert_work_order(&self, header: &WorkOrderHeader) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.work_orders.contains_key(&header.id) {
            return Err(RepositoryError::DuplicateWorkOrder(header.id));
        }
        tables.work_orders.insert(header.id, header.clone());
        tables.by_work_order.insert(header.id, Vec::new());
        Ok(())
    }

    async fn create_checkpoints_for_work_order(
        &self,
        work_order_id: &WorkOrderId,
        defs: &[CheckpointDef],
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.work_orders.contains_key(work_order_id) {
            return Err(RepositoryError::MissingWorkOrder(*work_order_id));
        }

        let checkpoints = checkpoints_from_defs(*work_order_id, defs);
        for checkpoint in &checkpoints {
            tables.checkpoints.insert(checkpoint.id, checkpoint.clone());
        }
        tables
            .by_work_order
            .entry(*work_order_id)
            .or_default()
            .extend(checkpoints.iter().map(|checkpoint| checkpoint.id));
        Ok(checkpoints)
    }

    async fn load_work_order(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .work_orders
            .get(id)
            .map(|header| WorkOrder::from_parts(header.clone(), tables.siblings(id))))
    }

    async fn remove_work_order(&self, id: &WorkOrderId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.work_orders.remove(id);
        if let Some(ids) = tables.by_work_order.remove(id) {
            for checkpoint_id in ids {
                tables.checkpoints.remove(&checkpoint_id);
            }
        }
        Ok(())
    }
}
