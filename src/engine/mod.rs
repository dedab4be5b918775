// Checkpoint workflow engine
// Wires the state machine to persistence, the activity log and event fan-out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::activity::{ActivityLogEntry, ActivitySink};
use crate::checkpoints::{available_actions, CheckpointAction};
use crate::config::EngineConfig;
use crate::departments::DepartmentRegistry;
use crate::error::EngineError;
use crate::fanout::EventPublisher;
use crate::authorization::ActingUser;
use crate::ids::{CheckpointId, TemplateId, WorkOrderId};
use crate::observability::EngineMetrics;
use crate::priority::Priority;
use crate::repository::WorkflowRepository;
use crate::templates::TemplateStore;
use crate::work_orders::WorkOrder;

pub mod creation;
pub mod transition;


/// Input of [`CheckpointEngine::create_work_order`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkOrderRequest {
    pub template_id: TemplateId,
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Drives work orders through their checkpoints.
///
/// The engine keeps no lock across a request: every transition is a
/// read, a validation and one conditional write, so several engine
/// instances may share a repository.
pub struct CheckpointEngine {
    repository: Arc<dyn WorkflowRepository>,
    templates: Arc<dyn TemplateStore>,
    departments: Arc<DepartmentRegistry>,
    activity: Arc<dyn ActivitySink>,
    publisher: Arc<dyn EventPublisher>,
    settings: EngineConfig,
    metrics: Arc<EngineMetrics>,
}

impl CheckpointEngine {
    pub fn new(
        repository: Arc<dyn WorkflowRepository>,
        templates: Arc<dyn TemplateStore>,
        departments: Arc<DepartmentRegistry>,
        activity: Arc<dyn ActivitySink>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            templates,
            departments,
            activity,
            publisher,
            settings: EngineConfig::default(),
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn departments(&self) -> &DepartmentRegistry {
        &self.departments
    }

    /// Load a work order with its checkpoints in order
    pub async fn get_work_order(&self, id: &WorkOrderId) -> Result<WorkOrder, EngineError> {
        self.repository
            .load_work_order(id)
            .await?
            .ok_or_else(|| EngineError::not_found("Work order", id))
    }

    /// Actions `user` could currently apply to a checkpoint
    pub async fn available_actions(
        &self,
        checkpoint_id: &CheckpointId,
        user: &ActingUser,
    ) -> Result<Vec<CheckpointAction>, EngineError> {
        let (checkpoint, siblings) = self
            .repository
            .load_checkpoint_with_siblings(checkpoint_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Checkpoint", checkpoint_id))?;
        Ok(available_actions(&checkpoint, &siblings, user))
    }

    /// Append to the activity log, bounded by the side-effect timeout; failures are only logged
    async fn record_activity(&self, entry: ActivityLogEntry) {
        let action = entry.action.clone();
        match tokio::time::timeout(
            self.settings.side_effect_timeout(),
            self.activity.append_activity(entry),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.record_side_effect_failure();
                warn!(action = %action, error = %e, "Failed to append activity entry");
            }
            Err(_) => {
                self.metrics.record_side_effect_failure();
                warn!(
                    action = %action,
                    timeout_ms = self.settings.side_effect_timeout_ms,
                    "Activity append timed out"
                );
            }
        }
    }

    /// Fire-and-forget publish; failures are only logged
    fn publish(&self, work_order_id: &WorkOrderId, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.publisher.publish_to_work_order(work_order_id, event, payload) {
            self.metrics.record_side_effect_failure();
            warn!(work_order_id = %work_order_id, event, error = %e, "Failed to publish event");
        }
    }
}
