use chrono::Utc;
use tracing::{info, warn, Instrument};

use super::{CheckpointEngine, CreateWorkOrderRequest};
use crate::activity::ActivityLogEntry;
use crate::error::EngineError;
use crate::ids::{UserId, WorkOrderId};
use crate::telemetry::{create_work_order_span, generate_correlation_id};
use crate::work_orders::{WorkOrder, WorkOrderHeader};

pub const CREATE_WORK_ORDER: &str = "CREATE_WORK_ORDER";

impl CheckpointEngine {
    /// Create a work order from a snapshot of a template.
    ///
    /// Every definition becomes a fresh `PENDING` checkpoint owned by the new
    /// work order; later template edits do not reach it.
    pub async fn create_work_order(
        &self,
        request: CreateWorkOrderRequest,
        creator: &UserId,
    ) -> Result<WorkOrder, EngineError> {
        let correlation_id = generate_correlation_id();
        let span = create_work_order_span(request.template_id.as_str(), creator.as_str(), &correlation_id);

        async move {
            let template = self
                .templates
                .get_template(&request.template_id)
                .await
                .ok_or_else(|| EngineError::not_found("Template", &request.template_id))?;

            let header = WorkOrderHeader {
                id: WorkOrderId::new(),
                company: request.company,
                title: request.title,
                description: request.description,
                priority: request.priority,
                deadline: request.deadline,
                created_by: creator.clone(),
                created_at: Utc::now(),
            };

            self.repository.insert_work_order(&header).await?;
            let checkpoints = match self
                .repository
                .create_checkpoints_for_work_order(&header.id, &template.checkpoint_defs)
                .await
            {
                Ok(checkpoints) => checkpoints,
                Err(e) => {
                    if let Err(cleanup) = self.repository.remove_work_order(&header.id).await {
                        warn!(
                            work_order_id = %header.id,
                            error = %cleanup,
                            "Failed to remove partially created work order"
                        );
                    }
                    return Err(e.into());
                }
            };

            let work_order = WorkOrder::from_parts(header, checkpoints);
            self.metrics.record_work_order_created();
            info!(
                work_order_id = %work_order.id,
                template_id = %template.id,
                checkpoints = work_order.checkpoints.len(),
                "Work order created"
            );

            self.record_activity(ActivityLogEntry::new(
                creator.clone(),
                CREATE_WORK_ORDER,
                format!(
                    "Created work order '{}' from template '{}'",
                    work_order.title, template.name
                ),
            ))
            .await;

            Ok(work_order)
        }
        .instrument(span)
        .await
    }
}
