use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, Instrument};

use super::CheckpointEngine;
use crate::activity::ActivityLogEntry;
use crate::authorization::ActingUser;
use crate::checkpoints::{validate_transition, CheckpointAction, TransitionPlan};
use crate::error::EngineError;
use crate::fanout::CHECKPOINT_UPDATED;
use crate::ids::CheckpointId;
use crate::repository::StatusUpdate;
use crate::telemetry::{create_transition_span, generate_correlation_id};
use crate::work_orders::Checkpoint;

impl CheckpointEngine {
    /// Validate and apply `action` to a checkpoint on behalf of `user`.
    ///
    /// Validation order is action name, existence, authorization, status,
    /// then sequence; the first failure is returned and nothing is written.
    /// `deadline` bounds the read and validation and is checked once more
    /// before the conditional write; a write that has started always runs to
    /// completion. Without a deadline the configured default applies. Activity logging and event publication
    /// happen after the commit and cannot turn a success into an error.
    pub async fn apply_action(
        &self,
        checkpoint_id: &CheckpointId,
        action: &str,
        user: &ActingUser,
        deadline: Option<Instant>,
    ) -> Result<Checkpoint, EngineError> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            &checkpoint_id.to_string(),
            action,
            user.id.as_str(),
            &correlation_id,
        );

        async move {
            let action = match action.parse::<CheckpointAction>() {
                Ok(action) => action,
                Err(err) => return Err(self.rejected(err)),
            };

            let started = Instant::now();
            let deadline = deadline.unwrap_or_else(|| started + self.settings.default_deadline());
            let timed_out = || EngineError::Timeout {
                operation: format!("{action} checkpoint {checkpoint_id}"),
                duration_ms: deadline.saturating_duration_since(started).as_millis() as u64,
            };

            // An already expired deadline must not race a fast repository
            if started >= deadline {
                return Err(self.rejected(timed_out()));
            }

            let committed = self
                .commit_transition(checkpoint_id, action, user, deadline, &timed_out)
                .await;

            let (before, after) = match committed {
                Ok(pair) => pair,
                Err(err) => return Err(self.rejected(err)),
            };

            self.metrics.record_commit();
            info!(
                work_order_id = %after.work_order_id,
                from = %before.status,
                to = %after.status,
                "Checkpoint transition committed"
            );

            self.after_commit(&before, &after, action, user).await;
            Ok(after)
        }
        .instrument(span)
        .await
    }

    fn rejected(&self, err: EngineError) -> EngineError {
        self.metrics.record_rejection();
        debug!(kind = %err.kind(), error = %err, "Checkpoint transition rejected");
        err
    }

    /// Read, validate and conditionally write, re-reading after a lost write.
    /// Returns the checkpoint before and after the committed transition.
    async fn commit_transition(
        &self,
        checkpoint_id: &CheckpointId,
        action: CheckpointAction,
        user: &ActingUser,
        deadline: Instant,
        timed_out: &impl Fn() -> EngineError,
    ) -> Result<(Checkpoint, Checkpoint), EngineError> {
        let mut conflicts = 0;
        loop {
            let (checkpoint, plan) =
                match tokio::time::timeout_at(deadline, self.load_and_validate(checkpoint_id, action, user)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(timed_out()),
                };

            // Last point at which the transition may still be abandoned
            if Instant::now() >= deadline {
                return Err(timed_out());
            }

            // Never cancelled: the backend may commit before it answers
            let update = StatusUpdate::from_plan(checkpoint.id, &plan);
            if self.repository.compare_and_swap_status(&update).await? {
                let updated = plan.apply(&checkpoint);
                return Ok((checkpoint, updated));
            }

            self.metrics.record_write_conflict();
            conflicts += 1;
            debug!(conflicts, "Conditional write lost a race, re-reading checkpoint");

            if conflicts > self.settings.conflict_retries {
                return Err(
                    match tokio::time::timeout_at(deadline, self.conflict_outcome(checkpoint_id, action, user)).await {
                        Ok(err) => err,
                        Err(_) => timed_out(),
                    },
                );
            }
        }
    }

    async fn load_and_validate(
        &self,
        checkpoint_id: &CheckpointId,
        action: CheckpointAction,
        user: &ActingUser,
    ) -> Result<(Checkpoint, TransitionPlan), EngineError> {
        let (checkpoint, siblings) = self.load(checkpoint_id).await?;
        let plan = validate_transition(
            &checkpoint,
            &siblings,
            action,
            user,
            &self.departments,
            Utc::now(),
        )?;
        Ok((checkpoint, plan))
    }

    /// Error reported once retries are exhausted: whatever the fresh snapshot
    /// fails on, or the status that kept changing underneath us.
    async fn conflict_outcome(
        &self,
        checkpoint_id: &CheckpointId,
        action: CheckpointAction,
        user: &ActingUser,
    ) -> EngineError {
        let (checkpoint, siblings) = match self.load(checkpoint_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => return err,
        };
        match validate_transition(&checkpoint, &siblings, action, user, &self.departments, Utc::now()) {
            Err(err) => err,
            Ok(_) => EngineError::InvalidTransition {
                action,
                status: checkpoint.status,
            },
        }
    }

    async fn load(&self, checkpoint_id: &CheckpointId) -> Result<(Checkpoint, Vec<Checkpoint>), EngineError> {
        self.repository
            .load_checkpoint_with_siblings(checkpoint_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Checkpoint", checkpoint_id))
    }

    async fn after_commit(
        &self,
        before: &Checkpoint,
        after: &Checkpoint,
        action: CheckpointAction,
        user: &ActingUser,
    ) {
        self.record_activity(ActivityLogEntry::new(
            user.id.clone(),
            action.activity_name(),
            format!(
                "Checkpoint '{}' (order {}) of work order {} moved from {} to {}",
                after.name, after.order, after.work_order_id, before.status, after.status
            ),
        ))
        .await;

        match serde_json::to_value(after) {
            Ok(payload) => self.publish(&after.work_order_id, CHECKPOINT_UPDATED, payload),
            Err(e) => {
                self.metrics.record_side_effect_failure();
                tracing::warn!(error = %e, "Failed to serialize checkpoint event payload");
            }
        }
    }
}
