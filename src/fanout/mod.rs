//! Per-work-order event fan-out
//!
//! The engine publishes one event per accepted transition. Publishing never
//! blocks and never fails the transition it reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::ids::WorkOrderId;

/// Event name published after every accepted checkpoint transition
pub const CHECKPOINT_UPDATED: &str = "checkpoint:updated";

/// Event delivered to subscribers of a work order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderEvent {
    pub work_order_id: WorkOrderId,
    pub event: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Fan-out channel registry is poisoned")]
    Poisoned,

    #[error("Fan-out transport failed: {0}")]
    Transport(String),
}

/// Outbound fan-out boundary; implementations must return without waiting on subscribers
pub trait EventPublisher: Send + Sync {
    fn publish_to_work_order(
        &self,
        work_order_id: &WorkOrderId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), FanoutError>;
}

/// Registry of `tokio::sync::broadcast` channels, one per work order.
///
/// A channel is created on first subscription. Publishing to a work order
/// nobody listens to is a successful no-op; slow subscribers lose the oldest
/// events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastFanout {
    capacity: usize,
    channels: Arc<RwLock<HashMap<WorkOrderId, broadcast::Sender<WorkOrderEvent>>>>,
}

impl BroadcastFanout {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, work_order_id: &WorkOrderId) -> Result<broadcast::Receiver<WorkOrderEvent>, FanoutError> {
        let mut channels = self.channels.write().map_err(|_| FanoutError::Poisoned)?;
        let sender = channels
            .entry(*work_order_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }

    pub fn subscriber_count(&self, work_order_id: &WorkOrderId) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(work_order_id).map(|sender| sender.receiver_count()))
            .unwrap_or(0)
    }

    /// Drop the channel of a work order; its subscribers see the stream close
    pub fn close(&self, work_order_id: &WorkOrderId) -> Result<(), FanoutError> {
        self.channels
            .write()
            .map_err(|_| FanoutError::Poisoned)?
            .remove(work_order_id);
        Ok(())
    }
}

/// Count the events published to `receiver` so far without waiting.
///
/// Events a lagging receiver lost to overflow still count as published.
pub fn drain_published(receiver: &mut broadcast::Receiver<WorkOrderEvent>) -> u64 {
    let mut published = 0;
    loop {
        match receiver.try_recv() {
            Ok(_) => published += 1,
            Err(broadcast::error::TryRecvError::Lagged(missed)) => published += missed,
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                return published
            }
        }
    }
}

impl Default for BroadcastFanout {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventPublisher for BroadcastFanout {
    fn publish_to_work_order(
        &self,
        work_order_id: &WorkOrderId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), FanoutError> {
        let channels = self.channels.read().map_err(|_| FanoutError::Poisoned)?;
        if let Some(sender) = channels.get(work_order_id) {
            // Err only means every receiver is gone
            let _ = sender.send(WorkOrderEvent {
                work_order_id: *work_order_id,
                event: event.to_string(),
                payload,
                published_at: Utc::now(),
            });
        }
        Ok(())
    }
}
