// Activity log sink: append-only audit trail of accepted transitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::ids::UserId;

/// A single audit record; never mutated once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub user_id: UserId,
    pub action: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(user_id: UserId, action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Activity sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination of activity entries. Failures are reported to the caller,
/// which logs them; they never undo the transition being recorded.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<(), ActivityError>;
}

/// Keeps every entry in memory, in append order
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityLog {
    entries: Arc<Mutex<Vec<ActivityLogEntry>>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ActivityLogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivityLog {
    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<(), ActivityError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Emits each entry as a structured tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivitySink;

#[async_trait]
impl ActivitySink for TracingActivitySink {
    async fn append_activity(&self, entry: ActivityLogEntry) -> Result<(), ActivityError> {
        info!(
            target: "checkpoint_flow::activity",
            user_id = %entry.user_id,
            action = %entry.action,
            created_at = %entry.created_at.to_rfc3339(),
            "{}",
            entry.details
        );
        Ok(())
    }
}
