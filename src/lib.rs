// Checkpoint Flow Library - Departmental checkpoint workflows for work orders
// This exposes the engine and its collaborators for embedding and testing

pub mod activity;
pub mod authorization;
pub mod catalog;
pub mod checkpoints;
pub mod config;
pub mod departments;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod ids;
pub mod observability;
pub mod priority;
pub mod repository;
pub mod telemetry;
pub mod templates;
pub mod work_orders;

// Re-export key types for easy access
pub use activity::{ActivityError, ActivityLogEntry, ActivitySink, InMemoryActivityLog, TracingActivitySink};
pub use authorization::{authorize, can_act, ActingUser, Role};
pub use catalog::{Catalog, CatalogError, CatalogSummary, Script, ScriptStep};
pub use checkpoints::{available_actions, validate_transition, CheckpointAction, TransitionPlan};
pub use config::{DatabaseConfig, EngineConfig, FanoutConfig, FlowConfig, ObservabilityConfig};
pub use departments::{Department, DepartmentRegistry};
pub use engine::{CheckpointEngine, CreateWorkOrderRequest};
pub use error::{EngineError, ErrorKind};
pub use fanout::{drain_published, BroadcastFanout, EventPublisher, FanoutError, WorkOrderEvent, CHECKPOINT_UPDATED};
pub use ids::{CheckpointId, DepartmentId, TemplateId, UserId, WorkOrderId};
pub use observability::{EngineMetrics, EngineStats, OperationTimer};
pub use priority::Priority;
pub use repository::{InMemoryRepository, RepositoryError, StatusUpdate, WorkflowRepository};
#[cfg(feature = "database")]
pub use repository::SqliteRepository;
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use templates::{validate_template, CheckpointDef, InMemoryTemplateStore, Template, TemplateError, TemplateStore};
pub use work_orders::{Checkpoint, CheckpointStatus, WorkOrder, WorkOrderHeader, WorkOrderProgress};
