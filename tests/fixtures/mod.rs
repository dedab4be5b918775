// Shared harness for engine integration tests: an in-memory repository,
// departments A/B/C, an inspectable activity log and a broadcast fan-out
#![allow(dead_code)]

use checkpoint_flow::{
    ActingUser, BroadcastFanout, Checkpoint, CheckpointDef, CheckpointEngine, CheckpointId, CreateWorkOrderRequest,
    Department, DepartmentRegistry, EngineError, InMemoryActivityLog, InMemoryRepository, InMemoryTemplateStore,
    Priority, Template, WorkOrder,
};
use std::sync::Arc;

pub const REVIEW_APPROVE: &str = "review-approve";
pub const THREE_STAGE: &str = "three-stage";

pub fn departments() -> Arc<DepartmentRegistry> {
    Arc::new(DepartmentRegistry::with_departments([
        Department::new("dept-a", "Engineering"),
        Department::new("dept-b", "Finance"),
        Department::new("dept-c", "Logistics"),
    ]))
}

pub fn review_approve_template() -> Template {
    Template {
        id: REVIEW_APPROVE.into(),
        name: "Review and approve".to_string(),
        checkpoint_defs: vec![
            CheckpointDef::new(1, "Review", "dept-a"),
            CheckpointDef::new(2, "Approve", "dept-b"),
        ],
    }
}

pub fn three_stage_template() -> Template {
    Template {
        id: THREE_STAGE.into(),
        name: "Three stage".to_string(),
        checkpoint_defs: vec![
            CheckpointDef::new(10, "Inspect", "dept-a"),
            CheckpointDef::new(20, "Budget", "dept-b"),
            CheckpointDef::new(30, "Ship", "dept-c"),
        ],
    }
}

pub fn member_of(dept: &str) -> ActingUser {
    ActingUser::member(format!("user-{dept}"), dept)
}

pub fn admin() -> ActingUser {
    ActingUser::admin("admin")
}

pub struct Harness {
    pub engine: Arc<CheckpointEngine>,
    pub repository: InMemoryRepository,
    pub templates: InMemoryTemplateStore,
    pub activity: InMemoryActivityLog,
    pub fanout: Arc<BroadcastFanout>,
}

impl Harness {
    pub async fn new() -> Self {
        let departments = departments();
        let repository = InMemoryRepository::new();
        let templates = InMemoryTemplateStore::new(departments.clone());
        templates.put_template(review_approve_template()).await.unwrap();
        templates.put_template(three_stage_template()).await.unwrap();
        let activity = InMemoryActivityLog::new();
        let fanout = Arc::new(BroadcastFanout::default());

        let engine = CheckpointEngine::new(
            Arc::new(repository.clone()),
            Arc::new(templates.clone()),
            departments,
            Arc::new(activity.clone()),
            fanout.clone(),
        );

        Self {
            engine: Arc::new(engine),
            repository,
            templates,
            activity,
            fanout,
        }
    }

    pub async fn create(&self, template_id: &str) -> WorkOrder {
        let request = CreateWorkOrderRequest {
            template_id: template_id.into(),
            company: "Acme Industrial".to_string(),
            title: format!("Order from {template_id}"),
            description: "Integration test work order".to_string(),
            priority: Priority::Medium,
            deadline: None,
        };
        self.engine.create_work_order(request, &"creator".into()).await.unwrap()
    }

    pub async fn apply(&self, checkpoint_id: &CheckpointId, action: &str, user: &ActingUser) -> Result<Checkpoint, EngineError> {
        self.engine.apply_action(checkpoint_id, action, user, None).await
    }

    pub async fn reload(&self, work_order: &WorkOrder) -> WorkOrder {
        self.engine.get_work_order(&work_order.id).await.unwrap()
    }

    /// Start then complete, acting as an admin
    pub async fn finish(&self, checkpoint_id: &CheckpointId) {
        self.apply(checkpoint_id, "start", &admin()).await.unwrap();
        self.apply(checkpoint_id, "complete", &admin()).await.unwrap();
    }
}
