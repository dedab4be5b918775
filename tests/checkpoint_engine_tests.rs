// Checkpoint engine integration tests
// Walks work orders through their checkpoints against the in-memory backend

mod fixtures;

use checkpoint_flow::{
    CheckpointDef, CheckpointStatus, EngineError, ErrorKind, TemplateStore, CHECKPOINT_UPDATED,
};
use fixtures::{admin, member_of, Harness, REVIEW_APPROVE, THREE_STAGE};

#[tokio::test]
async fn test_work_order_clones_template_definitions() {
    let harness = Harness::new().await;
    let order = harness.create(THREE_STAGE).await;

    let summary: Vec<_> = order
        .checkpoints
        .iter()
        .map(|c| (c.order, c.name.as_str(), c.owner_dept_id.as_str(), c.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            (10, "Inspect", "dept-a", CheckpointStatus::Pending),
            (20, "Budget", "dept-b", CheckpointStatus::Pending),
            (30, "Ship", "dept-c", CheckpointStatus::Pending),
        ]
    );
    assert!(order.checkpoints.iter().all(|c| c.work_order_id == order.id));
    assert!(order.checkpoints.iter().all(|c| c.started_at.is_none() && c.ended_at.is_none()));

    let entries = harness.activity.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "CREATE_WORK_ORDER");
    assert!(entries[0].details.contains(&order.title));
}

#[tokio::test]
async fn test_two_work_orders_get_distinct_checkpoints() {
    let harness = Harness::new().await;
    let first = harness.create(REVIEW_APPROVE).await;
    let second = harness.create(REVIEW_APPROVE).await;

    assert_ne!(first.id, second.id);
    assert_ne!(first.checkpoints[0].id, second.checkpoints[0].id);

    harness.finish(&first.checkpoints[0].id).await;
    let untouched = harness.reload(&second).await;
    assert_eq!(untouched.checkpoints[0].status, CheckpointStatus::Pending);
}

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    let harness = Harness::new().await;
    let request = checkpoint_flow::CreateWorkOrderRequest {
        template_id: "no-such-template".into(),
        company: "Acme".to_string(),
        title: "Lost".to_string(),
        description: String::new(),
        priority: Default::default(),
        deadline: None,
    };

    let err = harness.engine.create_work_order(request, &"creator".into()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(harness.repository.work_order_count().await, 0);
    assert!(harness.activity.is_empty().await);
}

#[tokio::test]
async fn test_second_checkpoint_cannot_start_first() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;

    let err = harness
        .apply(&order.checkpoints[1].id, "start", &member_of("dept-b"))
        .await
        .unwrap_err();

    match err {
        EngineError::SequenceViolation { predecessor } => assert_eq!(predecessor, "Review"),
        other => panic!("expected sequence violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_processing_predecessor_still_blocks() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let review = &order.checkpoints[0];

    let started = harness.apply(&review.id, "start", &member_of("dept-a")).await.unwrap();
    assert_eq!(started.status, CheckpointStatus::Processing);
    assert!(started.started_at.is_some());
    assert!(started.ended_at.is_none());

    let err = harness
        .apply(&order.checkpoints[1].id, "start", &member_of("dept-b"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Review"));
    assert_eq!(err.kind(), ErrorKind::SequenceViolation);
}

#[tokio::test]
async fn test_completed_predecessor_unblocks_next() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let dept_a = member_of("dept-a");

    harness.apply(&order.checkpoints[0].id, "start", &dept_a).await.unwrap();
    let completed = harness.apply(&order.checkpoints[0].id, "complete", &dept_a).await.unwrap();
    assert_eq!(completed.status, CheckpointStatus::Completed);
    assert!(completed.ended_at >= completed.started_at);

    let approve = harness
        .apply(&order.checkpoints[1].id, "start", &member_of("dept-b"))
        .await
        .unwrap();
    assert_eq!(approve.status, CheckpointStatus::Processing);
}

#[tokio::test]
async fn test_foreign_department_is_forbidden() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let review = order.checkpoints[0].id;
    harness.apply(&review, "start", &member_of("dept-a")).await.unwrap();

    let err = harness.apply(&review, "complete", &member_of("dept-c")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
    // Names the department that owns the checkpoint
    assert!(err.to_string().contains("Engineering"));
    let stored = harness.reload(&order).await;
    assert_eq!(stored.checkpoints[0].status, CheckpointStatus::Processing);
}

#[tokio::test]
async fn test_forbidden_is_reported_before_status() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;

    // Wrong department and wrong status: authorization is checked first
    let err = harness
        .apply(&order.checkpoints[0].id, "complete", &member_of("dept-b"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_admin_may_act_on_any_department() {
    let harness = Harness::new().await;
    let order = harness.create(THREE_STAGE).await;

    for checkpoint in &order.checkpoints {
        harness.finish(&checkpoint.id).await;
    }

    let finished = harness.reload(&order).await;
    let progress = finished.progress();
    assert!(progress.finished);
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.current, None);
}

#[tokio::test]
async fn test_terminal_states_accept_no_actions() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let review = order.checkpoints[0].id;
    let dept_a = member_of("dept-a");

    harness.apply(&review, "start", &dept_a).await.unwrap();
    let returned = harness.apply(&review, "return", &dept_a).await.unwrap();
    assert_eq!(returned.status, CheckpointStatus::Returned);
    assert!(returned.ended_at.is_none());

    for action in ["start", "complete", "return", "problem"] {
        let err = harness.apply(&review, action, &dept_a).await.unwrap_err();
        match err {
            EngineError::InvalidTransition { status, .. } => assert_eq!(status, CheckpointStatus::Returned),
            other => panic!("{action}: expected invalid transition, got {other:?}"),
        }
    }

    let progress = harness.reload(&order).await.progress();
    assert!(progress.blocked);
    assert!(!progress.finished);
}

#[tokio::test]
async fn test_problem_keeps_timestamps() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let review = order.checkpoints[0].id;
    let dept_a = member_of("dept-a");

    let started = harness.apply(&review, "start", &dept_a).await.unwrap();
    let flagged = harness.apply(&review, "problem", &dept_a).await.unwrap();

    assert_eq!(flagged.status, CheckpointStatus::Problem);
    assert_eq!(flagged.started_at, started.started_at);
    assert_eq!(flagged.ended_at, None);
}

#[tokio::test]
async fn test_rejected_actions_leave_no_trace() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let mut events = harness.fanout.subscribe(&order.id).unwrap();
    let before = harness.reload(&order).await;
    let log_len = harness.activity.len().await;

    let attempts = [
        (order.checkpoints[0].id, "finish", member_of("dept-a")),
        (order.checkpoints[0].id, "complete", member_of("dept-a")),
        (order.checkpoints[0].id, "start", member_of("dept-c")),
        (order.checkpoints[1].id, "start", member_of("dept-b")),
        (checkpoint_flow::CheckpointId::new(), "start", admin()),
    ];
    for (checkpoint_id, action, user) in &attempts {
        assert!(harness.apply(checkpoint_id, action, user).await.is_err());
    }

    assert_eq!(harness.reload(&order).await, before);
    assert_eq!(harness.activity.len().await, log_len);
    assert!(events.try_recv().is_err());
    assert_eq!(harness.engine.metrics().get_stats().transitions_rejected, attempts.len() as u64);
}

#[tokio::test]
async fn test_each_transition_logs_and_publishes_once() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let mut events = harness.fanout.subscribe(&order.id).unwrap();
    let review = order.checkpoints[0].id;

    harness.apply(&review, "start", &member_of("dept-a")).await.unwrap();
    let completed = harness.apply(&review, "complete", &member_of("dept-a")).await.unwrap();

    let actions: Vec<_> = harness
        .activity
        .entries()
        .await
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["CREATE_WORK_ORDER", "CHECKPOINT_START", "CHECKPOINT_COMPLETE"]);

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert!(events.try_recv().is_err());
    assert_eq!(first.event, CHECKPOINT_UPDATED);
    assert_eq!(first.payload["status"], "PROCESSING");
    assert_eq!(second.payload["status"], "COMPLETED");
    assert_eq!(second.payload["id"], serde_json::json!(completed.id));
}

#[tokio::test]
async fn test_template_edits_do_not_reach_existing_orders() {
    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;

    let mut edited = harness.templates.get_template(&REVIEW_APPROVE.into()).await.unwrap();
    edited.checkpoint_defs[0].name = "Renamed".to_string();
    edited.checkpoint_defs.push(CheckpointDef::new(3, "Archive", "dept-c"));
    harness.templates.put_template(edited).await.unwrap();

    let stored = harness.reload(&order).await;
    assert_eq!(stored.checkpoints.len(), 2);
    assert_eq!(stored.checkpoints[0].name, "Review");

    let fresh = harness.create(REVIEW_APPROVE).await;
    assert_eq!(fresh.checkpoints.len(), 3);
    assert_eq!(fresh.checkpoints[0].name, "Renamed");
}

#[tokio::test]
async fn test_available_actions_track_progress() {
    use checkpoint_flow::CheckpointAction;

    let harness = Harness::new().await;
    let order = harness.create(REVIEW_APPROVE).await;
    let review = order.checkpoints[0].id;
    let dept_a = member_of("dept-a");

    assert_eq!(
        harness.engine.available_actions(&review, &dept_a).await.unwrap(),
        vec![CheckpointAction::Start]
    );
    assert!(harness
        .engine
        .available_actions(&review, &member_of("dept-b"))
        .await
        .unwrap()
        .is_empty());

    harness.apply(&review, "start", &dept_a).await.unwrap();
    assert_eq!(
        harness.engine.available_actions(&review, &dept_a).await.unwrap(),
        vec![
            CheckpointAction::Complete,
            CheckpointAction::Return,
            CheckpointAction::Problem
        ]
    );
}
