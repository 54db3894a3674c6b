//! End-to-end Task Bus lifecycle not already covered by the in-module
//! `auth`/`queue` unit tests: register -> enqueue -> poll -> report,
//! session takeover across a live queue, and the cancel-flag lifecycle
//! fixed to clear on a reported `cancelled` status rather than staying
//! set forever.

use std::sync::Arc;

use form_mapper_control_plane::domain::{AgentStatus, AgentTask, CompanyId, TaskId, TaskStatus, TaskType, UserId};
use form_mapper_control_plane::store::MemoryStore;
use form_mapper_control_plane::task_bus::{RegisterRequest, TaskBus, TaskBusError};

fn bus() -> Arc<TaskBus<MemoryStore>> {
    Arc::new(TaskBus::new(Arc::new(MemoryStore::new()), b"test-secret".to_vec()))
}

async fn register(bus: &TaskBus<MemoryStore>, user_id: UserId, company_id: CompanyId) -> String {
    bus.provision_legacy_token(user_id, "legacy-token");
    bus.register(
        RegisterRequest {
            agent_id: "agent-1".to_string(),
            company_id,
            user_id,
            hostname: "host".to_string(),
            platform: "linux".to_string(),
            version: "1.0.0".to_string(),
        },
        "legacy-token",
    )
    .await
    .unwrap()
    .api_key
}

#[tokio::test]
async fn enqueue_poll_and_report_round_trip() {
    let bus = bus();
    let user_id = UserId(uuid::Uuid::new_v4());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let api_key = register(&bus, user_id, company_id).await;

    let task_id = TaskId(uuid::Uuid::new_v4());
    bus.enqueue(AgentTask {
        task_id,
        company_id,
        user_id,
        task_type: TaskType::DiscoverFormPages,
        parameters: serde_json::json!({}),
        status: TaskStatus::Pending,
        result: None,
        error: None,
    })
    .await
    .unwrap();

    let polled = bus.poll_task(user_id, &api_key).await.unwrap();
    assert!(polled.is_some());
    assert_eq!(polled.unwrap().task_id, task_id);

    bus.report_task_status(task_id, TaskStatus::Completed, Some(serde_json::json!({"ok": true})), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn reregistering_mid_queue_invalidates_old_api_key_but_preserves_queue() {
    let bus = bus();
    let user_id = UserId(uuid::Uuid::new_v4());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let old_key = register(&bus, user_id, company_id).await;

    bus.enqueue(AgentTask {
        task_id: TaskId(uuid::Uuid::new_v4()),
        company_id,
        user_id,
        task_type: TaskType::ExecuteSteps,
        parameters: serde_json::json!({}),
        status: TaskStatus::Pending,
        result: None,
        error: None,
    })
    .await
    .unwrap();

    let new_key = register(&bus, user_id, company_id).await;
    assert_ne!(old_key, new_key);

    assert!(matches!(
        bus.poll_task(user_id, &old_key).await,
        Err(TaskBusError::SessionInvalidated)
    ));

    let polled = bus.poll_task(user_id, &new_key).await.unwrap();
    assert!(polled.is_some());
}

#[tokio::test]
async fn cancel_flag_clears_once_the_agent_reports_cancelled() {
    let bus = bus();
    let user_id = UserId(uuid::Uuid::new_v4());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let api_key = register(&bus, user_id, company_id).await;

    let task_id = TaskId(uuid::Uuid::new_v4());
    bus.enqueue(AgentTask {
        task_id,
        company_id,
        user_id,
        task_type: TaskType::ExecuteTest,
        parameters: serde_json::json!({}),
        status: TaskStatus::Pending,
        result: None,
        error: None,
    })
    .await
    .unwrap();

    bus.request_cancel(user_id);
    assert!(bus.heartbeat(user_id, &api_key, AgentStatus::Busy).await.unwrap());

    // A slow agent polling again before acting still sees the flag.
    assert!(bus.heartbeat(user_id, &api_key, AgentStatus::Busy).await.unwrap());

    bus.report_task_status(task_id, TaskStatus::Cancelled, None, None).await.unwrap();

    assert!(!bus.heartbeat(user_id, &api_key, AgentStatus::Idle).await.unwrap());
    assert!(!bus.is_cancel_requested(user_id));
}

#[tokio::test]
async fn jwt_refresh_rejects_stale_api_key_after_reregistration() {
    let bus = bus();
    let user_id = UserId(uuid::Uuid::new_v4());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let old_key = register(&bus, user_id, company_id).await;
    let _new_key = register(&bus, user_id, company_id).await;

    assert!(matches!(
        bus.refresh_token(user_id, &old_key),
        Err(TaskBusError::SessionInvalidated)
    ));
}
