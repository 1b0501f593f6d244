//! Supervised services feeding the coordination registry
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use agent_team_core::agent::AgentStatus;
use agent_team_core::config::{CoordinationSettings, SupervisorSettings};
use agent_team_core::event::CoordinationEventType;
use agent_team_core::orchestration::{
    AgentServiceManager, BinaryLauncher, LaunchTarget, ServiceEvent,
};
use agent_team_core::service::{ServiceConfig, ServiceStatus};
use agent_team_core::store::{InMemoryStore, RecordStore};
use agent_team_core::task::{TaskAssignmentRequest, TaskRecord, TaskStatus};
use agent_team_core::AgentCoordinator;
use tokio::sync::broadcast;
use tokio::time::timeout;

struct Team {
    manager: AgentServiceManager,
    coordinator: Arc<AgentCoordinator>,
    store: Arc<InMemoryStore>,
}

fn team() -> Team {
    let store = Arc::new(InMemoryStore::new());
    let settings = SupervisorSettings::builder()
        .http_probe(false)
        .grace_period_secs(2)
        .build()
        .unwrap();
    let launcher = BinaryLauncher::new(LaunchTarget::new("sleep").arg("30")).with_program(
        "flaky_worker",
        LaunchTarget::new("sh").arg("-c").arg("exit 7"),
    );
    let manager =
        AgentServiceManager::with_components(settings, store.clone(), Arc::new(launcher), None)
            .unwrap();
    let coordinator =
        Arc::new(AgentCoordinator::new(CoordinationSettings::default(), store.clone()).unwrap());
    manager.add_observer(coordinator.clone());
    Team {
        manager,
        coordinator,
        store,
    }
}

async fn wait_for<F>(events: &mut broadcast::Receiver<ServiceEvent>, matches: F)
where
    F: Fn(&ServiceEvent) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for service event")
}

#[tokio::test]
async fn test_supervised_agent_receives_and_completes_work() {
    let team = team();
    let config = ServiceConfig::builder()
        .id("svc-1")
        .agent_type("qa_engineer")
        .capability("testing")
        .build()
        .unwrap();

    let instance = team.manager.start(config).await.unwrap();
    let port = instance.port.unwrap();
    assert!((3001..=4000).contains(&port));
    assert_eq!(instance.status, ServiceStatus::Running);

    // Observers run before start returns, so the agent is already routable
    let agent = team.coordinator.get_agent("svc-1").await.unwrap();
    assert_eq!(agent.agent_type, "qa_engineer");
    assert_eq!(agent.status, AgentStatus::Idle);

    team.coordinator
        .create_task(TaskRecord::new("t1", "Run regression suite"))
        .await
        .unwrap();
    let assigned = team
        .coordinator
        .assign_task(TaskAssignmentRequest::new("t1").requirement("testing"))
        .await
        .unwrap();
    assert_eq!(assigned, "svc-1");

    let busy = team.coordinator.get_agent("svc-1").await.unwrap();
    assert_eq!(busy.workload, 1);
    assert_eq!(busy.status, AgentStatus::Busy);

    let outcome = team
        .coordinator
        .complete_task("t1", "svc-1", Some(serde_json::json!({"passed": 42})))
        .await
        .unwrap();
    assert!(outcome.unblocked.is_empty());

    let idle = team.coordinator.get_agent("svc-1").await.unwrap();
    assert_eq!(idle.workload, 0);
    assert_eq!(idle.status, AgentStatus::Idle);
    assert_eq!(
        team.coordinator.get_task("t1").await.unwrap().status,
        TaskStatus::Completed
    );

    team.manager.stop("svc-1").await.unwrap();
    assert!(team
        .coordinator
        .get_agent("svc-1")
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        team.store
            .find_agent("svc-1")
            .await
            .unwrap()
            .unwrap()
            .status,
        AgentStatus::Offline
    );

    let kinds: Vec<_> = team
        .coordinator
        .get_coordination_events(10)
        .into_iter()
        .map(|event| event.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            CoordinationEventType::AgentStarted,
            CoordinationEventType::TaskAssigned,
            CoordinationEventType::TaskCompleted,
            CoordinationEventType::AgentStopped,
        ]
    );
}

#[tokio::test]
async fn test_crashed_service_is_not_routable() {
    let team = team();
    let mut events = team.manager.subscribe();

    let config = ServiceConfig::builder()
        .id("svc-crash")
        .agent_type("flaky_worker")
        .build()
        .unwrap();
    team.manager.start(config).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ServiceEvent::Exited { .. })).await;

    let agent = team.coordinator.get_agent("svc-crash").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Error);

    team.coordinator
        .create_task(TaskRecord::new("t1", "Anything"))
        .await
        .unwrap();
    let err = team
        .coordinator
        .assign_task(TaskAssignmentRequest::new("t1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_AVAILABLE_AGENT");
}

#[tokio::test]
async fn test_dependent_task_follows_completion() {
    let team = team();
    for id in ["svc-a", "svc-b"] {
        let config = ServiceConfig::builder()
            .id(id)
            .agent_type("developer")
            .build()
            .unwrap();
        team.manager.start(config).await.unwrap();
    }

    team.coordinator
        .create_task(TaskRecord::new("build", "Build"))
        .await
        .unwrap();
    team.coordinator
        .create_task(TaskRecord::new("deploy", "Deploy").with_dependency("build"))
        .await
        .unwrap();

    let builder = team
        .coordinator
        .assign_task(TaskAssignmentRequest::new("build"))
        .await
        .unwrap();
    assert_eq!(builder, "svc-a");

    let outcome = team
        .coordinator
        .complete_task("build", &builder, None)
        .await
        .unwrap();
    assert_eq!(outcome.unblocked.len(), 1);
    assert_eq!(outcome.unblocked[0].task_id, "deploy");
    // Both agents are idle again, so the tie breaks on id
    assert_eq!(outcome.unblocked[0].agent_id, "svc-a");
    assert_eq!(
        team.coordinator.get_task("deploy").await.unwrap().status,
        TaskStatus::Assigned
    );

    team.manager.shutdown_all().await.unwrap();
    assert!(team.coordinator.get_active_agents().await.is_empty());
}
