//! Controller runtime driven by the change feed.

use std::sync::Arc;
use std::time::Duration;

use flowrun_control_plane::api::{
    ObjectKey, Step, StepState, ThreadSpec, Workflow, WorkflowExecution, WorkflowExecutionSpec,
    WorkflowManifest, WorkflowSpec, WorkflowState, WorkflowStep, WorkflowStepSpec,
};
use flowrun_control_plane::controller::{Controller, ControllerConfig};
use flowrun_control_plane::store::{Client, MemoryStore};

const NS: &str = "default";

fn config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        max_conflict_retries: 5,
        requeue_base: Duration::from_millis(10),
        requeue_max: Duration::from_millis(100),
    }
}

/// Poll `check` until it yields a value or the deadline passes.
async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn step_with_id(client: &Client, id: &str) -> Option<WorkflowStep> {
    client
        .list::<WorkflowStepSpec>(Some(NS))
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.spec.step.id == id)
}

async fn complete(client: &Client, step: &WorkflowStep, output: &str) {
    let mut step = client.get::<WorkflowStepSpec>(&step.key()).await.unwrap();
    step.status.state = StepState::Complete;
    step.status.output = output.to_string();
    step.status.workflow_generation = step.spec.workflow_generation;
    client.update_status(&step).await.unwrap();
}

async fn state_of(client: &Client, name: &str) -> WorkflowExecution {
    client
        .get::<WorkflowExecutionSpec>(&ObjectKey::new(NS, name))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_controller_drives_execution_from_events() {
    let client = Client::new(Arc::new(MemoryStore::new()));
    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();

    client
        .create(&Workflow::new(
            NS,
            "wf",
            WorkflowSpec {
                manifest: WorkflowManifest {
                    steps: vec![Step::prompt("A", "one"), Step::prompt("B", "two")],
                    ..Default::default()
                },
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    client
        .create(&WorkflowExecution::new(
            NS,
            "we1",
            WorkflowExecutionSpec {
                workflow_name: "wf".to_string(),
                workflow_generation: 1,
                ..Default::default()
            },
        ))
        .await
        .unwrap();

    let a = eventually(|| step_with_id(&client, "A")).await;
    complete(&client, &a, "first").await;

    let b = eventually(|| step_with_id(&client, "B")).await;
    complete(&client, &b, "second").await;

    let done = eventually(|| async {
        let we = state_of(&client, "we1").await;
        (we.status.state == WorkflowState::Complete).then_some(we)
    })
    .await;
    assert_eq!(done.status.output, "second");
    assert!(!done.status.thread_name.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_initial_resync_picks_up_existing_executions() {
    let client = Client::new(Arc::new(MemoryStore::new()));
    client
        .create(&Workflow::new(NS, "wf", WorkflowSpec::default()))
        .await
        .unwrap();
    client
        .create(&WorkflowExecution::new(
            NS,
            "before-start",
            WorkflowExecutionSpec {
                workflow_name: "wf".to_string(),
                workflow_generation: 1,
                ..Default::default()
            },
        ))
        .await
        .unwrap();

    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();

    eventually(|| async {
        let we = state_of(&client, "before-start").await;
        (we.status.state == WorkflowState::Complete).then_some(())
    })
    .await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_execution_waits_for_missing_workflow() {
    let client = Client::new(Arc::new(MemoryStore::new()));
    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();

    client
        .create(&WorkflowExecution::new(
            NS,
            "early",
            WorkflowExecutionSpec {
                workflow_name: "late-wf".to_string(),
                workflow_generation: 1,
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state_of(&client, "early").await.status.state, WorkflowState::Pending);

    // The workflow event triggers the waiting execution.
    client
        .create(&Workflow::new(NS, "late-wf", WorkflowSpec::default()))
        .await
        .unwrap();
    eventually(|| async {
        let we = state_of(&client, "early").await;
        (we.status.state == WorkflowState::Complete).then_some(())
    })
    .await;

    handle.shutdown().await;
}

async fn create_one_step_execution(client: &Client, name: &str) {
    client
        .create(&Workflow::new(
            NS,
            "wf",
            WorkflowSpec {
                manifest: WorkflowManifest {
                    steps: vec![Step::prompt("A", "one")],
                    ..Default::default()
                },
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    client
        .create(&WorkflowExecution::new(
            NS,
            name,
            WorkflowExecutionSpec {
                workflow_name: "wf".to_string(),
                workflow_generation: 1,
                ..Default::default()
            },
        ))
        .await
        .unwrap();
}

async fn children_gone(client: &Client) -> Option<()> {
    let steps = client.list::<WorkflowStepSpec>(Some(NS)).await.unwrap();
    let threads = client.list::<ThreadSpec>(Some(NS)).await.unwrap();
    (steps.is_empty() && threads.is_empty()).then_some(())
}

#[tokio::test]
async fn test_deleting_execution_removes_its_children() {
    let client = Client::new(Arc::new(MemoryStore::new()));
    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();

    create_one_step_execution(&client, "we1").await;
    eventually(|| step_with_id(&client, "A")).await;
    eventually(|| async {
        let threads = client.list::<ThreadSpec>(Some(NS)).await.unwrap();
        (!threads.is_empty()).then_some(())
    })
    .await;

    client
        .delete::<WorkflowExecutionSpec>(&ObjectKey::new(NS, "we1"))
        .await
        .unwrap();
    eventually(|| children_gone(&client)).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn test_resync_collects_children_of_executions_deleted_while_stopped() {
    let client = Client::new(Arc::new(MemoryStore::new()));

    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();
    create_one_step_execution(&client, "we1").await;
    eventually(|| step_with_id(&client, "A")).await;
    handle.shutdown().await;

    client
        .delete::<WorkflowExecutionSpec>(&ObjectKey::new(NS, "we1"))
        .await
        .unwrap();
    assert!(children_gone(&client).await.is_none());

    let controller = Arc::new(Controller::new(client.clone(), config()));
    let handle = controller.start().await.unwrap();
    eventually(|| children_gone(&client)).await;

    handle.shutdown().await;
}
