//! Mapping of change events to the executions they affect.

use crate::api::{
    ObjectKey, ResourceSpec, RunSpec, ThreadSpec, WorkflowExecutionSpec, WorkflowSpec,
    WorkflowStepSpec,
};
use crate::error::AppResult;
use crate::store::{client::from_raw, Client, WatchEvent};

/// Execution keys to reconcile after `event`.
///
/// - an execution triggers itself
/// - a step triggers the execution owning it
/// - a thread triggers the execution it was created for
/// - a run triggers the execution owning its step and every execution
///   whose result it waits on
/// - a workflow triggers every execution running it
pub async fn keys_for(client: &Client, event: &WatchEvent) -> AppResult<Vec<ObjectKey>> {
    let namespace = event.key.namespace.as_str();

    let keys = match event.kind.as_str() {
        WorkflowExecutionSpec::KIND => vec![event.key.clone()],

        WorkflowStepSpec::KIND => event
            .object
            .as_ref()
            .and_then(|o| o.metadata.owner_name(WorkflowExecutionSpec::KIND))
            .map(|owner| vec![ObjectKey::new(namespace, owner)])
            .unwrap_or_default(),

        ThreadSpec::KIND => match &event.object {
            Some(raw) => {
                let thread = from_raw::<ThreadSpec>(raw.clone())?;
                if thread.spec.workflow_execution_name.is_empty() {
                    Vec::new()
                } else {
                    vec![ObjectKey::new(namespace, thread.spec.workflow_execution_name)]
                }
            }
            None => Vec::new(),
        },

        RunSpec::KIND => {
            let mut keys = Vec::new();

            if let Some(raw) = &event.object {
                let run = from_raw::<RunSpec>(raw.clone())?;
                if !run.spec.workflow_step_name.is_empty() {
                    let step_key = ObjectKey::new(namespace, &run.spec.workflow_step_name);
                    if let Some(step) = client.find::<WorkflowStepSpec>(&step_key).await? {
                        if let Some(owner) = step.metadata.owner_name(WorkflowExecutionSpec::KIND) {
                            keys.push(ObjectKey::new(namespace, owner));
                        }
                    }
                }
            }

            keys.extend(
                client
                    .list::<WorkflowExecutionSpec>(Some(namespace))
                    .await?
                    .into_iter()
                    .filter(|e| e.spec.run_name == event.key.name)
                    .map(|e| e.key()),
            );
            keys
        }

        WorkflowSpec::KIND => client
            .list::<WorkflowExecutionSpec>(Some(namespace))
            .await?
            .into_iter()
            .filter(|e| e.spec.workflow_name == event.key.name)
            .map(|e| e.key())
            .collect(),

        _ => Vec::new(),
    };

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::{
        Run, Step, Thread, Workflow, WorkflowExecution, WorkflowStep,
    };
    use crate::store::client::to_raw;
    use crate::store::{MemoryStore, WatchEventType};

    fn event<S: ResourceSpec>(object: &crate::api::Object<S>) -> WatchEvent {
        WatchEvent::new(WatchEventType::Modified, to_raw(object).unwrap())
    }

    async fn setup() -> (Client, WorkflowExecution) {
        let client = Client::new(Arc::new(MemoryStore::new()));
        let execution = client
            .create(&WorkflowExecution::new(
                "default",
                "we1",
                WorkflowExecutionSpec {
                    workflow_name: "wf".to_string(),
                    run_name: "parent-run".to_string(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        (client, execution)
    }

    #[tokio::test]
    async fn test_execution_and_workflow_events() {
        let (client, execution) = setup().await;

        let keys = keys_for(&client, &event(&execution)).await.unwrap();
        assert_eq!(keys, vec![execution.key()]);

        let workflow = Workflow::new("default", "wf", WorkflowSpec::default());
        let keys = keys_for(&client, &event(&workflow)).await.unwrap();
        assert_eq!(keys, vec![execution.key()]);

        let other = Workflow::new("default", "other", WorkflowSpec::default());
        assert!(keys_for(&client, &event(&other)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_step_and_thread_events() {
        let (client, execution) = setup().await;

        let mut step = WorkflowStep::new(
            "default",
            "wfs1x",
            WorkflowStepSpec {
                workflow_execution_name: "we1".to_string(),
                step: Step::prompt("a", "x"),
                ..Default::default()
            },
        );
        step.metadata.owner_references = vec![execution.owner_reference()];
        let keys = keys_for(&client, &event(&step)).await.unwrap();
        assert_eq!(keys, vec![execution.key()]);

        let thread = Thread::new(
            "default",
            "t1x",
            ThreadSpec {
                workflow_execution_name: "we1".to_string(),
                ..Default::default()
            },
        );
        let keys = keys_for(&client, &event(&thread)).await.unwrap();
        assert_eq!(keys, vec![execution.key()]);
    }

    #[tokio::test]
    async fn test_run_events_reach_owner_and_waiting_children() {
        let (client, child) = setup().await;

        let parent = client
            .create(&WorkflowExecution::new(
                "default",
                "parent",
                WorkflowExecutionSpec {
                    workflow_name: "wf".to_string(),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        let mut step = WorkflowStep::new(
            "default",
            "wfs1p",
            WorkflowStepSpec {
                workflow_execution_name: "parent".to_string(),
                step: Step::prompt("call", "x"),
                ..Default::default()
            },
        );
        step.metadata.owner_references = vec![parent.owner_reference()];
        client.create(&step).await.unwrap();

        let run = Run::new(
            "default",
            "parent-run",
            RunSpec {
                workflow_step_name: "wfs1p".to_string(),
                ..Default::default()
            },
        );
        let keys = keys_for(&client, &event(&run)).await.unwrap();
        assert_eq!(keys, vec![parent.key(), child.key()]);
    }
}
