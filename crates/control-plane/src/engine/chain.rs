//! Step chain construction.
//!
//! A chain is rebuilt from the execution's manifest snapshot on every
//! reconcile. Step names are derived from the step's position and content,
//! so an unchanged manifest always yields byte-identical step objects and
//! the owned-set apply has nothing to write.

use uuid::Uuid;

use crate::api::{Step, WorkflowManifest, WorkflowStep, WorkflowStepSpec};
use crate::error::AppResult;

/// Prefix of generated step object names.
pub const STEP_PREFIX: &str = "wfs1";

pub const EXECUTION_LABEL: &str = "flowrun.dev/workflow-execution";
pub const STEP_ID_LABEL: &str = "flowrun.dev/step-id";

const STEP_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_4b0a_8e51_c2f0_7d3a_9b14);

/// Deterministic name for a step.
pub fn step_name(
    execution_name: &str,
    after_step_name: &str,
    generation: i64,
    step: &Step,
) -> AppResult<String> {
    let definition = serde_json::to_string(step)?;
    let seed = format!("{execution_name}\0{after_step_name}\0{generation}\0{definition}");
    let id = Uuid::new_v5(&STEP_NAMESPACE, seed.as_bytes());

    Ok(format!("{STEP_PREFIX}{}", id.simple()))
}

/// Build the step object for `step`, linked after `after_step_name`.
pub fn new_step(
    namespace: &str,
    execution_name: &str,
    after_step_name: &str,
    generation: i64,
    step: Step,
) -> AppResult<WorkflowStep> {
    let name = step_name(execution_name, after_step_name, generation, &step)?;

    let mut object = WorkflowStep::new(
        namespace,
        name,
        WorkflowStepSpec {
            workflow_execution_name: execution_name.to_string(),
            after_workflow_step_name: after_step_name.to_string(),
            workflow_generation: generation,
            step,
        },
    );
    object
        .metadata
        .labels
        .insert(EXECUTION_LABEL.to_string(), execution_name.to_string());
    object
        .metadata
        .labels
        .insert(STEP_ID_LABEL.to_string(), object.spec.step.id.clone());

    Ok(object)
}

/// Materialize the ordered chain for a manifest snapshot.
///
/// One step per manifest entry, each linked to its predecessor, plus the
/// synthetic `output` step when the manifest declares an output expression.
pub fn build_chain(
    namespace: &str,
    execution_name: &str,
    manifest: &WorkflowManifest,
    generation: i64,
) -> AppResult<Vec<WorkflowStep>> {
    let output = manifest.has_output().then(|| Step::output(&manifest.output));

    let mut chain = Vec::with_capacity(manifest.steps.len() + 1);
    let mut after = String::new();

    for step in manifest.steps.iter().cloned().chain(output) {
        let object = new_step(namespace, execution_name, &after, generation, step)?;
        after = object.metadata.name.clone();
        chain.push(object);
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StepKind;
    use crate::api::workflow::OUTPUT_STEP_ID;

    fn manifest() -> WorkflowManifest {
        WorkflowManifest {
            steps: vec![Step::prompt("a", "first"), Step::prompt("b", "second")],
            output: "b.result".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_chain_links_and_output() {
        let chain = build_chain("default", "we1", &manifest(), 3).unwrap();
        assert_eq!(chain.len(), 3);

        assert_eq!(chain[0].spec.after_workflow_step_name, "");
        assert_eq!(chain[1].spec.after_workflow_step_name, chain[0].name());
        assert_eq!(chain[2].spec.after_workflow_step_name, chain[1].name());

        assert_eq!(chain[2].spec.step.id, OUTPUT_STEP_ID);
        assert_eq!(
            chain[2].spec.step.kind,
            StepKind::Output {
                expression: "b.result".to_string()
            }
        );
        assert!(chain.iter().all(|s| s.spec.workflow_generation == 3));
        assert!(chain.iter().all(|s| s.name().starts_with(STEP_PREFIX)));
    }

    #[test]
    fn test_chain_is_deterministic() {
        let first = build_chain("default", "we1", &manifest(), 1).unwrap();
        let second = build_chain("default", "we1", &manifest(), 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_names_depend_on_generation_and_content() {
        let gen1 = build_chain("default", "we1", &manifest(), 1).unwrap();
        let gen2 = build_chain("default", "we1", &manifest(), 2).unwrap();
        assert_ne!(gen1[0].name(), gen2[0].name());

        let mut edited = manifest();
        edited.steps[1] = Step::prompt("b", "changed");
        let edited = build_chain("default", "we1", &edited, 1).unwrap();
        assert_eq!(gen1[0].name(), edited[0].name());
        assert_ne!(gen1[1].name(), edited[1].name());
        // Successors of a changed step are renamed through the link.
        assert_ne!(gen1[2].name(), edited[2].name());
    }

    #[test]
    fn test_output_only_chain() {
        let m = WorkflowManifest {
            output: "input.value".to_string(),
            ..Default::default()
        };
        let chain = build_chain("default", "we1", &m, 1).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].spec.step.id, OUTPUT_STEP_ID);

        let empty = build_chain("default", "we1", &WorkflowManifest::default(), 1).unwrap();
        assert!(empty.is_empty());
    }
}
