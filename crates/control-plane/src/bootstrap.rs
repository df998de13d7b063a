//! Startup loading of workflow templates from YAML files.
//!
//! Each `*.yaml` / `*.yml` file in the directory holds one workflow:
//!
//! ```yaml
//! metadata:
//!   namespace: default
//!   name: greet
//! spec:
//!   manifest:
//!     steps:
//!       - id: hello
//!         kind: prompt
//!         step: Say hello
//!     output: hello.result
//! ```
//!
//! A missing namespace means `default`.

use std::path::Path;

use tracing::{info, warn};

use crate::api::Workflow;
use crate::error::{AppError, AppResult};
use crate::services::WorkflowService;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Parse one workflow document.
pub fn parse_workflow(source: &str) -> AppResult<Workflow> {
    let mut workflow: Workflow = serde_yaml::from_str(source)?;
    if workflow.metadata.namespace.is_empty() {
        workflow.metadata.namespace = DEFAULT_NAMESPACE.to_string();
    }
    if workflow.metadata.name.is_empty() {
        return Err(AppError::Parse("workflow has no metadata.name".to_string()));
    }
    Ok(workflow)
}

/// Create or update every workflow found in `dir`.
///
/// Files are applied in name order. Returns the number of workflows loaded.
pub async fn load_workflows(service: &WorkflowService, dir: &Path) -> AppResult<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::Config(format!("reading {}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::Config(format!("reading {}: {}", dir.display(), e)))?
    {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = 0;
    for path in paths {
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::Config(format!("reading {}: {}", path.display(), e)))?;

        let workflow = match parse_workflow(&source) {
            Ok(workflow) => workflow,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        service.upsert(&workflow.key(), workflow.spec).await?;
        loaded += 1;
    }

    info!("Loaded {} workflows from {}", loaded, dir.display());
    Ok(loaded)
}
