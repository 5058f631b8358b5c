use dagcore::WorkflowSpec;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to turn a file into a workflow, before the engine is involved
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read workflow file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workflow file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowSpec, LoadError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let workflow = WorkflowSpec::from_json(&json).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        "Loaded workflow '{}' with {} nodes from {}",
        workflow.name,
        workflow.nodes.len(),
        path.display()
    );
    Ok(workflow)
}
