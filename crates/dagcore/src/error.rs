use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// Id of the node whose handler aborted the run, if any.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            FlowError::NodeFailed { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Template error in '{template}': {message}")]
    Template { template: String, message: String },

    #[error("HTTP request to {url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Structural problems with a workflow. None of these let a node run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{node}' requires unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Node '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Result for node '{0}' was already recorded")]
    ResultAlreadyRecorded(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),
}
