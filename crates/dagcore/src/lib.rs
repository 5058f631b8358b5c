//! Core abstractions for the dagrun task runner
//!
//! This crate provides the workflow data model, the error taxonomy, the
//! handler contract, template rendering and the result store. It knows
//! nothing about graphs or scheduling.

mod error;
pub mod events;
mod node;
mod results;
mod template;
mod workflow;

pub use error::{FlowError, NodeError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, NodeEvent, RunId, RunState};
pub use node::{HandlerMetadata, NodeContext, NodeHandler};
pub use results::{Inspection, JsonFileExporter, ResultExporter, ResultStore, DEFAULT_OUTPUT_FILE};
pub use template::TemplateRenderer;
pub use workflow::{
    HttpParams, LogParams, NodeAction, NodeId, NodeSpec, ShellParams, WorkflowSpec,
    DEFAULT_NODE_TYPE,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
