use crate::{
    events::EventEmitter, NodeAction, NodeError, NodeSpec, ResultStore, TemplateRenderer,
};
use async_trait::async_trait;
use serde_json::Value;

/// Core trait that every node type implements
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Type tag this handler serves (e.g., "shell", "http")
    fn node_type(&self) -> &str;

    /// Execute one node and return the value recorded under its id
    async fn execute(&self, ctx: NodeContext<'_>) -> Result<Value, NodeError>;

    /// Optional: reject a declaration before any node of the run executes
    fn validate(&self, _spec: &NodeSpec) -> Result<(), NodeError> {
        Ok(())
    }

    /// Optional: description shown by `dagrun nodes`
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Everything a handler may look at while it runs
pub struct NodeContext<'a> {
    pub node: &'a NodeSpec,

    /// Results of every node that finished before this one
    pub results: &'a ResultStore,

    pub renderer: &'a TemplateRenderer,

    pub events: EventEmitter,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node: &'a NodeSpec,
        results: &'a ResultStore,
        renderer: &'a TemplateRenderer,
        events: EventEmitter,
    ) -> Self {
        Self {
            node,
            results,
            renderer,
            events,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn action(&self) -> &NodeAction {
        &self.node.action
    }

    /// Render a parameter against the results recorded so far
    pub fn render(&self, template: &str) -> Result<String, NodeError> {
        self.renderer.render(template, self.results)
    }

    pub fn render_value(&self, value: &Value) -> Result<Value, NodeError> {
        self.renderer.render_value(value, self.results)
    }

    /// Error for a handler that was dispatched a node of another shape
    pub fn unexpected_action(&self, expected: &str) -> NodeError {
        NodeError::Configuration(format!(
            "node '{}' has type '{}', expected '{}'",
            self.node.id,
            self.node.node_type(),
            expected
        ))
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}
