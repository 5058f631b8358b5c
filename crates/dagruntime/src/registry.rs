use dagcore::{HandlerMetadata, NodeHandler, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available node types
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own type tag
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let node_type = handler.node_type().to_string();
        self.register_as(node_type, handler);
    }

    /// Register a handler under an explicit tag, replacing any previous one
    pub fn register_as(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        let node_type = node_type.into();
        tracing::debug!("Registering node type: {}", node_type);
        if self.handlers.insert(node_type.clone(), handler).is_some() {
            tracing::warn!("Node type {} was registered twice; keeping the latest", node_type);
        }
    }

    /// Look up the handler for a type tag
    pub fn dispatch(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>, WorkflowError> {
        self.handlers
            .get(node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<HandlerMetadata> {
        self.handlers.get(node_type).map(|h| h.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
