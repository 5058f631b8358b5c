use async_trait::async_trait;
use dagcore::{HandlerMetadata, NodeAction, NodeContext, NodeError, NodeHandler, NodeSpec};
use serde_json::{json, Value};

/// Prints a templated message, or when no message is given, whatever the
/// node's dependencies produced
pub struct LogNode;

#[async_trait]
impl NodeHandler for LogNode {
    fn node_type(&self) -> &str {
        "log"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        match &spec.action {
            NodeAction::Log(params) if params.message.is_none() && spec.requires.is_empty() => {
                Err(NodeError::Configuration(format!(
                    "log node '{}' has no message and no dependency to print",
                    spec.id
                )))
            }
            NodeAction::Log(_) => Ok(()),
            _ => Err(NodeError::Configuration(format!(
                "node '{}' is not a log node",
                spec.id
            ))),
        }
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        let NodeAction::Log(params) = ctx.action() else {
            return Err(ctx.unexpected_action("log"));
        };

        let message = match &params.message {
            Some(message) => ctx.render(message)?,
            None => upstream_output(&ctx),
        };
        let line = match &params.prefix {
            Some(prefix) => format!("{} {}", prefix, message),
            None => message.clone(),
        };

        tracing::info!("[{}] {}", ctx.node_id(), line);
        ctx.events.info(line);

        Ok(json!({ "output": message }))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Log a templated message or the output of its dependencies".to_string(),
            category: "debug".to_string(),
        }
    }
}

/// Text of every `requires` result, in declaration order. Prefers the
/// `output` field, then an HTTP `body`, then the whole record as JSON.
fn upstream_output(ctx: &NodeContext<'_>) -> String {
    ctx.node
        .requires
        .iter()
        .filter_map(|id| ctx.results.get(id))
        .map(|result| {
            match result.get("output").or_else(|| result.get("body")).unwrap_or(result) {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
