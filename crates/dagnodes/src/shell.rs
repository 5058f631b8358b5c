use crate::runner::{split_command, CommandInvocation, CommandRunner, ProcessRunner, SimulatedRunner};
use async_trait::async_trait;
use dagcore::{HandlerMetadata, NodeAction, NodeContext, NodeError, NodeHandler, NodeSpec};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Runs the node's `command` after rendering it against earlier results
pub struct ShellNode {
    runner: Arc<dyn CommandRunner>,
}

/// What a shell node leaves in the result store
#[derive(Debug, Serialize)]
struct ShellRecord {
    command: String,
    argv: Vec<String>,
    /// Trimmed stdout, the field later templates usually want
    output: String,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    success: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    simulated: bool,
}

impl ShellNode {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Shell node that spawns real processes
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessRunner))
    }

    /// Shell node that only pretends to run commands
    pub fn simulated() -> Self {
        Self::new(Arc::new(SimulatedRunner))
    }
}

#[async_trait]
impl NodeHandler for ShellNode {
    fn node_type(&self) -> &str {
        "shell"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        match &spec.action {
            NodeAction::Shell(params) if params.command.trim().is_empty() => Err(
                NodeError::Configuration(format!("shell node '{}' has no command", spec.id)),
            ),
            NodeAction::Shell(_) => Ok(()),
            _ => Err(NodeError::Configuration(format!(
                "node '{}' is not a shell node",
                spec.id
            ))),
        }
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        let NodeAction::Shell(params) = ctx.action() else {
            return Err(ctx.unexpected_action("shell"));
        };

        // Split before rendering: a substituted value is always one argument
        let argv = split_command(&params.command)?
            .iter()
            .map(|word| ctx.render(word))
            .collect::<Result<Vec<_>, _>>()?;
        let command = ctx.render(&params.command)?;
        if argv.first().map_or(true, |program| program.is_empty()) {
            return Err(NodeError::Configuration(format!(
                "command of node '{}' rendered to nothing",
                ctx.node_id()
            )));
        }

        tracing::debug!("[{}] $ {}", ctx.node_id(), command);
        ctx.events.info(format!("$ {}", command));

        let invocation = CommandInvocation {
            node_id: ctx.node_id().to_string(),
            command,
            argv,
        };
        let output = self.runner.run(&invocation).await?;

        if !output.stderr.is_empty() {
            ctx.events.warn(format!("stderr: {}", output.stderr.trim_end()));
        }

        let success = output.success();
        if !success && !params.allow_failure {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(NodeError::ExecutionFailed(format!(
                "`{}` exited with {}: {}",
                invocation.command,
                code,
                output.stderr.trim()
            )));
        }

        let record = ShellRecord {
            command: invocation.command,
            argv: invocation.argv,
            output: output.stdout.trim().to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            success,
            simulated: output.simulated,
        };
        serde_json::to_value(record)
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to encode result: {}", e)))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Run a command line (templated) without a shell".to_string(),
            category: "shell".to_string(),
        }
    }
}
