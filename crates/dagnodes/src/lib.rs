//! Standard node library
//!
//! Built-in handlers for the `shell`, `http` and `log` node types, plus the
//! process and HTTP capabilities they run through.

mod http;
mod log;
mod runner;
mod shell;

pub use http::{
    HttpRequest, HttpRequestNode, HttpResponse, HttpTransport, ReqwestTransport,
    DEFAULT_HTTP_TIMEOUT_SECS,
};
pub use log::LogNode;
pub use runner::{
    split_command, CommandInvocation, CommandOutput, CommandRunner, ProcessRunner,
    SimulatedRunner,
};
pub use shell::ShellNode;

use dagruntime::NodeRegistry;
use std::sync::Arc;
use std::time::Duration;

/// How the standard nodes reach the outside world
#[derive(Debug, Clone)]
pub struct NodesConfig {
    /// Simulate shell commands instead of spawning them
    pub dry_run: bool,
    /// Timeout for HTTP nodes that do not set `timeout_secs`
    pub http_timeout: Duration,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry, config: &NodesConfig) {
    let shell = if config.dry_run {
        ShellNode::simulated()
    } else {
        ShellNode::process()
    };
    registry.register(Arc::new(shell));
    registry.register(Arc::new(
        HttpRequestNode::default().with_default_timeout(config.http_timeout),
    ));
    registry.register(Arc::new(LogNode));
}

/// Registry with every standard node registered
pub fn standard_registry(config: &NodesConfig) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, config);
    registry
}
