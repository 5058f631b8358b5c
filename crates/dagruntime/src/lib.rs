//! Workflow execution runtime
//!
//! This crate turns a parsed workflow into a dependency graph, plans a
//! deterministic execution order, dispatches each node to its registered
//! handler and records the results.

mod config;
mod engine;
mod graph;
mod loader;
mod planner;
mod registry;

pub use config::EngineConfig;
pub use engine::{RunReport, WorkflowEngine};
pub use graph::DependencyGraph;
pub use loader::{load_workflow, LoadError};
pub use planner::{ExecutionPlanner, Plan};
pub use registry::NodeRegistry;
