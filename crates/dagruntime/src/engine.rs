use crate::config::EngineConfig;
use crate::graph::DependencyGraph;
use crate::planner::{ExecutionPlanner, Plan};
use crate::registry::NodeRegistry;
use chrono::Utc;
use dagcore::{
    EventBus, ExecutionEvent, FlowError, NodeContext, NodeHandler, NodeId, NodeSpec,
    ResultExporter, ResultStore, RunId, RunState, TemplateRenderer, WorkflowError, WorkflowSpec,
    DEFAULT_NODE_TYPE,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Runs workflows one node at a time in dependency order.
///
/// A handler error stops the run: later nodes are skipped, results recorded
/// so far are kept and, unless disabled, exported.
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    renderer: TemplateRenderer,
    event_bus: Arc<EventBus>,
    exporter: Option<Arc<dyn ResultExporter>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine. The registry must serve the default `shell` type.
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig) -> Result<Self, WorkflowError> {
        if !registry.contains(DEFAULT_NODE_TYPE) {
            return Err(WorkflowError::UnknownNodeType(DEFAULT_NODE_TYPE.to_string()));
        }

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Ok(Self {
            registry,
            renderer: TemplateRenderer::new(),
            event_bus,
            exporter: None,
            config,
        })
    }

    /// Report through an existing bus instead of a private one
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ResultExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Build, plan and check a workflow without running any node
    pub fn validate(&self, workflow: &WorkflowSpec) -> Result<Plan, FlowError> {
        let graph = DependencyGraph::from_workflow(workflow)?;
        let plan = ExecutionPlanner::plan(&graph)?;
        self.resolve_handlers(&graph, &plan)?;
        Ok(plan)
    }

    /// Execute a workflow and report how far it got
    pub async fn run(&self, workflow: &WorkflowSpec) -> RunReport {
        let run_id = RunId::new_v4();
        let started = Instant::now();

        self.event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow: workflow.name.clone(),
            node_count: workflow.nodes.len(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Starting workflow '{}' ({} nodes), run {}",
            workflow.name,
            workflow.nodes.len(),
            run_id
        );

        let mut run = RunTracker::new(run_id, &self.event_bus);
        let mut report = RunReport::new(run_id, &workflow.name);

        let mut error = self.drive(workflow, &mut run, &mut report).await.err();
        let reached_running = run.state == RunState::Running;

        let export = match error {
            None => true,
            Some(_) => reached_running && self.config.export_on_failure,
        };
        if export {
            if let Some(exporter) = &self.exporter {
                if let Err(e) = exporter.export(&report.results) {
                    tracing::error!("Failed to export results of run {}: {}", run_id, e);
                    error.get_or_insert(e);
                }
            }
        }

        match &error {
            None => {
                run.transition(RunState::Completed);
                tracing::info!("Workflow '{}' completed", workflow.name);
            }
            Some(e) => {
                run.transition(RunState::Failed);
                tracing::error!("Workflow '{}' failed: {}", workflow.name, e);
            }
        }

        report.state = run.state;
        report.error = error;
        report.duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.emit(ExecutionEvent::RunCompleted {
            run_id,
            success: report.is_success(),
            duration_ms: report.duration_ms,
            timestamp: Utc::now(),
        });

        report
    }

    async fn drive(
        &self,
        workflow: &WorkflowSpec,
        run: &mut RunTracker<'_>,
        report: &mut RunReport,
    ) -> Result<(), FlowError> {
        let graph = DependencyGraph::from_workflow(workflow)?;
        run.transition(RunState::GraphBuilt);

        let plan = ExecutionPlanner::plan(&graph)?;
        let handlers = self.resolve_handlers(&graph, &plan)?;
        tracing::debug!("Execution order: {:?}", plan.order());
        report.plan = plan.order().to_vec();
        self.event_bus.emit(ExecutionEvent::PlanReady {
            run_id: run.run_id,
            order: report.plan.clone(),
            timestamp: Utc::now(),
        });
        run.transition(RunState::Planned);

        run.transition(RunState::Running);
        for (position, (spec, handler)) in handlers.iter().enumerate() {
            self.event_bus.emit(ExecutionEvent::NodeStarted {
                run_id: run.run_id,
                node_id: spec.id.clone(),
                node_type: spec.node_type().to_string(),
                timestamp: Utc::now(),
            });
            tracing::info!("Running node {} ({})", spec.id, spec.node_type());

            let ctx = NodeContext::new(
                spec,
                &report.results,
                &self.renderer,
                self.event_bus.create_emitter(run.run_id, spec.id.clone()),
            );
            let node_started = Instant::now();
            let outcome = handler.execute(ctx).await;
            let duration_ms = node_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    tracing::info!("Node {} completed in {}ms", spec.id, duration_ms);
                    self.event_bus.emit(ExecutionEvent::NodeCompleted {
                        run_id: run.run_id,
                        node_id: spec.id.clone(),
                        result: result.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    report.results.record(spec.id.clone(), result)?;
                }
                Err(e) => {
                    tracing::error!("Node {} failed: {}", spec.id, e);
                    self.event_bus.emit(ExecutionEvent::NodeFailed {
                        run_id: run.run_id,
                        node_id: spec.id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });

                    for (rest, _) in &handlers[position + 1..] {
                        tracing::debug!("Skipping node {}", rest.id);
                        report.skipped.push(rest.id.clone());
                        self.event_bus.emit(ExecutionEvent::NodeSkipped {
                            run_id: run.run_id,
                            node_id: rest.id.clone(),
                            timestamp: Utc::now(),
                        });
                    }

                    return Err(FlowError::NodeFailed {
                        node_id: spec.id.clone(),
                        source: e,
                    });
                }
            }
        }

        Ok(())
    }

    /// Pair every planned node with its handler and let the handler vet the
    /// declaration, so a bad node fails the run before anything executes.
    fn resolve_handlers<'g>(
        &self,
        graph: &'g DependencyGraph,
        plan: &Plan,
    ) -> Result<Vec<(&'g NodeSpec, Arc<dyn NodeHandler>)>, FlowError> {
        plan.iter()
            .map(|id| -> Result<(&'g NodeSpec, Arc<dyn NodeHandler>), FlowError> {
                let spec = graph
                    .node(id)
                    .ok_or_else(|| WorkflowError::Invalid(format!("planned node {} is not in the graph", id)))?;
                let handler = self.registry.dispatch(spec.node_type())?;
                handler
                    .validate(spec)
                    .map_err(|source| FlowError::NodeFailed {
                        node_id: spec.id.clone(),
                        source,
                    })?;
                Ok((spec, handler))
            })
            .collect()
    }
}

/// Tracks the state machine of one run and announces each transition
struct RunTracker<'a> {
    run_id: RunId,
    state: RunState,
    event_bus: &'a EventBus,
}

impl<'a> RunTracker<'a> {
    fn new(run_id: RunId, event_bus: &'a EventBus) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            event_bus,
        }
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Run {}: {} -> {}", self.run_id, self.state, next);
        self.state = next;
        self.event_bus.emit(ExecutionEvent::StateChanged {
            run_id: self.run_id,
            state: next,
            timestamp: Utc::now(),
        });
    }
}

/// Result of workflow execution
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub workflow: String,
    pub state: RunState,
    /// Planned order; empty when the run failed before planning finished
    pub plan: Vec<NodeId>,
    pub results: ResultStore,
    /// Planned nodes that never ran because an earlier node failed
    pub skipped: Vec<NodeId>,
    pub error: Option<FlowError>,
    pub duration_ms: u64,
}

impl RunReport {
    fn new(run_id: RunId, workflow: &str) -> Self {
        Self {
            run_id,
            workflow: workflow.to_string(),
            state: RunState::Idle,
            plan: Vec::new(),
            results: ResultStore::new(),
            skipped: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn failed_node(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.failed_node())
    }

    pub fn into_result(self) -> Result<ResultStore, FlowError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }
}
