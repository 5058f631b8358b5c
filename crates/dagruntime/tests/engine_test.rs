use async_trait::async_trait;
use dagcore::{
    ExecutionEvent, FlowError, JsonFileExporter, NodeAction, NodeContext, NodeError, NodeHandler,
    NodeSpec, RunState, WorkflowError, WorkflowSpec,
};
use dagruntime::{EngineConfig, NodeRegistry, WorkflowEngine};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

/// Shell stand-in: renders the command and echoes a fixed output
struct RecordingShell {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NodeHandler for RecordingShell {
    fn node_type(&self) -> &str {
        "shell"
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        let NodeAction::Shell(params) = ctx.action() else {
            return Err(ctx.unexpected_action("shell"));
        };
        let command = ctx.render(&params.command)?;
        self.calls.lock().unwrap().push(ctx.node_id().to_string());
        Ok(json!({
            "command": command,
            "output": format!("Data_from_{}", ctx.node_id()),
        }))
    }
}

/// Always fails the way a bad HTTP response would
struct Failing;

#[async_trait]
impl NodeHandler for Failing {
    fn node_type(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        Err(NodeError::HttpStatus {
            status: 503,
            url: "http://example.invalid".to_string(),
        })
    }
}

/// Rejects every declaration at validation time
struct Picky;

#[async_trait]
impl NodeHandler for Picky {
    fn node_type(&self) -> &str {
        "picky"
    }

    async fn execute(&self, _ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        Ok(Value::Null)
    }

    fn validate(&self, _spec: &NodeSpec) -> Result<(), NodeError> {
        Err(NodeError::Configuration("picky nodes are never valid".to_string()))
    }
}

struct Harness {
    engine: WorkflowEngine,
    calls: Arc<Mutex<Vec<String>>>,
}

fn harness(config: EngineConfig) -> Harness {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(RecordingShell {
        calls: calls.clone(),
    }));
    registry.register(Arc::new(Failing));
    registry.register(Arc::new(Picky));

    let engine = WorkflowEngine::new(Arc::new(registry), config).unwrap();
    Harness { engine, calls }
}

fn executed(h: &Harness) -> Vec<String> {
    h.calls.lock().unwrap().clone()
}

fn fail_node(id: &str) -> NodeSpec {
    NodeSpec::custom(id, "fail", Map::new())
}

#[tokio::test]
async fn test_results_flow_into_later_templates() {
    let h = harness(EngineConfig::default());
    let workflow = WorkflowSpec::new("chain")
        .with_node(NodeSpec::shell("C", "echo {{ results.A.output }} {{ results.B.output }}").with_dependency("B"))
        .with_node(NodeSpec::shell("B", "echo {{results.A.output}}").with_dependency("A"))
        .with_node(NodeSpec::shell("A", "echo start"));

    let report = h.engine.run(&workflow).await;

    assert!(report.is_success(), "run failed: {:?}", report.error);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.plan, vec!["A", "B", "C"]);
    assert_eq!(executed(&h), vec!["A", "B", "C"]);
    assert_eq!(report.results.get("B").unwrap()["command"], json!("echo Data_from_A"));
    assert_eq!(
        report.results.get("C").unwrap()["command"],
        json!("echo Data_from_A Data_from_B")
    );
}

#[tokio::test]
async fn test_cycle_runs_nothing() {
    let h = harness(EngineConfig::default());
    let workflow = WorkflowSpec::new("loop")
        .with_node(NodeSpec::shell("solo", "echo ok"))
        .with_node(NodeSpec::shell("a", "echo a").with_dependency("b"))
        .with_node(NodeSpec::shell("b", "echo b").with_dependency("a"));

    let report = h.engine.run(&workflow).await;

    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(
        report.error,
        Some(FlowError::Workflow(WorkflowError::CycleDetected { .. }))
    ));
    assert!(report.results.is_empty());
    assert!(report.plan.is_empty());
    assert!(executed(&h).is_empty());
}

#[tokio::test]
async fn test_structural_errors_run_nothing() {
    let h = harness(EngineConfig::default());

    let duplicate = WorkflowSpec::new("dup")
        .with_node(NodeSpec::shell("a", "echo 1"))
        .with_node(NodeSpec::shell("a", "echo 2"));
    let report = h.engine.run(&duplicate).await;
    assert!(matches!(
        report.error,
        Some(FlowError::Workflow(WorkflowError::DuplicateNode(ref id))) if id == "a"
    ));

    let dangling = WorkflowSpec::new("dangling")
        .with_node(NodeSpec::shell("a", "echo 1"))
        .with_node(NodeSpec::shell("b", "echo 2").with_dependency("ghost"));
    let report = h.engine.run(&dangling).await;
    assert!(matches!(
        report.error,
        Some(FlowError::Workflow(WorkflowError::UnknownDependency { ref dependency, .. })) if dependency == "ghost"
    ));

    assert!(executed(&h).is_empty());
}

#[tokio::test]
async fn test_unknown_type_fails_before_any_node_runs() {
    let h = harness(EngineConfig::default());
    let workflow = WorkflowSpec::new("mystery")
        .with_node(NodeSpec::shell("a", "echo a"))
        .with_node(NodeSpec::custom("b", "carrier-pigeon", Map::new()).with_dependency("a"));

    let report = h.engine.run(&workflow).await;

    assert!(matches!(
        report.error,
        Some(FlowError::Workflow(WorkflowError::UnknownNodeType(ref t))) if t == "carrier-pigeon"
    ));
    assert!(executed(&h).is_empty());
}

#[tokio::test]
async fn test_validation_failure_names_node() {
    let h = harness(EngineConfig::default());
    let workflow = WorkflowSpec::new("picky")
        .with_node(NodeSpec::shell("a", "echo a"))
        .with_node(NodeSpec::custom("p", "picky", Map::new()));

    let report = h.engine.run(&workflow).await;

    assert_eq!(report.failed_node(), Some("p"));
    assert!(executed(&h).is_empty());
}

#[tokio::test]
async fn test_failure_stops_run_and_exports_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("workflow_output.json");
    let h = harness(EngineConfig::default());
    let engine = h.engine.with_exporter(Arc::new(JsonFileExporter::new(&output)));
    let calls = h.calls.clone();

    let workflow = WorkflowSpec::new("partial")
        .with_node(NodeSpec::shell("A", "echo a"))
        .with_node(fail_node("B").with_dependency("A"))
        .with_node(NodeSpec::shell("C", "echo {{ results.B }}").with_dependency("B"));

    let report = engine.run(&workflow).await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.failed_node(), Some("B"));
    match &report.error {
        Some(FlowError::NodeFailed { source, .. }) => {
            assert_eq!(source, &NodeError::HttpStatus { status: 503, url: "http://example.invalid".to_string() });
        }
        other => panic!("expected node failure, got {:?}", other),
    }
    assert_eq!(report.skipped, vec!["C"]);
    assert_eq!(*calls.lock().unwrap(), vec!["A"]);
    assert!(report.results.contains("A"));
    assert!(!report.results.contains("B"));

    let exported: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(exported, json!({"A": {"command": "echo a", "output": "Data_from_A"}}));
}

#[tokio::test]
async fn test_export_on_failure_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");
    let h = harness(EngineConfig {
        export_on_failure: false,
        ..EngineConfig::default()
    });
    let engine = h.engine.with_exporter(Arc::new(JsonFileExporter::new(&output)));

    let workflow = WorkflowSpec::new("partial")
        .with_node(NodeSpec::shell("A", "echo a"))
        .with_node(fail_node("B").with_dependency("A"));

    let report = engine.run(&workflow).await;

    assert!(!report.is_success());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_completed_run_is_exported() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");
    let h = harness(EngineConfig::default());
    let engine = h.engine.with_exporter(Arc::new(JsonFileExporter::new(&output)));

    let workflow = WorkflowSpec::new("ok").with_node(NodeSpec::shell("only", "echo hi"));
    let report = engine.run(&workflow).await;

    let results = report.into_result().unwrap();
    let exported = dagcore::ResultStore::load(&output).unwrap();
    assert_eq!(exported, results);
}

#[tokio::test]
async fn test_export_error_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(EngineConfig::default());
    let engine = h
        .engine
        .with_exporter(Arc::new(JsonFileExporter::new(dir.path().join("no/such/dir.json"))));

    let report = engine
        .run(&WorkflowSpec::new("ok").with_node(NodeSpec::shell("only", "echo hi")))
        .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(matches!(report.error, Some(FlowError::Export(_))));
    assert!(report.results.contains("only"));
}

#[tokio::test]
async fn test_events_follow_execution() {
    let h = harness(EngineConfig::default());
    let mut events = h.engine.subscribe_events();

    let workflow = WorkflowSpec::new("events")
        .with_node(NodeSpec::shell("a", "echo a"))
        .with_node(fail_node("b").with_dependency("a"))
        .with_node(NodeSpec::shell("c", "echo c").with_dependency("b"));
    h.engine.run(&workflow).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ExecutionEvent::NodeStarted { node_id, .. } => seen.push(format!("start:{}", node_id)),
            ExecutionEvent::NodeCompleted { node_id, .. } => seen.push(format!("done:{}", node_id)),
            ExecutionEvent::NodeFailed { node_id, .. } => seen.push(format!("fail:{}", node_id)),
            ExecutionEvent::NodeSkipped { node_id, .. } => seen.push(format!("skip:{}", node_id)),
            ExecutionEvent::StateChanged { state, .. } => seen.push(format!("state:{}", state)),
            ExecutionEvent::RunCompleted { success, .. } => seen.push(format!("success:{}", success)),
            _ => {}
        }
    }

    assert_eq!(
        seen,
        vec![
            "state:graph-built",
            "state:planned",
            "state:running",
            "start:a",
            "done:a",
            "start:b",
            "fail:b",
            "skip:c",
            "state:failed",
            "success:false",
        ]
    );
}

#[tokio::test]
async fn test_validate_returns_plan_without_running() {
    let h = harness(EngineConfig::default());
    let workflow = WorkflowSpec::new("plan")
        .with_node(NodeSpec::shell("b", "echo b").with_dependency("a"))
        .with_node(NodeSpec::shell("a", "echo a"));

    let plan = h.engine.validate(&workflow).unwrap();

    assert_eq!(plan.order(), ["a", "b"]);
    assert!(executed(&h).is_empty());
}

#[test]
fn test_engine_requires_default_shell_handler() {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(Failing));

    let err = WorkflowEngine::new(Arc::new(registry), EngineConfig::default())
        .err()
        .unwrap();
    assert_eq!(err, WorkflowError::UnknownNodeType("shell".to_string()));
}
