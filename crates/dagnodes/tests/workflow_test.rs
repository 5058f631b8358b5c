use async_trait::async_trait;
use dagcore::{
    FlowError, Inspection, JsonFileExporter, NodeError, ResultStore, RunState, WorkflowSpec,
};
use dagnodes::{standard_registry, HttpRequest, HttpRequestNode, HttpResponse, HttpTransport, NodesConfig};
use dagruntime::{EngineConfig, WorkflowEngine};
use serde_json::json;
use std::sync::Arc;

/// Every request gets the same status
struct StatusTransport(u16);

#[async_trait]
impl HttpTransport for StatusTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, NodeError> {
        Ok(HttpResponse {
            status: self.0,
            content_type: Some("application/json".to_string()),
            body: r#"{"ok": true}"#.to_string(),
        })
    }
}

fn engine_with_http_status(status: u16) -> WorkflowEngine {
    let mut registry = standard_registry(&NodesConfig {
        dry_run: true,
        ..NodesConfig::default()
    });
    registry.register(Arc::new(HttpRequestNode::new(Arc::new(StatusTransport(status)))));
    WorkflowEngine::new(Arc::new(registry), EngineConfig::default()).unwrap()
}

fn document() -> WorkflowSpec {
    WorkflowSpec::from_json(
        r#"{
            "name": "pipeline",
            "nodes": [
                {"id": "C", "type": "log", "requires": ["B"], "message": "status {{ results.B.status }}"},
                {"id": "A", "command": "echo start"},
                {"id": "B", "type": "http", "requires": ["A"], "url": "https://example.com/{{ results.A.output }}"}
            ]
        }"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_dry_run_passes_output_to_dependent() {
    let engine = WorkflowEngine::new(
        Arc::new(standard_registry(&NodesConfig {
            dry_run: true,
            ..NodesConfig::default()
        })),
        EngineConfig::default(),
    )
    .unwrap();
    let workflow = WorkflowSpec::from_json(
        r#"{
            "name": "variables",
            "nodes": [
                {"id": "A", "command": "echo hello"},
                {"id": "B", "requires": ["A"], "command": "echo {{results.A.output}}"}
            ]
        }"#,
    )
    .unwrap();

    let report = engine.run(&workflow).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.results.get("A").unwrap()["output"], json!("Data_from_A"));
    assert_eq!(report.results.get("B").unwrap()["command"], json!("echo Data_from_A"));
}

#[tokio::test]
async fn test_full_pipeline_completes() {
    let engine = engine_with_http_status(200);

    let report = engine.run(&document()).await;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.plan, vec!["A", "B", "C"]);
    assert_eq!(report.results.get("B").unwrap()["url"], json!("https://example.com/Data_from_A"));
    assert_eq!(report.results.get("B").unwrap()["body"], json!({"ok": true}));
    assert_eq!(report.results.get("C").unwrap(), &json!({"output": "status 200"}));
}

#[tokio::test]
async fn test_http_failure_keeps_earlier_results() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("workflow_output.json");
    let engine = engine_with_http_status(500)
        .with_exporter(Arc::new(JsonFileExporter::new(&output)));

    let report = engine.run(&document()).await;

    assert_eq!(report.state, RunState::Failed);
    match &report.error {
        Some(FlowError::NodeFailed { node_id, source }) => {
            assert_eq!(node_id, "B");
            assert!(matches!(source, NodeError::HttpStatus { status: 500, .. }));
        }
        other => panic!("expected B to fail, got {:?}", other),
    }
    assert_eq!(report.skipped, vec!["C"]);
    assert!(!report.results.contains("C"));

    let exported = ResultStore::load(&output).unwrap();
    assert_eq!(exported.ids(), vec!["A"]);
    assert_eq!(exported.get("A").unwrap()["output"], json!("Data_from_A"));

    match exported.inspect("C") {
        Inspection::Missing { available } => assert_eq!(available, vec!["A"]),
        Inspection::Found(value) => panic!("C should not have run, found {}", value),
    }
}

#[tokio::test]
async fn test_terminal_log_prints_previous_output() {
    let engine = engine_with_http_status(200);
    let workflow = WorkflowSpec::from_json(
        r#"{
            "name": "legacy",
            "nodes": [
                {"id": "fetch", "type": "httpRequest", "params": {"url": "https://example.com/data"}},
                {"id": "print", "type": "terminalLog", "requires": ["fetch"], "params": {"prefix": "Result:"}}
            ]
        }"#,
    )
    .unwrap();

    let report = engine.run(&workflow).await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.results.get("print").unwrap(), &json!({"output": r#"{"ok":true}"#}));
}
