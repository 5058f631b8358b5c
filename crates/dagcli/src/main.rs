// crates/dagcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dagcore::{
    ExecutionEvent, Inspection, JsonFileExporter, NodeEvent, NodeSpec, ResultStore, WorkflowSpec,
    DEFAULT_OUTPUT_FILE,
};
use dagnodes::{standard_registry, NodesConfig, DEFAULT_HTTP_TIMEOUT_SECS};
use dagruntime::{load_workflow, EngineConfig, WorkflowEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dagrun")]
#[command(about = "Declarative DAG task runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Print shell commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Where to write the results
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Do not write results when a node fails
        #[arg(long)]
        no_export_on_failure: bool,

        /// Timeout in seconds for HTTP nodes without their own
        #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
        http_timeout: u64,
    },

    /// Show the stored result of one node from the last run
    Inspect {
        /// Node id to look up
        node_id: String,

        /// Results file written by `run`
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,
    },

    /// Check a workflow file without executing it
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

/// Progress goes through the event printer, so plain runs only log problems
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            verbose,
            dry_run,
            output,
            no_export_on_failure,
            http_timeout,
        } => {
            init_tracing(verbose);
            let nodes = NodesConfig {
                dry_run,
                http_timeout: Duration::from_secs(http_timeout),
            };
            let engine = EngineConfig {
                export_on_failure: !no_export_on_failure,
                ..EngineConfig::default()
            };
            run_workflow(file, output, nodes, engine, verbose).await?;
        }

        Commands::Inspect { node_id, output } => {
            init_tracing(false);
            inspect_node(&node_id, output)?;
        }

        Commands::Validate { file } => {
            init_tracing(false);
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

async fn run_workflow(
    file: PathBuf,
    output: PathBuf,
    nodes: NodesConfig,
    config: EngineConfig,
    verbose: bool,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(&file)?;
    tracing::debug!(
        "Loaded workflow '{}' with {} nodes",
        workflow.name,
        workflow.nodes.len()
    );

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    if nodes.dry_run {
        println!("   Mode: dry run (shell commands are simulated)");
    }
    println!();

    let export_on_failure = config.export_on_failure;
    let registry = standard_registry(&nodes);
    let engine = WorkflowEngine::new(Arc::new(registry), config)?
        .with_exporter(Arc::new(JsonFileExporter::new(&output)));

    // Subscribe to events for real-time output
    let events = engine.subscribe_events();
    let printer = tokio::spawn(print_events(events, verbose));

    let report = engine.run(&workflow).await;

    // Dropping the engine closes the channel; the printer drains and exits
    drop(engine);
    printer.await.context("event printer stopped unexpectedly")?;

    println!();
    println!("📊 Execution Summary:");
    println!("   Run ID: {}", report.run_id);
    println!("   State: {}", report.state);
    println!(
        "   Completed: {}/{} nodes",
        report.results.len(),
        workflow.nodes.len()
    );
    if !report.skipped.is_empty() {
        println!("   Skipped: {}", report.skipped.join(", "));
    }
    let exported = report.is_success() || (export_on_failure && !report.plan.is_empty());
    if exported && output.exists() {
        println!("   Results: {}", output.display());
    }

    match report.error {
        Some(err) => bail!("workflow '{}' failed: {}", workflow.name, err),
        None => Ok(()),
    }
}

async fn print_events(mut events: broadcast::Receiver<ExecutionEvent>, verbose: bool) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(event, verbose),
            Err(RecvError::Lagged(missed)) => println!("     … {} events not shown", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: ExecutionEvent, verbose: bool) {
    match event {
        ExecutionEvent::RunStarted { .. } => {
            println!("▶️  Workflow started");
        }
        ExecutionEvent::StateChanged { state, .. } => {
            if verbose {
                println!("   ↳ {}", state);
            }
        }
        ExecutionEvent::PlanReady { order, .. } => {
            if verbose {
                println!("🧭 Plan: {}", order.join(" → "));
            }
        }
        ExecutionEvent::NodeStarted {
            node_id, node_type, ..
        } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            result,
            duration_ms,
            ..
        } => {
            println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
            if verbose {
                let pretty = serde_json::to_string_pretty(&result).unwrap_or_default();
                for line in pretty.lines() {
                    println!("       {}", line);
                }
            }
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::NodeSkipped { node_id, .. } => {
            println!("  ⏭️  Node {} skipped", node_id);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", node_id, message);
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", node_id, message);
            }
        },
        ExecutionEvent::RunCompleted {
            success,
            duration_ms,
            ..
        } => {
            if success {
                println!("✨ Workflow completed successfully in {}ms", duration_ms);
            } else {
                println!("💥 Workflow failed after {}ms", duration_ms);
            }
        }
    }
}

fn inspect_node(node_id: &str, output: PathBuf) -> Result<()> {
    let store = ResultStore::load(&output)
        .with_context(|| format!("cannot read results from {}", output.display()))?;

    match store.inspect(node_id) {
        Inspection::Found(value) => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Inspection::Missing { available } => {
            println!("🔍 No result for '{}' in {}", node_id, output.display());
            if available.is_empty() {
                println!("   The last run recorded no results.");
            } else {
                println!("   Available ids:");
                for id in available {
                    println!("   • {}", id);
                }
            }
        }
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let registry = standard_registry(&NodesConfig {
        dry_run: true,
        ..NodesConfig::default()
    });
    let engine = WorkflowEngine::new(Arc::new(registry), EngineConfig::default())?;
    let plan = engine.validate(&workflow)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Execution order: {}", plan.order().join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = standard_registry(&NodesConfig::default());

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    if output.exists() {
        bail!("{} already exists; pick another path with --output", output.display());
    }

    let mut workflow = WorkflowSpec::new("Example HTTP Workflow");
    workflow.description = Some("Fetches data from an API and logs the result".to_string());

    workflow.add_node(NodeSpec::shell("greet", "echo hello"));
    workflow.add_node(
        NodeSpec::http("fetch", "https://api.github.com/zen").with_dependency("greet"),
    );
    workflow.add_node(
        NodeSpec::log("report", "{{ results.greet.output }}: {{ results.fetch.body }}")
            .with_dependency("fetch"),
    );

    // Save to file
    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  dagrun run {}", output.display());

    Ok(())
}
