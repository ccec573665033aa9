//! Implementations of the CLI subcommands.
//!
//! Each command works on a workflow JSON document as the editor saves it.
//! Port lists missing from the document are derived on load.

use crate::error::CliError;
use async_trait::async_trait;
use chainflow_core::{ExecutionId, WorkflowId};
use chainflow_workflow::{
    CollectedValues, CompiledWorkflow, Compiler, ExecutionPhase, ExecutionSession, FieldError,
    InputCollector, MissingInput, NodeId, RunOutcome, RunRequest, RunnerError, Workflow,
    WorkflowRunner, find_missing_required_inputs, run_interactive,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Reads a workflow document and derives any missing ports.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_workflow_file(path: &Path) -> chainflow_core::Result<Workflow, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::ReadFile {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    let mut workflow: Workflow =
        serde_json::from_str(&content).map_err(|e| CliError::ParseWorkflow {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;
    workflow.graph.ensure_ports();

    debug!(
        workflow_id = %workflow.id,
        nodes = workflow.graph.node_count(),
        "loaded workflow file"
    );
    Ok(workflow)
}

/// Parses an `--input nodeId.inputId=value` argument.
///
/// The value is read as JSON when it parses, and as a plain string
/// otherwise.
///
/// # Errors
///
/// Returns `InvalidInputArg` if the argument has no `=` or the key has no `.`.
pub fn parse_input_arg(arg: &str) -> Result<(String, JsonValue), CliError> {
    let invalid = || CliError::InvalidInputArg {
        arg: arg.to_string(),
    };
    let (key, value) = arg.split_once('=').ok_or_else(invalid)?;
    let key = key.trim();
    match key.rsplit_once('.') {
        Some((node, input)) if !node.is_empty() && !input.is_empty() => {}
        _ => return Err(invalid()),
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Result of the `validate` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub workflow_id: WorkflowId,
    pub valid: bool,
    pub errors: Vec<String>,
    pub entry_nodes: Vec<NodeId>,
}

/// Checks the graph, the activation settings and, for a well-formed graph,
/// that the workflow compiles.
#[must_use]
pub fn validate(workflow: &Workflow, compiler: &Compiler) -> ValidationReport {
    let mut errors: Vec<String> = compiler
        .graph_findings(&workflow.graph)
        .iter()
        .map(ToString::to_string)
        .collect();

    if errors.is_empty()
        && let Err(report) = workflow.compile(compiler)
    {
        errors.push(report.current_context().to_string());
    }
    if let Err(err) = workflow.activation.validate() {
        errors.push(err.to_string());
    }

    ValidationReport {
        workflow_id: workflow.id.clone(),
        valid: errors.is_empty(),
        errors,
        entry_nodes: workflow
            .graph
            .entry_nodes()
            .into_iter()
            .map(|n| n.id.clone())
            .collect(),
    }
}

/// Compiles a workflow, optionally under a different id.
///
/// # Errors
///
/// Returns `Compile` if the graph does not compile.
pub fn compile(
    workflow: &Workflow,
    compiler: &Compiler,
    workflow_id: Option<WorkflowId>,
) -> chainflow_core::Result<CompiledWorkflow, CliError> {
    let workflow_id = workflow_id.unwrap_or_else(|| workflow.id.clone());
    compiler
        .compile(&workflow.graph, &workflow_id)
        .map_err(|report| report.context(CliError::Compile { workflow_id }))
}

/// Lists the required inputs that have no value.
///
/// # Errors
///
/// Returns `Compile` if the graph does not compile.
pub fn missing(
    workflow: &Workflow,
    compiler: &Compiler,
) -> chainflow_core::Result<Vec<MissingInput>, CliError> {
    let compiled = compile(workflow, compiler, None)?;
    Ok(find_missing_required_inputs(&compiled))
}

/// Result of the `run` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

impl RunReport {
    /// Returns true if the run completed.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Dry-runs a workflow: resolves its inputs from `inputs` and hands them to
/// a runner that echoes the input map back as its results.
///
/// # Errors
///
/// Returns `Compile` if the graph does not compile, or `Execution` if the
/// session fails.
#[instrument(skip_all, fields(workflow_id = %workflow.id))]
pub async fn dry_run(
    workflow: &Workflow,
    compiler: &Compiler,
    inputs: CollectedValues,
) -> chainflow_core::Result<RunReport, CliError> {
    let compiled = compile(workflow, compiler, None)?;
    let session = ExecutionSession::new(compiled, Arc::new(EchoRunner));
    let collector = ArgsCollector::new(inputs);

    let phase = run_interactive(&session, &collector)
        .await
        .map_err(|report| {
            report.context(CliError::Execution {
                workflow_id: workflow.id.clone(),
            })
        })?;
    info!(phase = %phase, "dry run finished");

    let execution_id = session.request().map(|r| r.execution_id);
    let mut report = RunReport {
        execution_id,
        phase: phase.name().to_string(),
        outcome: None,
        error: None,
        missing: Vec::new(),
        field_errors: Vec::new(),
    };
    match phase {
        ExecutionPhase::Completed(outcome) => report.outcome = Some(outcome),
        ExecutionPhase::Failed { error } => report.error = Some(error),
        _ => {
            report.missing = find_missing_required_inputs(session.compiled());
            report.field_errors = collector.rejected();
        }
    }
    Ok(report)
}

/// A runner that returns its input map as the results.
struct EchoRunner;

#[async_trait]
impl WorkflowRunner for EchoRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
        let started = Instant::now();
        let results = serde_json::to_value(&request.input_map)
            .map_err(|e| RunnerError::new(e.to_string()))?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(RunOutcome::success(results, duration_ms))
    }
}

/// Answers the first prompt with the values given on the command line and
/// gives up on any re-prompt.
struct ArgsCollector {
    values: Mutex<Option<CollectedValues>>,
    rejected: Mutex<Vec<FieldError>>,
}

impl ArgsCollector {
    fn new(values: CollectedValues) -> Self {
        Self {
            values: Mutex::new(Some(values)),
            rejected: Mutex::new(Vec::new()),
        }
    }

    fn rejected(&self) -> Vec<FieldError> {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl InputCollector for ArgsCollector {
    async fn collect(
        &self,
        _missing: &[MissingInput],
        errors: &[FieldError],
    ) -> Option<CollectedValues> {
        if !errors.is_empty() {
            *self.rejected.lock().unwrap_or_else(PoisonError::into_inner) = errors.to_vec();
        }
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
