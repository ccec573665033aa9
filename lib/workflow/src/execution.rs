//! Execution request state machine.
//!
//! An [`ExecutionSession`] walks one compiled workflow through
//! `Idle → CollectingInputs → Validating → Executing → {Completed | Failed}`.
//! When nothing is missing the session skips straight to `Executing`. The
//! runner call is the only suspension point; while it is outstanding, further
//! requests are ignored rather than queued.

use crate::compiler::CompiledWorkflow;
use crate::error::ExecutionError;
use crate::port::{PortType, is_blank};
use crate::resolver::{
    CollectedValues, InputMap, MissingInput, coerce, find_missing_required_inputs, lookup, resolve,
};
use async_trait::async_trait;
use chainflow_core::{ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, instrument, warn};

/// What the runner is asked to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub workflow_id: WorkflowId,
    /// One entry per node.
    pub input_map: InputMap,
}

/// Status reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// The runner's report of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub status: RunStatus,
    #[serde(default)]
    pub results: JsonValue,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(results: JsonValue, duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Success,
            results,
            duration_ms,
            error: None,
        }
    }

    /// An outcome with error status.
    #[must_use]
    pub fn failure(error: Option<String>, duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Error,
            results: JsonValue::Null,
            duration_ms,
            error,
        }
    }
}

/// A runner failure. Its message is surfaced to the user unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerError {
    pub message: String,
}

impl RunnerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RunnerError {}

/// Executes compiled workflows.
///
/// This abstraction keeps the session independent of how nodes are run
/// against a chain. Timeouts are the runner's concern.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Runs a workflow with the given per-node inputs.
    async fn run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError>;
}

/// Collects missing input values from the user.
#[async_trait]
pub trait InputCollector: Send + Sync {
    /// Asks for values of the missing inputs, showing `errors` from the
    /// previous attempt. Returns `None` if the user cancels.
    async fn collect(
        &self,
        missing: &[MissingInput],
        errors: &[FieldError],
    ) -> Option<CollectedValues>;
}

/// A field-level problem with collected inputs. Recoverable by re-prompting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    /// A required value is absent or blank.
    MissingRequiredInput { key: String },
    /// A value cannot be coerced to its port type.
    InvalidValue { key: String, reason: String },
}

impl FieldError {
    /// The `"nodeId.inputId"` key of the field.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::MissingRequiredInput { key } | Self::InvalidValue { key, .. } => key,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredInput { key } => write!(f, "{key} is required"),
            Self::InvalidValue { key, reason } => write!(f, "{key}: {reason}"),
        }
    }
}

impl std::error::Error for FieldError {}

/// The phase of an execution session.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionPhase {
    Idle,
    CollectingInputs,
    Validating,
    Executing,
    Completed(RunOutcome),
    Failed { error: String },
}

impl ExecutionPhase {
    /// Returns a short name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CollectingInputs => "collecting inputs",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Completed(_) => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The result of driving a session one step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStep {
    /// A run is already in flight; the request was dropped.
    Ignored,
    /// These inputs must be collected before running.
    NeedsInput(Vec<MissingInput>),
    /// The submitted values were rejected; collect again.
    Rejected(Vec<FieldError>),
    /// The run settled in this phase.
    Finished(ExecutionPhase),
}

/// One execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub required_missing: Vec<MissingInput>,
    pub collected: CollectedValues,
    pub input_map: InputMap,
}

impl ExecutionRequest {
    fn new(workflow_id: WorkflowId, required_missing: Vec<MissingInput>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            workflow_id,
            required_missing,
            collected: CollectedValues::new(),
            input_map: InputMap::new(),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    phase: ExecutionPhase,
    request: Option<ExecutionRequest>,
}

/// Drives execution requests for one compiled workflow snapshot.
pub struct ExecutionSession<R: WorkflowRunner> {
    compiled: CompiledWorkflow,
    runner: Arc<R>,
    state: Mutex<SessionState>,
}

impl<R: WorkflowRunner> ExecutionSession<R> {
    /// Creates an idle session.
    #[must_use]
    pub fn new(compiled: CompiledWorkflow, runner: Arc<R>) -> Self {
        Self {
            compiled,
            runner,
            state: Mutex::new(SessionState {
                phase: ExecutionPhase::Idle,
                request: None,
            }),
        }
    }

    /// Returns the compiled workflow this session runs.
    #[must_use]
    pub fn compiled(&self) -> &CompiledWorkflow {
        &self.compiled
    }

    /// Returns a snapshot of the current phase.
    #[must_use]
    pub fn phase(&self) -> ExecutionPhase {
        self.lock().phase.clone()
    }

    /// Returns a snapshot of the current execution request, if any.
    #[must_use]
    pub fn request(&self) -> Option<ExecutionRequest> {
        self.lock().request.clone()
    }

    /// Requests an execution.
    ///
    /// Runs immediately when no required input is missing; otherwise moves
    /// to `CollectingInputs` and returns the missing inputs. Ignored while a
    /// run is in flight.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` while inputs are being collected or
    /// validated.
    #[instrument(skip(self), fields(workflow_id = %self.compiled.workflow_id))]
    pub async fn request_execution(
        &self,
    ) -> chainflow_core::Result<ExecutionStep, ExecutionError> {
        {
            let mut state = self.lock();
            match state.phase {
                ExecutionPhase::Executing => {
                    warn!("execution already in flight, ignoring request");
                    return Ok(ExecutionStep::Ignored);
                }
                ExecutionPhase::CollectingInputs | ExecutionPhase::Validating => {
                    return Err(invalid_transition(&state.phase, "request execution"));
                }
                ExecutionPhase::Idle
                | ExecutionPhase::Completed(_)
                | ExecutionPhase::Failed { .. } => {}
            }

            let missing = find_missing_required_inputs(&self.compiled);
            let request = ExecutionRequest::new(self.compiled.workflow_id.clone(), missing.clone());
            info!(
                execution_id = %request.execution_id,
                missing = missing.len(),
                "execution requested"
            );
            state.request = Some(request);

            if !missing.is_empty() {
                state.phase = ExecutionPhase::CollectingInputs;
                return Ok(ExecutionStep::NeedsInput(missing));
            }
            state.phase = ExecutionPhase::Executing;
        }

        let input_map = self.resolve_inputs(&CollectedValues::new())?;
        Ok(self.execute(input_map).await)
    }

    /// Submits collected values for the missing inputs.
    ///
    /// Every attempt is validated afresh. On rejection the session stays in
    /// `CollectingInputs`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless inputs are being collected.
    #[instrument(skip(self, collected), fields(workflow_id = %self.compiled.workflow_id))]
    pub async fn submit_inputs(
        &self,
        collected: CollectedValues,
    ) -> chainflow_core::Result<ExecutionStep, ExecutionError> {
        {
            let mut state = self.lock();
            if state.phase != ExecutionPhase::CollectingInputs {
                return Err(invalid_transition(&state.phase, "submit inputs"));
            }
            state.phase = ExecutionPhase::Validating;

            let Some(request) = state.request.as_mut() else {
                state.phase = ExecutionPhase::Idle;
                return Err(invalid_transition(&ExecutionPhase::Idle, "submit inputs"));
            };
            let errors = validate_collected(&self.compiled, &request.required_missing, &collected);
            request.collected = collected.clone();

            if !errors.is_empty() {
                info!(errors = errors.len(), "collected inputs rejected");
                state.phase = ExecutionPhase::CollectingInputs;
                return Ok(ExecutionStep::Rejected(errors));
            }
            state.phase = ExecutionPhase::Executing;
        }

        let input_map = self.resolve_inputs(&collected)?;
        Ok(self.execute(input_map).await)
    }

    /// Abandons input collection and returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless inputs are being collected.
    pub fn cancel(&self) -> chainflow_core::Result<(), ExecutionError> {
        let mut state = self.lock();
        if state.phase != ExecutionPhase::CollectingInputs {
            return Err(invalid_transition(&state.phase, "cancel"));
        }
        info!(workflow_id = %self.compiled.workflow_id, "input collection cancelled");
        state.phase = ExecutionPhase::Idle;
        state.request = None;
        Ok(())
    }

    fn resolve_inputs(
        &self,
        collected: &CollectedValues,
    ) -> chainflow_core::Result<InputMap, ExecutionError> {
        match resolve(&self.compiled, collected) {
            Ok(input_map) => Ok(input_map),
            Err(report) => {
                let error = report.current_context().to_string();
                error!(error = %error, "failed to resolve inputs");
                self.lock().phase = ExecutionPhase::Failed { error };
                Err(report.context(ExecutionError::Resolve {
                    workflow_id: self.compiled.workflow_id.clone(),
                }))
            }
        }
    }

    /// Runs the workflow and settles the phase. Expects `Executing`.
    async fn execute(&self, input_map: InputMap) -> ExecutionStep {
        let execution_id = {
            let mut state = self.lock();
            state.request.as_mut().map(|request| {
                request.input_map = input_map.clone();
                request.execution_id.clone()
            })
        };
        info!(
            execution_id = execution_id.as_ref().map(ExecutionId::as_str),
            nodes = input_map.len(),
            "executing workflow"
        );

        let result = self
            .runner
            .run(RunRequest {
                workflow_id: self.compiled.workflow_id.clone(),
                input_map,
            })
            .await;

        let phase = match result {
            Ok(outcome) if outcome.status == RunStatus::Success => {
                info!(duration_ms = outcome.duration_ms, "execution completed");
                ExecutionPhase::Completed(outcome)
            }
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "runner reported an error".to_string());
                warn!(error = %error, "execution failed");
                ExecutionPhase::Failed { error }
            }
            Err(err) => {
                warn!(error = %err, "runner failed");
                ExecutionPhase::Failed {
                    error: err.to_string(),
                }
            }
        };

        self.lock().phase = phase.clone();
        ExecutionStep::Finished(phase)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives a full execution, prompting `collector` until the run settles or
/// the user cancels. Returns the final phase.
///
/// # Errors
///
/// Returns the session's error if a transition fails.
pub async fn run_interactive<R, C>(
    session: &ExecutionSession<R>,
    collector: &C,
) -> chainflow_core::Result<ExecutionPhase, ExecutionError>
where
    R: WorkflowRunner,
    C: InputCollector + ?Sized,
{
    let mut step = session.request_execution().await?;
    let mut missing = Vec::new();
    let mut errors = Vec::new();

    loop {
        match step {
            ExecutionStep::Ignored => return Ok(session.phase()),
            ExecutionStep::Finished(phase) => return Ok(phase),
            ExecutionStep::NeedsInput(needed) => {
                missing = needed;
                errors.clear();
            }
            ExecutionStep::Rejected(rejected) => errors = rejected,
        }

        let Some(collected) = collector.collect(&missing, &errors).await else {
            session.cancel()?;
            return Ok(session.phase());
        };
        step = session.submit_inputs(collected).await?;
    }
}

/// Checks collected values: every missing input needs a value, and every
/// value for an input of the workflow must fit its port type.
fn validate_collected(
    compiled: &CompiledWorkflow,
    missing: &[MissingInput],
    collected: &CollectedValues,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for input in missing {
        let key = input.key();
        // Booleans are tri-state: absent means false.
        if input.port_type != PortType::Boolean && collected.get(&key).is_none_or(is_blank) {
            errors.push(FieldError::MissingRequiredInput { key });
        }
    }

    for (key, value) in collected {
        if errors.iter().any(|e| e.key() == key) {
            continue;
        }
        let Some((_, port)) = lookup(compiled, key) else {
            continue;
        };
        if coerce(port.port_type, value).is_none() {
            errors.push(FieldError::InvalidValue {
                key: key.clone(),
                reason: format!("expected a {} value", port.port_type),
            });
        }
    }
    errors
}

fn invalid_transition(from: &ExecutionPhase, action: &str) -> rootcause::Report<ExecutionError> {
    ExecutionError::InvalidTransition {
        from: from.name().to_string(),
        action: action.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::graph::WorkflowGraph;
    use crate::node::{Node, NodeCategory, NodeId, Parameters};
    use crate::port::Port;
    use serde_json::json;
    use tokio::sync::Notify;

    fn params(value: JsonValue) -> Parameters {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn compiled(nodes: Vec<Node>) -> CompiledWorkflow {
        let graph = WorkflowGraph::from_parts(nodes, Vec::new());
        compile(&graph, &WorkflowId::from("wf_1")).unwrap()
    }

    fn complete_workflow() -> CompiledWorkflow {
        compiled(vec![
            Node::new("feed", NodeCategory::Protocol, "Pyth Price Feed")
                .with_parameters(params(json!({"symbol": "SOL/USD"}))),
            Node::new("start", NodeCategory::Trigger, "Start"),
        ])
    }

    fn swap_without_amount() -> CompiledWorkflow {
        compiled(vec![
            Node::new("swap", NodeCategory::Protocol, "Jupiter Swap")
                .with_parameters(params(json!({"inputMint": "SOL", "outputMint": "USDC"}))),
        ])
    }

    fn collected(pairs: &[(&str, JsonValue)]) -> CollectedValues {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    /// A runner that records requests and replies with a fixed result.
    struct MockRunner {
        reply: Result<RunOutcome, RunnerError>,
        requests: Mutex<Vec<RunRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockRunner {
        fn succeeding() -> Self {
            Self::replying(Ok(RunOutcome::success(json!({"ok": true}), 12)))
        }

        fn replying(reply: Result<RunOutcome, RunnerError>) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::succeeding()
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> RunRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl WorkflowRunner for MockRunner {
        async fn run(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.requests.lock().unwrap().push(request);
            self.reply.clone()
        }
    }

    /// A collector that replays scripted answers and records the errors it
    /// was shown.
    struct ScriptedCollector {
        answers: Mutex<Vec<Option<CollectedValues>>>,
        shown_errors: Mutex<Vec<Vec<FieldError>>>,
    }

    impl ScriptedCollector {
        fn new(mut answers: Vec<Option<CollectedValues>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                shown_errors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InputCollector for ScriptedCollector {
        async fn collect(
            &self,
            _missing: &[MissingInput],
            errors: &[FieldError],
        ) -> Option<CollectedValues> {
            self.shown_errors.lock().unwrap().push(errors.to_vec());
            self.answers.lock().unwrap().pop().flatten()
        }
    }

    #[tokio::test]
    async fn runs_immediately_when_nothing_is_missing() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(complete_workflow(), Arc::clone(&runner));

        let step = session.request_execution().await.unwrap();
        let ExecutionStep::Finished(ExecutionPhase::Completed(outcome)) = step else {
            panic!("expected completion, got {step:?}");
        };
        assert_eq!(outcome.results, json!({"ok": true}));
        assert!(matches!(session.phase(), ExecutionPhase::Completed(_)));

        let request = runner.last_request();
        assert_eq!(request.workflow_id.as_str(), "wf_1");
        assert_eq!(request.input_map.len(), 2);
        assert_eq!(
            request.input_map[&NodeId::from("feed")]["symbol"],
            json!("SOL/USD")
        );
        assert!(session.request().unwrap().required_missing.is_empty());
    }

    #[tokio::test]
    async fn collects_validates_and_runs() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));

        let step = session.request_execution().await.unwrap();
        let ExecutionStep::NeedsInput(missing) = step else {
            panic!("expected missing inputs, got {step:?}");
        };
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key(), "swap.amount");
        assert_eq!(session.phase(), ExecutionPhase::CollectingInputs);

        let step = session
            .submit_inputs(collected(&[("swap.amount", json!(" "))]))
            .await
            .unwrap();
        assert_eq!(
            step,
            ExecutionStep::Rejected(vec![FieldError::MissingRequiredInput {
                key: "swap.amount".to_string()
            }])
        );
        assert_eq!(session.phase(), ExecutionPhase::CollectingInputs);

        let step = session
            .submit_inputs(collected(&[("swap.amount", json!("lots"))]))
            .await
            .unwrap();
        let ExecutionStep::Rejected(errors) = step else {
            panic!("expected rejection, got {step:?}");
        };
        assert!(matches!(errors[0], FieldError::InvalidValue { .. }));
        assert_eq!(runner.calls(), 0);

        let step = session
            .submit_inputs(collected(&[("swap.amount", json!("2"))]))
            .await
            .unwrap();
        assert!(matches!(step, ExecutionStep::Finished(ExecutionPhase::Completed(_))));

        let request = runner.last_request();
        assert_eq!(request.input_map[&NodeId::from("swap")]["amount"], json!(2));
        assert_eq!(session.request().unwrap().collected["swap.amount"], json!("2"));
    }

    #[tokio::test]
    async fn bad_value_for_an_optional_input_is_rejected() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));
        session.request_execution().await.unwrap();

        let step = session
            .submit_inputs(collected(&[
                ("swap.amount", json!(2)),
                ("swap.slippageBps", json!("abc")),
            ]))
            .await
            .unwrap();
        assert_eq!(
            step,
            ExecutionStep::Rejected(vec![FieldError::InvalidValue {
                key: "swap.slippageBps".to_string(),
                reason: "expected a number value".to_string(),
            }])
        );
        assert_eq!(session.phase(), ExecutionPhase::CollectingInputs);
        assert_eq!(runner.calls(), 0);

        let step = session
            .submit_inputs(collected(&[
                ("swap.amount", json!(2)),
                ("swap.slippageBps", json!("75")),
            ]))
            .await
            .unwrap();
        assert!(matches!(step, ExecutionStep::Finished(ExecutionPhase::Completed(_))));
        let inputs = &runner.last_request().input_map[&NodeId::from("swap")];
        assert_eq!(inputs["slippageBps"], json!(75));
    }

    #[tokio::test]
    async fn resolve_failure_keeps_the_cause() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));

        let err = session
            .resolve_inputs(&collected(&[("swap.slippageBps", json!("abc"))]))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed to resolve inputs for workflow wf_1"), "{message}");
        assert!(message.contains("expects a number, got 'abc'"), "{message}");
        assert_eq!(
            session.phase(),
            ExecutionPhase::Failed {
                error: "input 'slippageBps' on node swap expects a number, got 'abc'".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cancel_returns_to_idle_without_running() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));

        session.request_execution().await.unwrap();
        session.cancel().unwrap();
        assert_eq!(session.phase(), ExecutionPhase::Idle);
        assert!(session.request().is_none());
        assert_eq!(runner.calls(), 0);

        let err = session.cancel().unwrap_err();
        assert!(err.to_string().contains("cannot cancel while idle"));
    }

    #[tokio::test]
    async fn transitions_outside_collection_are_rejected() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), runner);

        let err = session.submit_inputs(CollectedValues::new()).await.unwrap_err();
        assert!(err.to_string().contains("cannot submit inputs while idle"));

        session.request_execution().await.unwrap();
        let err = session.request_execution().await.unwrap_err();
        assert!(
            err.to_string()
                .contains("cannot request execution while collecting inputs")
        );
    }

    #[tokio::test]
    async fn runner_error_is_surfaced_unmodified() {
        let runner = Arc::new(MockRunner::replying(Err(RunnerError::new(
            "rpc timeout after 30s (slot 123)",
        ))));
        let session = ExecutionSession::new(complete_workflow(), runner);

        let step = session.request_execution().await.unwrap();
        assert_eq!(
            step,
            ExecutionStep::Finished(ExecutionPhase::Failed {
                error: "rpc timeout after 30s (slot 123)".to_string()
            })
        );
    }

    #[tokio::test]
    async fn error_status_fails_the_run() {
        let runner = Arc::new(MockRunner::replying(Ok(RunOutcome::failure(None, 3))));
        let session = ExecutionSession::new(complete_workflow(), runner);

        session.request_execution().await.unwrap();
        assert_eq!(
            session.phase(),
            ExecutionPhase::Failed {
                error: "runner reported an error".to_string()
            }
        );

        let runner = Arc::new(MockRunner::replying(Ok(RunOutcome::failure(
            Some("insufficient funds".to_string()),
            3,
        ))));
        let session = ExecutionSession::new(complete_workflow(), runner);
        session.request_execution().await.unwrap();
        assert_eq!(
            session.phase(),
            ExecutionPhase::Failed {
                error: "insufficient funds".to_string()
            }
        );
    }

    #[tokio::test]
    async fn second_request_while_executing_is_ignored() {
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(MockRunner::gated(Arc::clone(&gate)));
        let session = ExecutionSession::new(complete_workflow(), Arc::clone(&runner));

        let (first, second) = tokio::join!(session.request_execution(), async {
            while session.phase() != ExecutionPhase::Executing {
                tokio::task::yield_now().await;
            }
            let step = session.request_execution().await.unwrap();
            gate.notify_one();
            step
        });

        assert_eq!(second, ExecutionStep::Ignored);
        assert!(matches!(
            first.unwrap(),
            ExecutionStep::Finished(ExecutionPhase::Completed(_))
        ));
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn settled_session_can_run_again() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(complete_workflow(), Arc::clone(&runner));

        session.request_execution().await.unwrap();
        let first_id = session.request().unwrap().execution_id;
        session.request_execution().await.unwrap();
        let second_id = session.request().unwrap().execution_id;

        assert_ne!(first_id, second_id);
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn unset_boolean_is_accepted_as_false() {
        let node = Node::new("t", NodeCategory::Transform, "Toggle").with_ports(
            vec![
                Port::required("enabled", "Enabled", PortType::Boolean),
                Port::required("note", "Note", PortType::String),
            ],
            Vec::new(),
        );
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(compiled(vec![node]), Arc::clone(&runner));

        let step = session.request_execution().await.unwrap();
        assert!(matches!(step, ExecutionStep::NeedsInput(ref m) if m.len() == 2));

        session
            .submit_inputs(collected(&[("t.note", json!("hello"))]))
            .await
            .unwrap();
        let inputs = &runner.last_request().input_map[&NodeId::from("t")];
        assert_eq!(inputs["enabled"], json!(false));
        assert_eq!(inputs["note"], json!("hello"));
    }

    #[tokio::test]
    async fn interactive_run_reprompts_with_errors() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));
        let collector = ScriptedCollector::new(vec![
            Some(CollectedValues::new()),
            Some(collected(&[("swap.amount", json!(1.5))])),
        ]);

        let phase = run_interactive(&session, &collector).await.unwrap();
        assert!(matches!(phase, ExecutionPhase::Completed(_)));

        let shown = collector.shown_errors.lock().unwrap();
        assert_eq!(shown.len(), 2);
        assert!(shown[0].is_empty());
        assert_eq!(shown[1][0].key(), "swap.amount");
    }

    #[tokio::test]
    async fn interactive_run_cancels_when_collector_gives_up() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(swap_without_amount(), Arc::clone(&runner));
        let collector = ScriptedCollector::new(vec![None]);

        let phase = run_interactive(&session, &collector).await.unwrap();
        assert_eq!(phase, ExecutionPhase::Idle);
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn interactive_run_without_missing_inputs_never_prompts() {
        let runner = Arc::new(MockRunner::succeeding());
        let session = ExecutionSession::new(complete_workflow(), runner);
        let collector = ScriptedCollector::new(Vec::new());

        let phase = run_interactive(&session, &collector).await.unwrap();
        assert!(matches!(phase, ExecutionPhase::Completed(_)));
        assert!(collector.shown_errors.lock().unwrap().is_empty());
    }
}
