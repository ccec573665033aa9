//! Workflow persistence seam.
//!
//! The store itself lives outside this crate. [`save_workflow`] is the only
//! way a workflow reaches it: activation is checked, the graph is compiled
//! once, and the result goes to `create` or `update`. [`load_workflow`]
//! rebuilds an editable [`Workflow`], deriving any port lists the store
//! returned empty.

use crate::compiler::{CompiledWorkflow, Compiler};
use crate::connection::Connection;
use crate::definition::{Activation, Workflow, WorkflowMetadata, WorkflowStatus};
use crate::error::{ActivationError, StoreError};
use crate::graph::WorkflowGraph;
use crate::node::Node;
use async_trait::async_trait;
use chainflow_core::WorkflowId;
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument, warn};

/// What is sent to the store on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub name: String,
    pub description: String,
    pub activation: Activation,
    pub status: WorkflowStatus,
    pub compiled: CompiledWorkflow,
}

impl SaveRequest {
    fn new(workflow: &Workflow, compiled: CompiledWorkflow) -> Self {
        Self {
            name: workflow.metadata.name.clone(),
            description: workflow.metadata.description.clone(),
            activation: workflow.activation.clone(),
            status: workflow.status,
            compiled,
        }
    }
}

/// A workflow as returned by the store.
///
/// Node port lists may be empty; they are derived again on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWorkflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Trait for workflow persistence.
///
/// This abstraction allows testing without a backend.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persists a new workflow and returns its id. The store may assign a
    /// different id than the one the workflow was compiled under.
    async fn create(&self, request: SaveRequest) -> Result<WorkflowId, StoreError>;

    /// Replaces a persisted workflow.
    async fn update(&self, id: &WorkflowId, request: SaveRequest) -> Result<(), StoreError>;

    /// Loads a persisted workflow.
    async fn load(&self, id: &WorkflowId) -> Result<StoredWorkflow, StoreError>;
}

/// Saves a workflow, creating it if it has not been persisted yet.
///
/// If the store assigns a new id on create, the workflow adopts it and is
/// compiled and saved again so that memory keys carry the persisted id.
/// Returns the compiled form that was stored.
///
/// # Errors
///
/// - `Activation` if the activation settings are invalid
/// - `Compile` if the graph does not compile
/// - Any error reported by the store
#[instrument(skip(store, workflow, compiler), fields(workflow_id = %workflow.id))]
pub async fn save_workflow<S>(
    store: &S,
    workflow: &mut Workflow,
    compiler: &Compiler,
    persisted: bool,
) -> chainflow_core::Result<CompiledWorkflow, StoreError>
where
    S: WorkflowStore + ?Sized,
{
    if let Err(err) = workflow.activation.validate() {
        warn!(error = %err, "refusing to save workflow with invalid activation");
        let report: Report<ActivationError> = err.into();
        return Err(report.context(StoreError::Activation {
            workflow_id: workflow.id.clone(),
        }));
    }

    let compiled = compile_for_save(workflow, compiler)?;
    workflow.touch();

    if persisted {
        store
            .update(&workflow.id, SaveRequest::new(workflow, compiled.clone()))
            .await?;
        info!(nodes = compiled.nodes.len(), "workflow updated");
        return Ok(compiled);
    }

    let id = store
        .create(SaveRequest::new(workflow, compiled.clone()))
        .await?;
    if id == workflow.id {
        info!(nodes = compiled.nodes.len(), "workflow created");
        return Ok(compiled);
    }

    info!(assigned_id = %id, "store assigned a new workflow id");
    workflow.id = id;
    let compiled = compile_for_save(workflow, compiler)?;
    store
        .update(&workflow.id, SaveRequest::new(workflow, compiled.clone()))
        .await?;
    Ok(compiled)
}

fn compile_for_save(
    workflow: &Workflow,
    compiler: &Compiler,
) -> chainflow_core::Result<CompiledWorkflow, StoreError> {
    workflow.compile(compiler).map_err(|report| {
        warn!(error = %report.current_context(), "refusing to save workflow that does not compile");
        report.context(StoreError::Compile {
            workflow_id: workflow.id.clone(),
        })
    })
}

/// Loads a workflow for editing.
///
/// # Errors
///
/// Returns the store's error, e.g. `NotFound`.
#[instrument(skip(store), fields(workflow_id = %id))]
pub async fn load_workflow<S>(
    store: &S,
    id: &WorkflowId,
) -> chainflow_core::Result<Workflow, StoreError>
where
    S: WorkflowStore + ?Sized,
{
    let stored = store.load(id).await?;
    let mut graph = WorkflowGraph::from_parts(stored.nodes, stored.connections);
    graph.ensure_ports();

    info!(nodes = graph.node_count(), "workflow loaded");
    Ok(Workflow {
        id: stored.id,
        metadata: WorkflowMetadata {
            name: stored.name,
            description: stored.description,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        },
        graph,
        activation: stored.activation,
        status: stored.status,
    })
}

/// In-memory workflow store for tests and demos.
///
/// Compiled nodes are stored back as editable nodes whose parameters are
/// the compiled config.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Mutex<HashMap<WorkflowId, StoredWorkflow>>,
    generate_ids: bool,
}

impl InMemoryWorkflowStore {
    /// Creates a store that keeps the ids workflows were compiled under.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that assigns a fresh id on every create.
    #[must_use]
    pub fn with_generated_ids() -> Self {
        Self {
            generate_ids: true,
            ..Self::default()
        }
    }

    /// Inserts a stored workflow directly, replacing any with the same id.
    pub fn insert(&self, workflow: StoredWorkflow) {
        self.lock().insert(workflow.id.clone(), workflow);
    }

    /// Returns the number of stored workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WorkflowId, StoredWorkflow>> {
        self.workflows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_stored(id: WorkflowId, request: SaveRequest, created_at: DateTime<Utc>) -> StoredWorkflow {
    let nodes = request
        .compiled
        .nodes
        .into_iter()
        .map(|compiled| Node {
            id: compiled.id,
            category: compiled.category,
            label: compiled.label,
            description: compiled.description,
            parameters: compiled.config,
            inputs: compiled.inputs,
            outputs: compiled.outputs,
            position: compiled.position,
        })
        .collect();

    StoredWorkflow {
        id,
        name: request.name,
        description: request.description,
        activation: request.activation,
        status: request.status,
        nodes,
        connections: request.compiled.connections,
        created_at,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, request: SaveRequest) -> Result<WorkflowId, StoreError> {
        let id = if self.generate_ids {
            WorkflowId::new()
        } else {
            request.compiled.workflow_id.clone()
        };

        let mut workflows = self.lock();
        if workflows.contains_key(&id) {
            return Err(StoreError::Backend {
                reason: format!("workflow {id} already exists"),
            });
        }
        workflows.insert(id.clone(), to_stored(id.clone(), request, Utc::now()));
        Ok(id)
    }

    async fn update(&self, id: &WorkflowId, request: SaveRequest) -> Result<(), StoreError> {
        let mut workflows = self.lock();
        let created_at = workflows
            .get(id)
            .map(|existing| existing.created_at)
            .ok_or_else(|| StoreError::NotFound {
                workflow_id: id.clone(),
            })?;
        workflows.insert(id.clone(), to_stored(id.clone(), request, created_at));
        Ok(())
    }

    async fn load(&self, id: &WorkflowId) -> Result<StoredWorkflow, StoreError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                workflow_id: id.clone(),
            })
    }
}
