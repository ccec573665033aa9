//! Workflow definition types.
//!
//! A workflow is a named automation that consists of:
//! - Metadata (name, description, timestamps)
//! - A directed graph of nodes and connections
//! - Activation settings (how the workflow is started)
//! - A lifecycle status

use crate::compiler::{CompiledWorkflow, Compiler};
use crate::error::{ActivationError, CompileError};
use crate::graph::WorkflowGraph;
use chainflow_core::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Human-readable name for this workflow.
    pub name: String,
    /// Description of what this workflow does.
    #[serde(default)]
    pub description: String,
    /// When this workflow was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How an active workflow is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// Run on demand only.
    #[default]
    Manual,
    /// Run on a cron schedule.
    Cron,
    /// Run when a listed event occurs.
    Event,
}

/// Activation settings of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub schedule_type: ScheduleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_events: Vec<String>,
}

impl Activation {
    /// Activation on a cron schedule.
    #[must_use]
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            is_active: true,
            schedule_type: ScheduleType::Cron,
            cron_expression: Some(expression.into()),
            trigger_events: Vec::new(),
        }
    }

    /// Activation on events.
    #[must_use]
    pub fn on_events(events: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            is_active: true,
            schedule_type: ScheduleType::Event,
            cron_expression: None,
            trigger_events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates the schedule settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a cron schedule has no five-field expression, or
    /// an event schedule has no events.
    pub fn validate(&self) -> Result<(), ActivationError> {
        match self.schedule_type {
            ScheduleType::Manual => Ok(()),
            ScheduleType::Cron => {
                let expression = self
                    .cron_expression
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .ok_or(ActivationError::MissingCronExpression)?;
                let parts: Vec<&str> = expression.split_whitespace().collect();
                if parts.len() != 5 {
                    return Err(ActivationError::InvalidCronExpression {
                        expression: expression.to_string(),
                        reason: format!("expected 5 parts, got {}", parts.len()),
                    });
                }
                Ok(())
            }
            ScheduleType::Event => {
                if self.trigger_events.iter().all(|e| e.trim().is_empty()) {
                    return Err(ActivationError::MissingTriggerEvents);
                }
                Ok(())
            }
        }
    }
}

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Published,
    Paused,
    Error,
}

/// A complete workflow definition.
///
/// Serializes flat: metadata and graph fields sit next to the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Workflow metadata.
    #[serde(flatten)]
    pub metadata: WorkflowMetadata,
    /// The workflow graph (nodes and connections).
    #[serde(flatten)]
    pub graph: WorkflowGraph,
    /// Activation settings.
    #[serde(default)]
    pub activation: Activation,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl Workflow {
    /// Creates a new, empty workflow with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(WorkflowId::new(), name)
    }

    /// Creates a workflow with a specific ID.
    #[must_use]
    pub fn with_id(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            metadata: WorkflowMetadata::new(name),
            graph: WorkflowGraph::new(),
            activation: Activation::default(),
            status: WorkflowStatus::default(),
        }
    }

    /// Sets the activation settings.
    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Bumps the update timestamp.
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    /// Compiles the graph under this workflow's id.
    ///
    /// # Errors
    ///
    /// Returns the compiler's error if the graph does not compile.
    pub fn compile(
        &self,
        compiler: &Compiler,
    ) -> chainflow_core::Result<CompiledWorkflow, CompileError> {
        compiler.compile(&self.graph, &self.id)
    }
}
