//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Graph edits and validation findings (nodes, ports, connections)
//! - `CompileError`: Turning a graph into a compiled workflow
//! - `ResolveError`: Building the per-node input map for a run
//! - `ExecutionError`: The execution request state machine
//! - `ActivationError`: Invalid activation (schedule) settings
//! - `StoreError`: Failures reported by the persistence collaborator

use crate::connection::ConnectionId;
use crate::node::NodeId;
use crate::port::PortDirection;
use chainflow_core::WorkflowId;
use std::fmt;

/// Errors from graph operations.
///
/// Edit operations return the first problem and leave the graph untouched;
/// `WorkflowGraph::validate` returns all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A node with this ID already exists.
    DuplicateNodeId { node_id: NodeId },
    /// A referenced node does not exist.
    UnknownNode { node_id: NodeId },
    /// A referenced port does not exist on the node.
    UnknownPort {
        node_id: NodeId,
        port_id: String,
        direction: PortDirection,
    },
    /// Two ports in the same list share an id.
    DuplicatePortId {
        node_id: NodeId,
        port_id: String,
        direction: PortDirection,
    },
    /// A connection with this ID already exists.
    DuplicateConnectionId { connection_id: ConnectionId },
    /// A referenced connection does not exist.
    UnknownConnection { connection_id: ConnectionId },
    /// The connections form a cycle.
    CycleDetected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::UnknownNode { node_id } => write!(f, "unknown node: {node_id}"),
            Self::UnknownPort {
                node_id,
                port_id,
                direction,
            } => write!(f, "{direction} port '{port_id}' not found on node {node_id}"),
            Self::DuplicatePortId {
                node_id,
                port_id,
                direction,
            } => write!(f, "duplicate {direction} port '{port_id}' on node {node_id}"),
            Self::DuplicateConnectionId { connection_id } => {
                write!(f, "duplicate connection id: {connection_id}")
            }
            Self::UnknownConnection { connection_id } => {
                write!(f, "unknown connection: {connection_id}")
            }
            Self::CycleDetected => write!(f, "graph contains cycles"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from compiling a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The graph failed validation. Carries every finding.
    IncompleteGraph {
        workflow_id: WorkflowId,
        errors: Vec<GraphError>,
    },
    /// Parameters outside the node's derived schema.
    UndeclaredParameters {
        workflow_id: WorkflowId,
        nodes: Vec<(NodeId, Vec<String>)>,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteGraph {
                workflow_id,
                errors,
            } => {
                write!(
                    f,
                    "workflow {workflow_id} has {} graph error(s): ",
                    errors.len()
                )?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            Self::UndeclaredParameters { workflow_id, nodes } => {
                write!(f, "workflow {workflow_id} has undeclared parameters: ")?;
                for (i, (node_id, keys)) in nodes.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "node {node_id}: {}", keys.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Errors from resolving the input map of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A collected value for a number port is not numeric.
    InvalidNumber {
        node_id: NodeId,
        input_id: String,
        value: String,
    },
    /// A collected value for a boolean port is not a boolean.
    InvalidBoolean {
        node_id: NodeId,
        input_id: String,
        value: String,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber {
                node_id,
                input_id,
                value,
            } => write!(
                f,
                "input '{input_id}' on node {node_id} expects a number, got '{value}'"
            ),
            Self::InvalidBoolean {
                node_id,
                input_id,
                value,
            } => write!(
                f,
                "input '{input_id}' on node {node_id} expects true or false, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Errors from the execution request state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The requested transition is not allowed from the current phase.
    InvalidTransition { from: String, action: String },
    /// The input map could not be resolved.
    Resolve { workflow_id: WorkflowId },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {action} while {from}")
            }
            Self::Resolve { workflow_id } => {
                write!(f, "failed to resolve inputs for workflow {workflow_id}")
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Invalid activation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// A cron schedule without an expression.
    MissingCronExpression,
    /// A cron expression with the wrong shape.
    InvalidCronExpression { expression: String, reason: String },
    /// An event schedule without events to listen for.
    MissingTriggerEvents,
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCronExpression => write!(f, "cron schedule requires a cron expression"),
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::MissingTriggerEvents => {
                write!(f, "event schedule requires at least one trigger event")
            }
        }
    }
}

impl std::error::Error for ActivationError {}

/// Errors from the persistence collaborator and the save/load paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Workflow not found.
    NotFound { workflow_id: WorkflowId },
    /// The backend rejected or failed the operation.
    Backend { reason: String },
    /// The workflow was not saved because it does not compile.
    Compile { workflow_id: WorkflowId },
    /// The workflow was not saved because its activation is invalid.
    Activation { workflow_id: WorkflowId },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { workflow_id } => write!(f, "workflow not found: {workflow_id}"),
            Self::Backend { reason } => write!(f, "workflow store failed: {reason}"),
            Self::Compile { workflow_id } => {
                write!(f, "workflow {workflow_id} does not compile")
            }
            Self::Activation { workflow_id } => {
                write!(f, "workflow {workflow_id} has invalid activation settings")
            }
        }
    }
}

impl std::error::Error for StoreError {}
