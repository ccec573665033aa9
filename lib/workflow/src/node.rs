//! Workflow node types.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - A unique ID within the workflow
//! - A category (Trigger, Condition, Transform, Protocol, Memory, Communication)
//! - A free-text label, which the catalog uses to pick a specialized template
//! - A free-form parameter bag edited by the user
//! - Input and output ports

use crate::catalog;
use crate::port::Port;
use chainflow_core::define_id;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

define_id!(
    /// A unique identifier for a node within a workflow.
    NodeId,
    "node"
);

/// The user-editable parameter bag of a node.
///
/// `serde_json::Map` keeps keys sorted, so anything built from it
/// serializes deterministically.
pub type Parameters = serde_json::Map<String, JsonValue>;

/// The category of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points that initiate workflow execution.
    Trigger,
    /// Boolean logic over upstream values.
    Condition,
    /// Data reshaping (format, math, filter).
    Transform,
    /// On-chain protocol calls (swaps, price feeds, lending).
    Protocol,
    /// Workflow-scoped persistent state.
    Memory,
    /// Outgoing messages (Telegram, Discord, email).
    Communication,
    /// A category this version does not know about.
    #[serde(other)]
    Unknown,
}

impl NodeCategory {
    /// Returns the wire name of this category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Condition => "condition",
            Self::Transform => "transform",
            Self::Protocol => "protocol",
            Self::Memory => "memory",
            Self::Communication => "communication",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position. Layout only; never affects compilation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Coarse behavioral class, drives schema derivation.
    pub category: NodeCategory,
    /// Free-text label (e.g. "Jupiter Swap").
    pub label: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// User-edited configuration.
    #[serde(default)]
    pub parameters: Parameters,
    /// Input ports for this node.
    #[serde(default)]
    pub inputs: Vec<Port>,
    /// Output ports for this node.
    #[serde(default)]
    pub outputs: Vec<Port>,
    /// Canvas position.
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Creates a new node whose ports are derived from its category and label.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, category: NodeCategory, label: impl Into<String>) -> Self {
        let mut node = Self::without_ports(id, category, label);
        node.derive_ports();
        node
    }

    /// Creates a node with empty port lists, as a persistence backend may
    /// return it. Ports are filled in by [`Node::ensure_ports`] or at compile
    /// time.
    #[must_use]
    pub fn without_ports(
        id: impl Into<NodeId>,
        category: NodeCategory,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            label: label.into(),
            description: String::new(),
            parameters: Parameters::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            position: Position::default(),
        }
    }

    /// Sets the initial parameters.
    ///
    /// If the node already has derived ports they are re-derived, since some
    /// templates (memory) depend on parameters. Call this before
    /// [`Node::with_ports`] when supplying explicit ports.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        if !self.inputs.is_empty() || !self.outputs.is_empty() {
            self.derive_ports();
        }
        self
    }

    /// Replaces the ports with an explicit set (e.g. from a template).
    #[must_use]
    pub fn with_ports(mut self, inputs: Vec<Port>, outputs: Vec<Port>) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Returns the input port with the given id, if any.
    #[must_use]
    pub fn input_port(&self, id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == id)
    }

    /// Returns the output port with the given id, if any.
    #[must_use]
    pub fn output_port(&self, id: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == id)
    }

    /// Returns the input ports to compile with: the node's own, or derived
    /// ones when the list is empty.
    #[must_use]
    pub fn effective_inputs(&self) -> Vec<Port> {
        if self.inputs.is_empty() {
            catalog::derive_inputs(self.category, &self.label, &self.parameters)
        } else {
            self.inputs.clone()
        }
    }

    /// Returns the output ports to compile with: the node's own, or derived
    /// ones when the list is empty.
    #[must_use]
    pub fn effective_outputs(&self) -> Vec<Port> {
        if self.outputs.is_empty() {
            catalog::derive_outputs(self.category, &self.label)
        } else {
            self.outputs.clone()
        }
    }

    /// Fills in any empty port list from the catalog. Explicit ports are kept.
    pub fn ensure_ports(&mut self) {
        if self.inputs.is_empty() {
            self.inputs = catalog::derive_inputs(self.category, &self.label, &self.parameters);
        }
        if self.outputs.is_empty() {
            self.outputs = catalog::derive_outputs(self.category, &self.label);
        }
    }

    /// Input ports the catalog derives for `parameters`, if this node's
    /// inputs are empty or catalog-derived and would change. Explicit port
    /// lists are left alone.
    #[must_use]
    pub fn rederived_inputs(&self, parameters: &Parameters) -> Option<Vec<Port>> {
        if !self.inputs.is_empty()
            && self.inputs != catalog::derive_inputs(self.category, &self.label, &self.parameters)
        {
            return None;
        }
        let inputs = catalog::derive_inputs(self.category, &self.label, parameters);
        (inputs != self.inputs).then_some(inputs)
    }

    fn derive_ports(&mut self) {
        self.inputs = catalog::derive_inputs(self.category, &self.label, &self.parameters);
        self.outputs = catalog::derive_outputs(self.category, &self.label);
    }
}
