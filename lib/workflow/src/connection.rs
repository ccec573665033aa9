//! Connection types for workflow graphs.
//!
//! A connection is a directed edge from one node's output port to another
//! node's input port. Connections are stored verbatim, so a graph loaded from
//! persistence may carry dangling references until it is validated.

use crate::node::NodeId;
use chainflow_core::define_id;
use serde::{Deserialize, Serialize};

define_id!(
    /// A unique identifier for a connection within a workflow.
    ConnectionId,
    "conn"
);

/// A connection between two ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Unique identifier for this connection.
    pub id: ConnectionId,
    /// The source node ID.
    pub source_node_id: NodeId,
    /// The output port id on the source node.
    pub source_output_id: String,
    /// The target node ID.
    pub target_node_id: NodeId,
    /// The input port id on the target node.
    pub target_input_id: String,
}

impl Connection {
    /// Creates a new connection with a generated ID.
    #[must_use]
    pub fn new(
        source_node_id: impl Into<NodeId>,
        source_output_id: impl Into<String>,
        target_node_id: impl Into<NodeId>,
        target_input_id: impl Into<String>,
    ) -> Self {
        Self::with_id(
            ConnectionId::new(),
            source_node_id,
            source_output_id,
            target_node_id,
            target_input_id,
        )
    }

    /// Creates a connection with a specific ID.
    #[must_use]
    pub fn with_id(
        id: impl Into<ConnectionId>,
        source_node_id: impl Into<NodeId>,
        source_output_id: impl Into<String>,
        target_node_id: impl Into<NodeId>,
        target_input_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source_node_id.into(),
            source_output_id: source_output_id.into(),
            target_node_id: target_node_id.into(),
            target_input_id: target_input_id.into(),
        }
    }

    /// Returns true if the connection touches the given node on either end.
    #[must_use]
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source_node_id == node_id || &self.target_node_id == node_id
    }
}
