//! Editable workflow graph.
//!
//! Workflows are directed graphs where:
//! - Nodes are workflow steps with typed ports
//! - Connections link an output port to an input port
//!
//! Nodes and connections are kept in insertion order so that everything
//! derived from the graph is deterministic. Edits through the methods here
//! are checked before anything changes; graphs loaded with
//! [`WorkflowGraph::from_parts`] are taken as-is and may hold dangling
//! references until [`WorkflowGraph::validate`] reports them.

use crate::connection::{Connection, ConnectionId};
use crate::error::GraphError;
use crate::node::{Node, NodeId, Parameters};
use crate::port::{Port, PortDirection};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// An edit event emitted by the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEdit {
    AddNode { node: Node },
    RemoveNode { node_id: NodeId },
    AddConnection { connection: Connection },
    RemoveConnection { connection_id: ConnectionId },
    SetParameter {
        node_id: NodeId,
        key: String,
        value: JsonValue,
    },
}

/// A workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    connections: Vec<Connection>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from loaded parts without checking them.
    #[must_use]
    pub fn from_parts(nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self { nodes, connections }
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNodeId` if a node with the same ID exists.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if self.node(&node.id).is_some() {
            return Err(GraphError::DuplicateNodeId { node_id: node.id });
        }
        let node_id = node.id.clone();
        self.nodes.push(node);
        Ok(node_id)
    }

    /// Removes a node from the graph.
    ///
    /// Also removes every connection touching this node.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<Node> {
        let index = self.nodes.iter().position(|n| &n.id == node_id)?;
        self.connections.retain(|c| !c.touches(node_id));
        Some(self.nodes.remove(index))
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == node_id)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == node_id)
    }

    /// Adds a connection between two ports.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection ID is already used
    /// - Source or target node doesn't exist
    /// - The source output port or target input port doesn't exist
    pub fn add_connection(&mut self, connection: Connection) -> Result<ConnectionId, GraphError> {
        if self.connection(&connection.id).is_some() {
            return Err(GraphError::DuplicateConnectionId {
                connection_id: connection.id,
            });
        }

        let source = self
            .node(&connection.source_node_id)
            .ok_or_else(|| GraphError::UnknownNode {
                node_id: connection.source_node_id.clone(),
            })?;
        let target = self
            .node(&connection.target_node_id)
            .ok_or_else(|| GraphError::UnknownNode {
                node_id: connection.target_node_id.clone(),
            })?;

        if source.output_port(&connection.source_output_id).is_none() {
            return Err(GraphError::UnknownPort {
                node_id: source.id.clone(),
                port_id: connection.source_output_id,
                direction: PortDirection::Output,
            });
        }
        if target.input_port(&connection.target_input_id).is_none() {
            return Err(GraphError::UnknownPort {
                node_id: target.id.clone(),
                port_id: connection.target_input_id,
                direction: PortDirection::Input,
            });
        }

        let connection_id = connection.id.clone();
        self.connections.push(connection);
        Ok(connection_id)
    }

    /// Removes a connection.
    pub fn remove_connection(&mut self, connection_id: &ConnectionId) -> Option<Connection> {
        let index = self
            .connections
            .iter()
            .position(|c| &c.id == connection_id)?;
        Some(self.connections.remove(index))
    }

    /// Returns a connection by its ID.
    #[must_use]
    pub fn connection(&self, connection_id: &ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| &c.id == connection_id)
    }

    /// Sets one parameter on a node.
    ///
    /// Catalog-derived input ports follow the parameters that select them,
    /// e.g. a memory node's `operation`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNode` if the node doesn't exist, or `UnknownPort` if
    /// the re-derived inputs would drop a port a connection targets.
    pub fn set_parameter(
        &mut self,
        node_id: &NodeId,
        key: impl Into<String>,
        value: JsonValue,
    ) -> Result<(), GraphError> {
        let key = key.into();
        self.edit_parameters(node_id, |parameters| {
            parameters.insert(key, value);
        })
    }

    /// Removes one parameter from a node, returning its previous value.
    ///
    /// # Errors
    ///
    /// Same as [`WorkflowGraph::set_parameter`].
    pub fn remove_parameter(
        &mut self,
        node_id: &NodeId,
        key: &str,
    ) -> Result<Option<JsonValue>, GraphError> {
        self.edit_parameters(node_id, |parameters| parameters.remove(key))
    }

    fn edit_parameters<T>(
        &mut self,
        node_id: &NodeId,
        edit: impl FnOnce(&mut Parameters) -> T,
    ) -> Result<T, GraphError> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == node_id)
            .ok_or_else(|| GraphError::UnknownNode {
                node_id: node_id.clone(),
            })?;

        let mut parameters = self.nodes[index].parameters.clone();
        let output = edit(&mut parameters);
        let inputs = self.nodes[index].rederived_inputs(&parameters);

        if let Some(inputs) = &inputs
            && let Some(orphaned) = self.connections.iter().find(|c| {
                &c.target_node_id == node_id && !inputs.iter().any(|p| p.id == c.target_input_id)
            })
        {
            return Err(GraphError::UnknownPort {
                node_id: node_id.clone(),
                port_id: orphaned.target_input_id.clone(),
                direction: PortDirection::Input,
            });
        }

        let node = &mut self.nodes[index];
        node.parameters = parameters;
        if let Some(inputs) = inputs {
            node.inputs = inputs;
        }
        Ok(output)
    }

    /// Applies an edit event from the canvas.
    ///
    /// # Errors
    ///
    /// Returns the same errors as the underlying operation. Removing an
    /// unknown node or connection is an error here, since the canvas should
    /// only emit removals for things it shows.
    pub fn apply(&mut self, edit: GraphEdit) -> Result<(), GraphError> {
        match edit {
            GraphEdit::AddNode { node } => self.add_node(node).map(|_| ()),
            GraphEdit::RemoveNode { node_id } => self
                .remove_node(&node_id)
                .map(|_| ())
                .ok_or(GraphError::UnknownNode { node_id }),
            GraphEdit::AddConnection { connection } => {
                self.add_connection(connection).map(|_| ())
            }
            GraphEdit::RemoveConnection { connection_id } => self
                .remove_connection(&connection_id)
                .map(|_| ())
                .ok_or(GraphError::UnknownConnection { connection_id }),
            GraphEdit::SetParameter {
                node_id,
                key,
                value,
            } => self.set_parameter(&node_id, key, value),
        }
    }

    /// Returns all nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns all connections in insertion order.
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of connections in the graph.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns nodes that have no incoming connections (entry points).
    pub fn entry_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| !self.connections.iter().any(|c| c.target_node_id == n.id))
            .collect()
    }

    /// Fills in empty port lists of every node from the catalog.
    pub fn ensure_ports(&mut self) {
        for node in &mut self.nodes {
            node.ensure_ports();
        }
    }

    /// Validates the workflow graph without modifying it.
    ///
    /// Checks:
    /// - Node IDs are unique
    /// - Port IDs are unique within each node's inputs and outputs
    /// - Connection IDs are unique
    /// - Connections reference existing nodes and ports
    /// - No cycles among well-formed connections
    ///
    /// Returns every violation found, in graph order. An empty list means
    /// the graph is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<GraphError> {
        let mut errors = Vec::new();

        let mut seen_nodes = HashSet::new();
        for node in &self.nodes {
            if !seen_nodes.insert(&node.id) {
                errors.push(GraphError::DuplicateNodeId {
                    node_id: node.id.clone(),
                });
            }
            check_port_ids(node, &node.inputs, PortDirection::Input, &mut errors);
            check_port_ids(node, &node.outputs, PortDirection::Output, &mut errors);
        }

        let mut seen_connections = HashSet::new();
        let mut wired = DiGraphMap::<&str, ()>::new();
        for connection in &self.connections {
            if !seen_connections.insert(&connection.id) {
                errors.push(GraphError::DuplicateConnectionId {
                    connection_id: connection.id.clone(),
                });
            }

            let mut well_formed = true;
            match self.node(&connection.source_node_id) {
                None => {
                    well_formed = false;
                    errors.push(GraphError::UnknownNode {
                        node_id: connection.source_node_id.clone(),
                    });
                }
                Some(source) if source.output_port(&connection.source_output_id).is_none() => {
                    well_formed = false;
                    errors.push(GraphError::UnknownPort {
                        node_id: source.id.clone(),
                        port_id: connection.source_output_id.clone(),
                        direction: PortDirection::Output,
                    });
                }
                Some(_) => {}
            }
            match self.node(&connection.target_node_id) {
                None => {
                    well_formed = false;
                    errors.push(GraphError::UnknownNode {
                        node_id: connection.target_node_id.clone(),
                    });
                }
                Some(target) if target.input_port(&connection.target_input_id).is_none() => {
                    well_formed = false;
                    errors.push(GraphError::UnknownPort {
                        node_id: target.id.clone(),
                        port_id: connection.target_input_id.clone(),
                        direction: PortDirection::Input,
                    });
                }
                Some(_) => {}
            }

            if well_formed {
                wired.add_edge(
                    connection.source_node_id.as_str(),
                    connection.target_node_id.as_str(),
                    (),
                );
            }
        }

        if petgraph::algo::is_cyclic_directed(&wired) {
            errors.push(GraphError::CycleDetected);
        }

        errors
    }
}

fn check_port_ids(
    node: &Node,
    ports: &[Port],
    direction: PortDirection,
    errors: &mut Vec<GraphError>,
) {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.id.as_str()) {
            errors.push(GraphError::DuplicatePortId {
                node_id: node.id.clone(),
                port_id: port.id.clone(),
                direction,
            });
        }
    }
}
