//! Graph compiler.
//!
//! Turns an editable [`WorkflowGraph`] into the wire-format
//! [`CompiledWorkflow`] that is persisted and handed to the runner. Create
//! and update both go through [`Compiler::compile`]; there is no second
//! code path that could derive ports or configs differently.

use crate::catalog;
use crate::connection::Connection;
use crate::error::{CompileError, GraphError};
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeCategory, NodeId, Parameters, Position};
use crate::port::Port;
use chainflow_core::WorkflowId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Compiler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Reject parameters that are neither an input port nor a derived
    /// default of their node.
    pub strict_parameters: bool,
    /// Treat cycles in the connection graph as a validation finding.
    pub reject_cycles: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strict_parameters: true,
            reject_cycles: true,
        }
    }
}

/// Execution bucket of a compiled node, read by the runner and the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Input,
    Protocol,
    Output,
    Logic,
    Data,
}

impl NodeKind {
    /// Maps a node category to its execution kind.
    #[must_use]
    pub const fn from_category(category: NodeCategory) -> Self {
        match category {
            NodeCategory::Protocol => Self::Protocol,
            NodeCategory::Communication => Self::Output,
            NodeCategory::Condition => Self::Logic,
            NodeCategory::Transform => Self::Data,
            NodeCategory::Trigger | NodeCategory::Memory | NodeCategory::Unknown => Self::Input,
        }
    }
}

/// A node ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub category: NodeCategory,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: Position,
    /// Derived defaults with the user's parameters on top.
    pub config: Parameters,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl CompiledNode {
    /// Returns the input port with the given id, if any.
    #[must_use]
    pub fn input_port(&self, id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == id)
    }
}

/// Connections are carried into the compiled form unchanged.
pub type CompiledConnection = Connection;

/// The compiled, persisted form of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledWorkflow {
    /// The workflow this was compiled for. Memory keys are scoped to it.
    pub workflow_id: WorkflowId,
    pub nodes: Vec<CompiledNode>,
    pub connections: Vec<CompiledConnection>,
}

impl CompiledWorkflow {
    /// Returns a compiled node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&CompiledNode> {
        self.nodes.iter().find(|n| &n.id == node_id)
    }
}

/// Compiles workflow graphs.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Creates a compiler with the given settings.
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Returns the compiler settings.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Validation findings that block compilation under these settings.
    #[must_use]
    pub fn graph_findings(&self, graph: &WorkflowGraph) -> Vec<GraphError> {
        let mut errors = graph.validate();
        if !self.config.reject_cycles {
            errors.retain(|e| *e != GraphError::CycleDetected);
        }
        errors
    }

    /// Compiles a graph owned by `workflow_id`.
    ///
    /// Empty port lists are derived from the catalog before validation, so a
    /// graph loaded without ports compiles the same as one built in the
    /// editor.
    ///
    /// # Errors
    ///
    /// - `IncompleteGraph` with every validation finding
    /// - `UndeclaredParameters` with every offending node, when strict
    #[instrument(skip(self, graph), fields(workflow_id = %workflow_id, nodes = graph.node_count()))]
    pub fn compile(
        &self,
        graph: &WorkflowGraph,
        workflow_id: &WorkflowId,
    ) -> chainflow_core::Result<CompiledWorkflow, CompileError> {
        let mut graph = graph.clone();
        graph.ensure_ports();

        let errors = self.graph_findings(&graph);
        if !errors.is_empty() {
            warn!(errors = errors.len(), "workflow graph failed validation");
            return Err(CompileError::IncompleteGraph {
                workflow_id: workflow_id.clone(),
                errors,
            }
            .into());
        }

        let mut undeclared = Vec::new();
        let mut nodes = Vec::with_capacity(graph.node_count());
        for node in graph.nodes() {
            let defaults = catalog::derive_default_config(
                node.category,
                &node.label,
                &node.parameters,
                workflow_id,
            );
            if self.config.strict_parameters {
                let keys = undeclared_keys(node, &defaults);
                if !keys.is_empty() {
                    undeclared.push((node.id.clone(), keys));
                }
            }
            nodes.push(compile_node(node, defaults));
        }

        if !undeclared.is_empty() {
            warn!(nodes = undeclared.len(), "undeclared node parameters");
            return Err(CompileError::UndeclaredParameters {
                workflow_id: workflow_id.clone(),
                nodes: undeclared,
            }
            .into());
        }

        info!(
            nodes = nodes.len(),
            connections = graph.connection_count(),
            "compiled workflow"
        );
        Ok(CompiledWorkflow {
            workflow_id: workflow_id.clone(),
            nodes,
            connections: graph.connections().to_vec(),
        })
    }
}

/// Compiles a graph with the default settings.
///
/// # Errors
///
/// See [`Compiler::compile`].
pub fn compile(
    graph: &WorkflowGraph,
    workflow_id: &WorkflowId,
) -> chainflow_core::Result<CompiledWorkflow, CompileError> {
    Compiler::default().compile(graph, workflow_id)
}

fn compile_node(node: &Node, defaults: Parameters) -> CompiledNode {
    let mut config = defaults;
    for (key, value) in &node.parameters {
        if value.is_null() {
            continue;
        }
        config.insert(key.clone(), value.clone());
    }

    let kind = NodeKind::from_category(node.category);
    debug!(node_id = %node.id, category = %node.category, ?kind, "compiled node");

    CompiledNode {
        id: node.id.clone(),
        kind,
        category: node.category,
        label: node.label.clone(),
        description: node.description.clone(),
        position: node.position,
        config,
        inputs: node.inputs.clone(),
        outputs: node.outputs.clone(),
    }
}

/// Parameter keys outside the node's schema, sorted.
///
/// Unknown categories have no schema and are not checked.
fn undeclared_keys(node: &Node, defaults: &Parameters) -> Vec<String> {
    if node.category == NodeCategory::Unknown {
        return Vec::new();
    }
    node.parameters
        .keys()
        .filter(|key| !defaults.contains_key(*key) && node.input_port(key).is_none())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortType;
    use serde_json::{Value as JsonValue, json};

    fn params(value: JsonValue) -> Parameters {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn price_alert_graph() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("feed", NodeCategory::Protocol, "Pyth Price Feed")
                    .with_parameters(params(json!({"symbol": "SOL/USD"}))),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("check", NodeCategory::Condition, "Price above threshold")
                    .with_parameters(params(json!({"threshold": 150}))),
            )
            .unwrap();
        graph
            .add_node(Node::new("notify", NodeCategory::Communication, "Telegram alert"))
            .unwrap();
        graph
            .add_connection(Connection::with_id("c1", "feed", "price", "check", "value"))
            .unwrap();
        graph
            .add_connection(Connection::with_id("c2", "check", "result", "notify", "message"))
            .unwrap();
        graph
    }

    #[test]
    fn memory_node_is_scoped_to_workflow() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("m", NodeCategory::Memory, "Memory").with_parameters(params(
                    json!({"operation": "store", "valueSource": "manual"}),
                )),
            )
            .unwrap();

        let compiled = compile(&graph, &WorkflowId::from("wf_42")).unwrap();
        let node = &compiled.nodes[0];
        assert_eq!(node.config["key"], json!("wf_42"));
        assert_eq!(node.inputs.len(), 1);
        assert_eq!(node.inputs[0].id, "value");
        assert!(node.inputs[0].required);
        assert_eq!(node.kind, NodeKind::Input);
    }

    #[test]
    fn compile_is_deterministic() {
        let graph = price_alert_graph();
        let wf = WorkflowId::from("wf_1");
        let first = compile(&graph, &wf).unwrap();
        let second = compile(&graph, &wf).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn user_parameters_win_over_defaults() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("swap", NodeCategory::Protocol, "Jupiter Swap").with_parameters(params(
                    json!({"slippageBps": 100, "amount": 5, "inputMint": null}),
                )),
            )
            .unwrap();

        let compiled = compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        let config = &compiled.nodes[0].config;
        assert_eq!(config["slippageBps"], json!(100));
        assert_eq!(config["amount"], json!(5));
        assert_eq!(config["protocol"], json!("jupiter"));
        assert_eq!(config["method"], json!("swap"));
        // Null user values do not appear.
        assert!(!config.contains_key("inputMint"));
    }

    #[test]
    fn null_parameter_keeps_default() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("swap", NodeCategory::Protocol, "Jupiter Swap")
                    .with_parameters(params(json!({"slippageBps": null}))),
            )
            .unwrap();
        let compiled = compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        assert_eq!(compiled.nodes[0].config["slippageBps"], json!(50));
    }

    #[test]
    fn explicit_ports_win() {
        let node = Node::new("x", NodeCategory::Protocol, "Jupiter Swap")
            .with_parameters(params(json!({"custom": "yes"})))
            .with_ports(
                vec![Port::required("custom", "Custom", PortType::String)],
                vec![Port::optional("out", "Out", PortType::Any)],
            );
        let graph = WorkflowGraph::from_parts(vec![node], Vec::new());

        let compiled = compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        let ids: Vec<&str> = compiled.nodes[0].inputs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["custom"]);
        assert_eq!(compiled.nodes[0].outputs[0].id, "out");
    }

    #[test]
    fn empty_ports_are_derived_at_compile_time() {
        let graph = WorkflowGraph::from_parts(
            vec![
                Node::without_ports("a", NodeCategory::Protocol, "Pyth Price Feed"),
                Node::without_ports("b", NodeCategory::Condition, "Price above threshold"),
            ],
            vec![Connection::with_id("c1", "a", "price", "b", "value")],
        );

        let compiled = compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        assert_eq!(compiled.nodes[0].outputs.len(), 3);
        assert!(compiled.nodes[1].input_port("threshold").is_some());
        assert_eq!(compiled.connections, graph.connections());
    }

    #[test]
    fn incomplete_graph_reports_every_finding() {
        let graph = WorkflowGraph::from_parts(
            vec![Node::new("a", NodeCategory::Protocol, "Pyth Price Feed")],
            vec![
                Connection::with_id("c1", "a", "price", "ghost", "value"),
                Connection::with_id("c2", "a", "bogus", "a", "symbol"),
            ],
        );

        let err = compile(&graph, &WorkflowId::from("wf_1")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2 graph error(s)"), "{message}");
        assert!(message.contains("unknown node: ghost"), "{message}");
        assert!(message.contains("'bogus'"), "{message}");
    }

    #[test]
    fn undeclared_parameters_are_rejected() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("feed", NodeCategory::Protocol, "Pyth Price Feed")
                    .with_parameters(params(json!({"symbol": "SOL/USD", "sybmol": "typo"}))),
            )
            .unwrap();
        graph
            .add_node(
                Node::new("t", NodeCategory::Trigger, "Start")
                    .with_parameters(params(json!({"extra": 1}))),
            )
            .unwrap();

        let err = compile(&graph, &WorkflowId::from("wf_1")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("node feed: sybmol"), "{message}");
        assert!(message.contains("node t: extra"), "{message}");

        let lenient = Compiler::new(CompilerConfig {
            strict_parameters: false,
            ..CompilerConfig::default()
        });
        let compiled = lenient.compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        assert_eq!(compiled.nodes[0].config["sybmol"], json!("typo"));
    }

    #[test]
    fn derived_default_keys_are_declared() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(
                Node::new("n", NodeCategory::Communication, "Telegram alert")
                    .with_parameters(params(json!({"message": "hi", "channel": "telegram"}))),
            )
            .unwrap();
        let compiled = compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        assert_eq!(compiled.nodes[0].config["chatId"], json!("@me"));
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(NodeKind::from_category(NodeCategory::Trigger), NodeKind::Input);
        assert_eq!(NodeKind::from_category(NodeCategory::Protocol), NodeKind::Protocol);
        assert_eq!(NodeKind::from_category(NodeCategory::Communication), NodeKind::Output);
        assert_eq!(NodeKind::from_category(NodeCategory::Condition), NodeKind::Logic);
        assert_eq!(NodeKind::from_category(NodeCategory::Transform), NodeKind::Data);
        assert_eq!(NodeKind::from_category(NodeCategory::Memory), NodeKind::Input);
        assert_eq!(NodeKind::from_category(NodeCategory::Unknown), NodeKind::Input);
    }

    #[test]
    fn compiler_config_defaults_to_strict() {
        let config: CompilerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.strict_parameters);
        assert!(config.reject_cycles);
    }

    #[test]
    fn cycles_are_rejected_unless_allowed() {
        let mut graph = WorkflowGraph::new();
        graph
            .add_node(Node::new("a", NodeCategory::Protocol, "Pyth Price Feed"))
            .unwrap();
        graph
            .add_node(Node::new("b", NodeCategory::Condition, "Price above threshold"))
            .unwrap();
        graph
            .add_node(Node::new("t", NodeCategory::Transform, "Math"))
            .unwrap();
        for connection in [
            Connection::new("a", "price", "b", "value"),
            Connection::new("b", "value", "t", "a"),
            Connection::new("t", "result", "b", "threshold"),
        ] {
            graph.add_connection(connection).unwrap();
        }

        let err = compile(&graph, &WorkflowId::from("wf_1")).unwrap_err();
        assert!(err.to_string().contains("graph contains cycles"));

        let permissive = Compiler::new(CompilerConfig {
            reject_cycles: false,
            ..CompilerConfig::default()
        });
        assert!(permissive.graph_findings(&graph).is_empty());
        let compiled = permissive.compile(&graph, &WorkflowId::from("wf_1")).unwrap();
        assert_eq!(compiled.connections.len(), 3);
    }

    #[test]
    fn compiled_wire_format() {
        let compiled = compile(&price_alert_graph(), &WorkflowId::from("wf_1")).unwrap();
        let json = serde_json::to_value(&compiled).unwrap();
        assert_eq!(json["workflowId"], "wf_1");
        assert_eq!(json["nodes"][0]["kind"], "protocol");
        assert_eq!(json["nodes"][2]["kind"], "output");
        assert_eq!(json["connections"][0]["sourceNodeId"], "feed");
    }
}
