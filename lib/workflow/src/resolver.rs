//! Execution-input resolver.
//!
//! Before a run, finds the required inputs that still have no value and,
//! once the user has supplied them, builds the per-node input map handed to
//! the runner. Collected values are keyed `"nodeId.inputId"` and coerced to
//! their port's type here, exactly once.

use crate::compiler::{CompiledNode, CompiledWorkflow};
use crate::error::ResolveError;
use crate::node::{NodeId, Parameters};
use crate::port::{Port, PortType, is_blank};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Values entered by the user, keyed `"nodeId.inputId"`.
pub type CollectedValues = BTreeMap<String, JsonValue>;

/// Per-node inputs of a run: the node's config with collected values on top.
pub type InputMap = BTreeMap<NodeId, Parameters>;

/// A required input that has no value yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingInput {
    pub node_id: NodeId,
    pub input_id: String,
    /// The port's human-readable name.
    pub label: String,
    pub node_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub port_type: PortType,
}

impl MissingInput {
    fn new(node: &CompiledNode, port: &Port) -> Self {
        Self {
            node_id: node.id.clone(),
            input_id: port.id.clone(),
            label: port.name.clone(),
            node_label: node.label.clone(),
            description: port.description.clone(),
            port_type: port.port_type,
        }
    }

    /// The collected-values key of this input.
    #[must_use]
    pub fn key(&self) -> String {
        input_key(&self.node_id, &self.input_id)
    }
}

/// Builds the `"nodeId.inputId"` key of an input.
#[must_use]
pub fn input_key(node_id: &NodeId, input_id: &str) -> String {
    format!("{node_id}.{input_id}")
}

/// Lists every required input whose configured value is absent or blank,
/// in node order then port order.
#[must_use]
pub fn find_missing_required_inputs(compiled: &CompiledWorkflow) -> Vec<MissingInput> {
    compiled
        .nodes
        .iter()
        .flat_map(|node| {
            node.inputs
                .iter()
                .filter(|port| port.required && node.config.get(&port.id).is_none_or(is_blank))
                .map(move |port| MissingInput::new(node, port))
        })
        .collect()
}

/// Builds the input map of a run.
///
/// Every node gets an entry. Collected keys that do not name an input of
/// the workflow are logged and ignored. Missing boolean inputs that were not
/// collected are set to `false`.
///
/// # Errors
///
/// Returns an error if a collected value cannot be coerced to its port's
/// number or boolean type.
#[instrument(
    skip(compiled, collected),
    fields(workflow_id = %compiled.workflow_id, collected = collected.len())
)]
pub fn resolve(
    compiled: &CompiledWorkflow,
    collected: &CollectedValues,
) -> chainflow_core::Result<InputMap, ResolveError> {
    let mut input_map: InputMap = compiled
        .nodes
        .iter()
        .map(|node| (node.id.clone(), node.config.clone()))
        .collect();

    for (key, value) in collected {
        let Some((node, port)) = lookup(compiled, key) else {
            warn!(key = %key, "ignoring collected value for unknown input");
            continue;
        };
        let coerced = coerce(port.port_type, value).ok_or_else(|| invalid(node, port, value))?;
        if let Some(entry) = input_map.get_mut(&node.id) {
            entry.insert(port.id.clone(), coerced);
        }
    }

    for missing in find_missing_required_inputs(compiled) {
        if missing.port_type == PortType::Boolean && !collected.contains_key(&missing.key()) {
            debug!(key = %missing.key(), "defaulting unset boolean input to false");
            if let Some(entry) = input_map.get_mut(&missing.node_id) {
                entry.insert(missing.input_id, JsonValue::Bool(false));
            }
        }
    }

    Ok(input_map)
}

/// Coerces a collected value to a port type.
///
/// Numbers accept JSON numbers and numeric strings; integral values become
/// integers. Booleans are tri-state: `true`/`"true"` is true, while
/// `false`/`"false"`, null and blank strings are false. Other types pass
/// through. Returns `None` if the value does not fit.
#[must_use]
pub fn coerce(port_type: PortType, value: &JsonValue) -> Option<JsonValue> {
    match port_type {
        PortType::Number => coerce_number(value),
        PortType::Boolean => coerce_boolean(value),
        PortType::String | PortType::Array | PortType::Object | PortType::Any => {
            Some(value.clone())
        }
    }
}

fn coerce_number(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Number(_) => Some(value.clone()),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(int) = s.parse::<i64>() {
                return Some(JsonValue::from(int));
            }
            let float = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
            integral(float).map_or_else(
                || Number::from_f64(float).map(JsonValue::Number),
                |int| Some(JsonValue::from(int)),
            )
        }
        _ => None,
    }
}

/// The integer value of a float with no fractional part, within the range
/// where every integer is exactly representable.
#[allow(clippy::cast_possible_truncation)]
fn integral(float: f64) -> Option<i64> {
    (float.fract() == 0.0 && float.abs() < 9.0e15).then(|| float as i64)
}

fn coerce_boolean(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Bool(_) => Some(value.clone()),
        JsonValue::Null => Some(JsonValue::Bool(false)),
        JsonValue::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(JsonValue::Bool(true))
            } else if s.is_empty() || s.eq_ignore_ascii_case("false") {
                Some(JsonValue::Bool(false))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Finds the node and input port a `"nodeId.inputId"` key names.
pub(crate) fn lookup<'a>(
    compiled: &'a CompiledWorkflow,
    key: &str,
) -> Option<(&'a CompiledNode, &'a Port)> {
    let (node_id, input_id) = key.rsplit_once('.')?;
    let node = compiled.node(&NodeId::from(node_id))?;
    let port = node.input_port(input_id)?;
    Some((node, port))
}

fn invalid(node: &CompiledNode, port: &Port, value: &JsonValue) -> ResolveError {
    let node_id = node.id.clone();
    let input_id = port.id.clone();
    let value = match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    if port.port_type == PortType::Boolean {
        ResolveError::InvalidBoolean {
            node_id,
            input_id,
            value,
        }
    } else {
        ResolveError::InvalidNumber {
            node_id,
            input_id,
            value,
        }
    }
}
