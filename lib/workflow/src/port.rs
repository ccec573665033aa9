//! Port system for workflow nodes.
//!
//! Ports are named connection points on nodes. Each port carries a coarse
//! value type, a required flag, and an optional default. Input ports double
//! as the schema of a node's parameter bag: a required input whose parameter
//! is blank must be collected before the workflow can run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The value type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl PortType {
    /// Returns the wire name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a port receives or produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// An input or output port on a workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Identifier, unique within the owning node's input (or output) list.
    pub id: String,
    /// Human-readable name shown when the value has to be collected.
    pub name: String,
    /// The value type.
    #[serde(rename = "type")]
    pub port_type: PortType,
    /// Whether a value must be present before execution.
    #[serde(default)]
    pub required: bool,
    /// Value used when the user supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Help text for the port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Port {
    /// Creates a new required port.
    #[must_use]
    pub fn required(id: impl Into<String>, name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            port_type,
            required: true,
            default: None,
            description: None,
        }
    }

    /// Creates a new optional port.
    #[must_use]
    pub fn optional(id: impl Into<String>, name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            required: false,
            ..Self::required(id, name, port_type)
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Returns true if a parameter value counts as "not provided".
///
/// Null, empty or whitespace-only strings, empty arrays and empty objects
/// are blank. Numbers and booleans never are, so `0` and `false` are real
/// values.
#[must_use]
pub fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}
