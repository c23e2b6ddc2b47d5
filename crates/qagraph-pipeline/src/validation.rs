//! Pipeline specification parsing and structural validation.
//!
//! A pipeline is a JSON object with a single `nodes` key holding an ordered list of
//! node records. Each record names a host node type and carries directives:
//!
//! ```json
//! {
//!     "nodes": [
//!         { "type_name": "file", "parm_file": "$ASSET_INPUT_PATH" },
//!         { "type_name": "clean", "parm_fixoverlap": true },
//!         { "type_name": "report_json", "parm_json_path": "$REPORT_PATH", "press_write": true },
//!         {
//!             "type_name": "rop_geometry",
//!             "parm_sopoutput": "$ASSET_OUTPUT_PATH",
//!             "press_execute": true
//!         }
//!     ]
//! }
//! ```
//!
//! Call [`parse_pipeline`] on raw text or [`validate`] on an already parsed value.
//! Directive prefixes are resolved here, once, into [`Directive`] values.

use qagraph_types::{ParamValue, SpecError};
use serde_json::Value;

pub const NODES_KEY: &str = "nodes";
pub const TYPE_NAME_KEY: &str = "type_name";
/// Key used by older pipeline files; accepted as an alias of [`TYPE_NAME_KEY`].
pub const LEGACY_TYPE_NAME_KEY: &str = "node_type_name";
pub const PARM_PREFIX: &str = "parm_";
pub const PRESS_PREFIX: &str = "press_";

// ---------------------------------------------------------------------------
// Validated types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Assign `value` to the parameter `name`.
    Parameter { name: String, value: ParamValue },
    /// Press the action `name` once every chain is built.
    Trigger { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub type_name: String,
    /// Directives in declaration order.
    pub directives: Vec<Directive>,
}

impl NodeSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            directives: Vec::new(),
        }
    }

    pub fn parm(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.directives.push(Directive::Parameter {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn press(mut self, name: impl Into<String>) -> Self {
        self.directives.push(Directive::Trigger { name: name.into() });
        self
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Parameter { name, value } => Some((name.as_str(), value)),
            Directive::Trigger { .. } => None,
        })
    }

    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Trigger { name } => Some(name.as_str()),
            Directive::Parameter { .. } => None,
        })
    }
}

/// An ordered, validated sequence of node specs. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineSpec {
    nodes: Vec<NodeSpec>,
}

impl PipelineSpec {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Serialize back into the transport format.
    pub fn to_json(&self) -> Value {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| {
                let mut obj = serde_json::Map::new();
                obj.insert(TYPE_NAME_KEY.into(), Value::String(node.type_name.clone()));
                for directive in &node.directives {
                    match directive {
                        Directive::Parameter { name, value } => {
                            obj.insert(
                                format!("{PARM_PREFIX}{name}"),
                                serde_json::to_value(value).unwrap_or(Value::Null),
                            );
                        }
                        Directive::Trigger { name } => {
                            obj.insert(format!("{PRESS_PREFIX}{name}"), Value::Bool(true));
                        }
                    }
                }
                Value::Object(obj)
            })
            .collect();
        let mut root = serde_json::Map::new();
        root.insert(NODES_KEY.into(), Value::Array(nodes));
        Value::Object(root)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse pipeline text and validate it.
pub fn parse_pipeline(text: &str) -> Result<PipelineSpec, SpecError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| SpecError::Syntax(e.to_string()))?;
    validate(&raw)
}

/// Structurally validate a parsed pipeline. Pure; never touches a host.
pub fn validate(raw: &Value) -> Result<PipelineSpec, SpecError> {
    let root = raw.as_object().ok_or_else(|| SpecError::MissingKey { found: Vec::new() })?;

    let keys: Vec<String> = root.keys().cloned().collect();
    if keys.len() != 1 || keys[0] != NODES_KEY {
        return Err(SpecError::MissingKey { found: keys });
    }

    let elements = root[NODES_KEY].as_array().ok_or(SpecError::WrongType {
        path: NODES_KEY.into(),
        expected: "a list",
    })?;

    let nodes = elements
        .iter()
        .enumerate()
        .map(|(index, element)| validate_node(index, element))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PipelineSpec { nodes })
}

fn validate_node(index: usize, element: &Value) -> Result<NodeSpec, SpecError> {
    let record = element.as_object().ok_or_else(|| SpecError::WrongType {
        path: format!("{NODES_KEY}[{index}]"),
        expected: "an object",
    })?;

    let type_keys: Vec<&String> = record
        .keys()
        .filter(|k| *k == TYPE_NAME_KEY || *k == LEGACY_TYPE_NAME_KEY)
        .collect();
    let type_key = match type_keys.as_slice() {
        [] => return Err(SpecError::MissingTypeName { index }),
        [key] => key.as_str(),
        [_, second, ..] => {
            return Err(SpecError::UnknownKey {
                index,
                key: second.to_string(),
            })
        }
    };

    let type_name = match record[type_key].as_str() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => {
            return Err(SpecError::WrongType {
                path: format!("{NODES_KEY}[{index}].{type_key}"),
                expected: "a non-empty string",
            })
        }
    };

    let mut directives = Vec::new();
    for (key, value) in record {
        if key == type_key {
            continue;
        }
        if let Some(name) = non_empty_suffix(key, PARM_PREFIX) {
            let value = ParamValue::from_json(value).ok_or_else(|| SpecError::WrongType {
                path: format!("{NODES_KEY}[{index}].{key}"),
                expected: "a boolean, number, or string",
            })?;
            directives.push(Directive::Parameter {
                name: name.to_string(),
                value,
            });
        } else if let Some(name) = non_empty_suffix(key, PRESS_PREFIX) {
            directives.push(Directive::Trigger {
                name: name.to_string(),
            });
        } else {
            return Err(SpecError::UnknownKey {
                index,
                key: key.clone(),
            });
        }
    }

    Ok(NodeSpec {
        type_name,
        directives,
    })
}

fn non_empty_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
