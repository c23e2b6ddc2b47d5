//! In-process host session backed by plain collections.
//!
//! Node types are registered up front with their parameters, triggers, and the
//! diagnostics they emit once cooked. Every mutating call is recorded so tests can
//! assert on what the engine asked the host to do.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use qagraph_types::{HostError, ParamValue, Status};

use crate::collector::WARNING_PREFIX;
use crate::host::{ActionHandle, HostResult, HostSession, NodeHandle, ParamHandle};

/// A registered node type.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeDef {
    pub name: String,
    pub params: Vec<(String, ParamValue)>,
    pub triggers: Vec<String>,
    /// Warnings reported once the node has cooked.
    pub warnings: Vec<String>,
    /// Errors reported once the node has cooked.
    pub errors: Vec<String>,
    /// Cooking this node, or anything downstream of it, fails.
    pub fail_cook: bool,
}

impl NodeTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A check node that reports `status`/`message` the way check code does.
    pub fn check(name: impl Into<String>, status: Status, message: &str) -> Self {
        Self::new(name).warning(verdict_warning(status.as_str(), message))
    }

    pub fn param(mut self, name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), default.into()));
        self
    }

    pub fn trigger(mut self, name: impl Into<String>) -> Self {
        self.triggers.push(name.into());
        self
    }

    pub fn warning(mut self, text: impl Into<String>) -> Self {
        self.warnings.push(text.into());
        self
    }

    pub fn error(mut self, text: impl Into<String>) -> Self {
        self.errors.push(text.into());
        self
    }

    pub fn failing_cook(mut self) -> Self {
        self.fail_cook = true;
        self
    }
}

/// Format a verdict exactly as the check nodes' reporting helper does.
pub fn verdict_warning(status: &str, message: &str) -> String {
    let record = serde_json::json!({ "status": status, "message": message });
    let body = serde_json::to_string_pretty(&record).unwrap_or_default();
    format!("{WARNING_PREFIX}{body}")
}

#[derive(Debug, Clone)]
struct MemoryNode {
    name: String,
    type_name: String,
    params: BTreeMap<String, ParamValue>,
    input: Option<NodeHandle>,
    cooked: bool,
}

/// Host session that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryHost {
    types: HashMap<String, NodeTypeDef>,
    nodes: BTreeMap<NodeHandle, MemoryNode>,
    name_counters: HashMap<String, usize>,
    next_handle: u64,
    fired: Vec<ActionHandle>,
    saved_scenes: Vec<PathBuf>,
    layout_calls: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the types a typical checks pipeline needs: `file` and `report_json`.
    pub fn with_standard_types() -> Self {
        let mut host = Self::new();
        host.register(NodeTypeDef::new("file").param("file", ""));
        host.register(
            NodeTypeDef::new("report_json")
                .param("json_path", "")
                .trigger("write"),
        );
        host
    }

    pub fn register(&mut self, def: NodeTypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Triggers fired directly on the host, in order.
    pub fn fired(&self) -> &[ActionHandle] {
        &self.fired
    }

    pub fn saved_scenes(&self) -> &[PathBuf] {
        &self.saved_scenes
    }

    pub fn layout_calls(&self) -> usize {
        self.layout_calls
    }

    pub fn value_of(&self, node: NodeHandle, param: &str) -> Option<&ParamValue> {
        self.nodes.get(&node)?.params.get(param)
    }

    fn node(&self, handle: NodeHandle) -> HostResult<&MemoryNode> {
        self.nodes
            .get(&handle)
            .ok_or(HostError::UnknownHandle(handle.0))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> HostResult<&mut MemoryNode> {
        self.nodes
            .get_mut(&handle)
            .ok_or(HostError::UnknownHandle(handle.0))
    }

    fn type_of(&self, handle: NodeHandle) -> HostResult<&NodeTypeDef> {
        let node = self.node(handle)?;
        self.types
            .get(&node.type_name)
            .ok_or_else(|| HostError::UnknownNodeType(node.type_name.clone()))
    }

    /// `handle` followed by its upstream nodes, nearest first.
    fn upstream(&self, handle: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        let mut out = vec![handle];
        let mut current = self.node(handle)?.input;
        while let Some(h) = current {
            if out.contains(&h) {
                return Err(HostError::OperationFailed(format!(
                    "cycle detected upstream of {handle}"
                )));
            }
            out.push(h);
            current = self.node(h)?.input;
        }
        Ok(out)
    }
}

impl HostSession for MemoryHost {
    fn create_node(&mut self, type_name: &str) -> HostResult<NodeHandle> {
        let def = self
            .types
            .get(type_name)
            .ok_or_else(|| HostError::UnknownNodeType(type_name.to_string()))?;
        let params = def.params.iter().cloned().collect();

        let counter = self.name_counters.entry(type_name.to_string()).or_insert(0);
        *counter += 1;
        let name = format!("{type_name}{counter}");

        self.next_handle += 1;
        let handle = NodeHandle(self.next_handle);
        self.nodes.insert(
            handle,
            MemoryNode {
                name,
                type_name: type_name.to_string(),
                params,
                input: None,
                cooked: false,
            },
        );
        Ok(handle)
    }

    fn destroy_node(&mut self, node: NodeHandle) -> HostResult<()> {
        self.nodes
            .remove(&node)
            .ok_or(HostError::UnknownHandle(node.0))?;
        for other in self.nodes.values_mut() {
            if other.input == Some(node) {
                other.input = None;
            }
        }
        Ok(())
    }

    fn connect_input(&mut self, node: NodeHandle, upstream: NodeHandle) -> HostResult<()> {
        self.node(upstream)?;
        self.node_mut(node)?.input = Some(upstream);
        Ok(())
    }

    fn node_name(&mut self, node: NodeHandle) -> HostResult<String> {
        Ok(self.node(node)?.name.clone())
    }

    fn node_type(&mut self, node: NodeHandle) -> HostResult<String> {
        Ok(self.node(node)?.type_name.clone())
    }

    fn get_parameter(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ParamHandle>> {
        Ok(self
            .node(node)?
            .params
            .contains_key(name)
            .then(|| ParamHandle {
                node,
                name: name.to_string(),
            }))
    }

    fn set_parameter_value(&mut self, param: &ParamHandle, value: &ParamValue) -> HostResult<()> {
        let slot = self
            .node_mut(param.node)?
            .params
            .get_mut(&param.name)
            .ok_or_else(|| HostError::OperationFailed(format!("no parm '{}'", param.name)))?;
        *slot = value.clone();
        Ok(())
    }

    fn parameter_value(&mut self, param: &ParamHandle) -> HostResult<ParamValue> {
        self.node(param.node)?
            .params
            .get(&param.name)
            .cloned()
            .ok_or_else(|| HostError::OperationFailed(format!("no parm '{}'", param.name)))
    }

    fn get_trigger(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ActionHandle>> {
        let def = self.type_of(node)?;
        Ok(def.triggers.iter().any(|t| t == name).then(|| ActionHandle {
            node,
            name: name.to_string(),
        }))
    }

    fn fire_trigger(&mut self, trigger: &ActionHandle) -> HostResult<()> {
        self.node(trigger.node)?;
        self.fired.push(trigger.clone());
        Ok(())
    }

    fn cook(&mut self, node: NodeHandle) -> HostResult<()> {
        let upstream = self.upstream(node)?;
        let mut failed = None;
        for handle in &upstream {
            if self.type_of(*handle)?.fail_cook {
                failed = Some(self.node(*handle)?.name.clone());
            }
            self.node_mut(*handle)?.cooked = true;
        }
        match failed {
            Some(name) => Err(HostError::CookFailed(format!("error while cooking '{name}'"))),
            None => Ok(()),
        }
    }

    fn warnings(&mut self, node: NodeHandle) -> HostResult<Vec<String>> {
        if !self.node(node)?.cooked {
            return Ok(Vec::new());
        }
        Ok(self.type_of(node)?.warnings.clone())
    }

    fn errors(&mut self, node: NodeHandle) -> HostResult<Vec<String>> {
        if !self.node(node)?.cooked {
            return Ok(Vec::new());
        }
        Ok(self.type_of(node)?.errors.clone())
    }

    fn inputs(&mut self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        Ok(self.node(node)?.input.into_iter().collect())
    }

    fn layout(&mut self) -> HostResult<()> {
        self.layout_calls += 1;
        Ok(())
    }

    fn save_scene(&mut self, path: &Path) -> HostResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let scene: Vec<serde_json::Value> = self
            .nodes
            .iter()
            .map(|(handle, node)| {
                serde_json::json!({
                    "handle": handle,
                    "name": node.name,
                    "type": node.type_name,
                    "input": node.input,
                    "params": node.params,
                })
            })
            .collect();
        let text = serde_json::to_string_pretty(&scene)
            .map_err(|e| HostError::OperationFailed(e.to_string()))?;
        std::fs::write(path, text)?;
        self.saved_scenes.push(path.to_path_buf());
        Ok(())
    }
}
