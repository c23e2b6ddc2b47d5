//! The host session capability: the only way the engine touches the node graph host.
//!
//! Real implementations differ (in-process scripting bridge, out-of-process RPC,
//! the in-memory test double); the engine relies only on these operation contracts.
//! A session is not safe for concurrent mutation, so every method takes `&mut self`.

use std::path::Path;

use qagraph_types::{HostError, ParamValue};
use serde::{Deserialize, Serialize};

/// Opaque handle to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHandle(pub u64);

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved parameter on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamHandle {
    pub node: NodeHandle,
    pub name: String,
}

/// A resolved triggerable action (button) on a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionHandle {
    pub node: NodeHandle,
    pub name: String,
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Abstraction over the external, stateful node graph host.
pub trait HostSession {
    /// Instantiate a node. Fails with [`HostError::UnknownNodeType`] for unrecognized types.
    fn create_node(&mut self, type_name: &str) -> HostResult<NodeHandle>;

    /// Remove a node and every connection touching it.
    fn destroy_node(&mut self, node: NodeHandle) -> HostResult<()>;

    /// Connect `upstream`'s primary output into `node`'s primary input.
    fn connect_input(&mut self, node: NodeHandle, upstream: NodeHandle) -> HostResult<()>;

    fn node_name(&mut self, node: NodeHandle) -> HostResult<String>;

    fn node_type(&mut self, node: NodeHandle) -> HostResult<String>;

    fn get_parameter(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ParamHandle>>;

    fn set_parameter_value(&mut self, param: &ParamHandle, value: &ParamValue) -> HostResult<()>;

    /// Evaluate a parameter's current value.
    fn parameter_value(&mut self, param: &ParamHandle) -> HostResult<ParamValue>;

    fn get_trigger(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ActionHandle>>;

    fn fire_trigger(&mut self, trigger: &ActionHandle) -> HostResult<()>;

    /// Force the node (and its upstream) to execute. Fails with [`HostError::CookFailed`].
    fn cook(&mut self, node: NodeHandle) -> HostResult<()>;

    fn warnings(&mut self, node: NodeHandle) -> HostResult<Vec<String>>;

    fn errors(&mut self, node: NodeHandle) -> HostResult<Vec<String>>;

    /// Upstream nodes connected to `node`; the primary input comes first.
    fn inputs(&mut self, node: NodeHandle) -> HostResult<Vec<NodeHandle>>;

    /// Tidy the node layout of the scene.
    fn layout(&mut self) -> HostResult<()>;

    /// Persist the whole scene for debugging.
    fn save_scene(&mut self, path: &Path) -> HostResult<()>;
}
