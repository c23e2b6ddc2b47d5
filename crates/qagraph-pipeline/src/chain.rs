//! Chain model: the strictly linear sequence of host nodes built for one asset.
//!
//! Back-pointers are recorded at construction time so ancestry never requires a
//! round-trip to the host.

use qagraph_types::ParamValue;

use crate::host::NodeHandle;

/// Identifies one chain within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub usize);

/// Where an assigned parameter value came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal,
    Substituted { token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignedParam {
    pub name: String,
    pub value: ParamValue,
    pub source: ValueSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub handle: NodeHandle,
    pub type_name: String,
    pub position: usize,
    /// Position of the node feeding this one's primary input.
    pub input: Option<usize>,
    pub params: Vec<AssignedParam>,
}

impl ChainNode {
    pub fn param(&self, name: &str) -> Option<&AssignedParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    id: ChainId,
    asset: String,
    nodes: Vec<ChainNode>,
}

impl Chain {
    pub fn new(id: ChainId, asset: impl Into<String>) -> Self {
        Self {
            id,
            asset: asset.into(),
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Append a node; its primary input is the current last element.
    pub fn push(
        &mut self,
        handle: NodeHandle,
        type_name: impl Into<String>,
        params: Vec<AssignedParam>,
    ) -> usize {
        let position = self.nodes.len();
        self.nodes.push(ChainNode {
            handle,
            type_name: type_name.into(),
            position,
            input: position.checked_sub(1),
            params,
        });
        position
    }

    pub fn nodes(&self) -> &[ChainNode] {
        &self.nodes
    }

    pub fn node(&self, position: usize) -> Option<&ChainNode> {
        self.nodes.get(position)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<&ChainNode> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&ChainNode> {
        self.nodes.last()
    }

    pub fn position_of(&self, handle: NodeHandle) -> Option<usize> {
        self.nodes.iter().position(|n| n.handle == handle)
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.position_of(handle).is_some()
    }

    /// Every node upstream of `position`, earliest first, excluding `position` itself.
    pub fn ancestors(&self, position: usize) -> Vec<&ChainNode> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(position).and_then(|n| n.input);
        while let Some(pos) = current {
            let node = &self.nodes[pos];
            out.push(node);
            current = node.input;
        }
        out.reverse();
        out
    }
}
