//! Graph builder: instantiates a validated pipeline as one chain of host nodes.
//!
//! Parameter values are assigned immediately (with token substitution). Triggers are
//! only resolved here and handed back as deferred [`TriggerHandle`]s; firing them is
//! the coordinator's job, after every chain in the session has been built.

use qagraph_types::{BuildError, HostError, ParamValue};

use crate::chain::{AssignedParam, Chain, ChainId, ValueSource};
use crate::host::{ActionHandle, HostSession, NodeHandle};
use crate::substitution::{SubstitutionMap, ASSET_INPUT_PATH};
use crate::validation::{Directive, NodeSpec, PipelineSpec};

/// A resolved, not yet fired, trigger request.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerHandle {
    pub chain: ChainId,
    /// Position of the owning node in its chain.
    pub position: usize,
    pub node_type: String,
    pub name: String,
    pub action: ActionHandle,
}

/// Output of one build: the chain plus its deferred triggers in declaration order.
#[derive(Debug, Clone)]
pub struct BuiltChain {
    pub chain: Chain,
    pub triggers: Vec<TriggerHandle>,
}

/// Hands out chain ids and builds chains against a host session.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    next_chain: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `spec` for the asset described by `subs`.
    ///
    /// On failure every node created by this call is destroyed again before the
    /// error is returned, so a failed build leaves no nodes behind.
    pub fn build(
        &mut self,
        spec: &PipelineSpec,
        host: &mut dyn HostSession,
        subs: &SubstitutionMap,
    ) -> Result<BuiltChain, BuildError> {
        let id = ChainId(self.next_chain);
        self.next_chain += 1;

        let asset = subs.get(ASSET_INPUT_PATH).unwrap_or_default();
        let mut built = BuiltChain {
            chain: Chain::new(id, asset),
            triggers: Vec::new(),
        };
        let mut created = Vec::new();

        for node_spec in spec.nodes() {
            if let Err(err) = build_node(node_spec, host, subs, &mut built, &mut created) {
                rollback(host, &created);
                tracing::warn!(asset = %asset, error = %err, "Chain build failed");
                return Err(err);
            }
        }

        tracing::info!(
            asset = %asset,
            chain = id.0,
            nodes = built.chain.len(),
            triggers = built.triggers.len(),
            "Chain built"
        );
        Ok(built)
    }
}

fn build_node(
    node_spec: &NodeSpec,
    host: &mut dyn HostSession,
    subs: &SubstitutionMap,
    built: &mut BuiltChain,
    created: &mut Vec<NodeHandle>,
) -> Result<(), BuildError> {
    let type_name = node_spec.type_name.as_str();
    let handle = host.create_node(type_name).map_err(|err| match err {
        HostError::UnknownNodeType(_) => BuildError::UnknownNodeType {
            type_name: type_name.to_string(),
        },
        other => BuildError::Host(other),
    })?;
    created.push(handle);

    let position = built.chain.len();
    let mut params = Vec::new();
    let mut triggers = Vec::new();

    for directive in &node_spec.directives {
        match directive {
            Directive::Parameter { name, value } => {
                let param = host.get_parameter(handle, name)?.ok_or_else(|| {
                    BuildError::UnknownParameter {
                        type_name: type_name.to_string(),
                        name: name.clone(),
                    }
                })?;
                let (value, source) = match subs.lookup(value) {
                    Some((token, substituted)) => (
                        ParamValue::from(substituted),
                        ValueSource::Substituted {
                            token: token.to_string(),
                        },
                    ),
                    None => (value.clone(), ValueSource::Literal),
                };
                host.set_parameter_value(&param, &value)?;
                tracing::debug!(node = %handle, parm = %name, value = %value, "Parameter set");
                params.push(AssignedParam {
                    name: name.clone(),
                    value,
                    source,
                });
            }
            Directive::Trigger { name } => {
                let action = host.get_trigger(handle, name)?.ok_or_else(|| {
                    BuildError::UnknownTrigger {
                        type_name: type_name.to_string(),
                        name: name.clone(),
                    }
                })?;
                triggers.push(TriggerHandle {
                    chain: built.chain.id(),
                    position,
                    node_type: type_name.to_string(),
                    name: name.clone(),
                    action,
                });
            }
        }
    }

    if let Some(previous) = built.chain.last() {
        host.connect_input(handle, previous.handle)?;
    }
    built.chain.push(handle, type_name, params);
    built.triggers.extend(triggers);
    Ok(())
}

fn rollback(host: &mut dyn HostSession, created: &[NodeHandle]) {
    for handle in created.iter().rev() {
        if let Err(err) = host.destroy_node(*handle) {
            tracing::warn!(node = %handle, error = %err, "Failed to destroy node during rollback");
        }
    }
}
