//! Execution coordinator: fires deferred triggers in collection order.

use std::io::Write;

use qagraph_types::{HostError, ReportError};

use crate::builder::TriggerHandle;
use crate::chain::{Chain, ChainId};
use crate::config::{EngineConfig, Identity};
use crate::hooks::{HookContext, HookOutcome, HookRegistry};
use crate::host::HostSession;

#[derive(Debug)]
pub enum TriggerOutcome {
    /// Fired on the host.
    Fired,
    /// Handled in-process by a hook.
    Hooked(HookOutcome),
    HostFailed(HostError),
    HookFailed(ReportError),
}

impl TriggerOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::HostFailed(_) | Self::HookFailed(_))
    }
}

#[derive(Debug)]
pub struct TriggerRecord {
    pub chain: ChainId,
    pub node_type: String,
    pub name: String,
    pub outcome: TriggerOutcome,
}

pub struct Coordinator<'a> {
    hooks: &'a HookRegistry,
    config: &'a EngineConfig,
    identity: &'a Identity,
}

impl<'a> Coordinator<'a> {
    pub fn new(hooks: &'a HookRegistry, config: &'a EngineConfig, identity: &'a Identity) -> Self {
        Self {
            hooks,
            config,
            identity,
        }
    }

    /// Fire every trigger in the order given. Failures are recorded, never returned,
    /// so one failing trigger does not stop the ones after it.
    pub fn run(
        &self,
        host: &mut dyn HostSession,
        chains: &[Chain],
        triggers: &[TriggerHandle],
        out: &mut dyn Write,
    ) -> Vec<TriggerRecord> {
        let mut records = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let outcome = self.fire(host, chains, trigger, out);
            if let TriggerOutcome::HostFailed(err) = &outcome {
                tracing::warn!(
                    node_type = %trigger.node_type,
                    trigger = %trigger.name,
                    error = %err,
                    "Trigger failed"
                );
            }
            if let TriggerOutcome::HookFailed(err) = &outcome {
                tracing::warn!(
                    node_type = %trigger.node_type,
                    trigger = %trigger.name,
                    error = %err,
                    "Trigger hook failed"
                );
            }
            records.push(TriggerRecord {
                chain: trigger.chain,
                node_type: trigger.node_type.clone(),
                name: trigger.name.clone(),
                outcome,
            });
        }
        records
    }

    fn fire(
        &self,
        host: &mut dyn HostSession,
        chains: &[Chain],
        trigger: &TriggerHandle,
        out: &mut dyn Write,
    ) -> TriggerOutcome {
        let Some(hook) = self.hooks.get(&trigger.node_type, &trigger.name) else {
            tracing::info!(node = %trigger.action.node, trigger = %trigger.name, "Firing trigger");
            return match host.fire_trigger(&trigger.action) {
                Ok(()) => TriggerOutcome::Fired,
                Err(err) => TriggerOutcome::HostFailed(err),
            };
        };

        let Some(chain) = chains.iter().find(|c| c.id() == trigger.chain) else {
            return TriggerOutcome::HostFailed(HostError::OperationFailed(format!(
                "trigger '{}' refers to unknown chain {}",
                trigger.name, trigger.chain.0
            )));
        };

        tracing::info!(asset = %chain.asset(), trigger = %trigger.name, "Running trigger hook");
        let mut ctx = HookContext {
            host,
            chain,
            trigger,
            config: self.config,
            identity: self.identity,
            out,
        };
        match hook.fire(&mut ctx) {
            Ok(outcome) => TriggerOutcome::Hooked(outcome),
            Err(err) => TriggerOutcome::HookFailed(err),
        }
    }
}
