//! In-process trigger hooks and their registry.
//!
//! Some triggers are implemented by the engine rather than the host: pressing the
//! report node's trigger collects diagnostics for its chain and writes the report.
//! Hooks are keyed by `(node_type, trigger_name)`.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use qagraph_types::{HostError, ReportError};

use crate::builder::TriggerHandle;
use crate::chain::Chain;
use crate::collector::Collector;
use crate::config::{EngineConfig, Identity};
use crate::host::HostSession;
use crate::report::{render_terminal, write_report};

/// Everything a hook may touch while running.
pub struct HookContext<'a> {
    pub host: &'a mut dyn HostSession,
    pub chain: &'a Chain,
    pub trigger: &'a TriggerHandle,
    pub config: &'a EngineConfig,
    pub identity: &'a Identity,
    /// Destination for human-readable output.
    pub out: &'a mut dyn Write,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    ReportWritten { path: PathBuf, passed: bool },
    Done,
}

pub trait TriggerHook {
    fn node_type(&self) -> &str;

    fn trigger(&self) -> &str;

    fn fire(&self, ctx: &mut HookContext<'_>) -> Result<HookOutcome, ReportError>;
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<(String, String), Box<dyn TriggerHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl TriggerHook + 'static) {
        let key = (hook.node_type().to_string(), hook.trigger().to_string());
        self.hooks.insert(key, Box::new(hook));
    }

    pub fn get(&self, node_type: &str, trigger: &str) -> Option<&dyn TriggerHook> {
        self.hooks
            .get(&(node_type.to_string(), trigger.to_string()))
            .map(|h| h.as_ref())
    }

    pub fn has(&self, node_type: &str, trigger: &str) -> bool {
        self.get(node_type, trigger).is_some()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Collects the chain's diagnostics and writes them to the node's report path.
pub struct ReportHook {
    node_type: String,
    trigger: String,
}

impl ReportHook {
    pub fn new(node_type: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            trigger: trigger.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.report_node_type, &config.report_trigger)
    }
}

impl TriggerHook for ReportHook {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn trigger(&self) -> &str {
        &self.trigger
    }

    fn fire(&self, ctx: &mut HookContext<'_>) -> Result<HookOutcome, ReportError> {
        let node = ctx.trigger.action.node;
        let parm_name = &ctx.config.report_path_parm;
        let parm = ctx.host.get_parameter(node, parm_name)?.ok_or_else(|| {
            HostError::OperationFailed(format!(
                "report node {node} has no '{parm_name}' parameter"
            ))
        })?;
        let value = ctx.host.parameter_value(&parm)?;
        let path = PathBuf::from(value.as_str().map_or_else(|| value.to_string(), str::to_string));

        let report = Collector::new(ctx.config, ctx.identity).collect(
            &mut *ctx.host,
            ctx.chain,
            ctx.trigger.position,
        )?;
        write_report(&report, &path)?;

        if ctx.config.render_terminal {
            let text = render_terminal(&report)?;
            ctx.out.write_all(text.as_bytes())?;
        }

        Ok(HookOutcome::ReportWritten {
            path,
            passed: report.passed(),
        })
    }
}

/// Registry holding the built-in report hook for `config`.
pub fn default_registry(config: &EngineConfig) -> HookRegistry {
    let mut registry = HookRegistry::new();
    registry.register(ReportHook::from_config(config));
    registry
}
