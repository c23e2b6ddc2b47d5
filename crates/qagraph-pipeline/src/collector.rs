//! Diagnostics collector: cooks a chain's terminal node and classifies every
//! upstream node's outcome into a versioned [`Report`].

use std::collections::HashSet;

use qagraph_types::{HostError, NodeDiagnostic, Report, ReportError, Status, REPORT_VERSION};
use serde::Deserialize;

use crate::chain::Chain;
use crate::config::{EngineConfig, Identity};
use crate::host::{HostSession, NodeHandle};

/// Prefix the host prepends to warnings raised from check code.
pub const WARNING_PREFIX: &str = "Vex error: ";

/// Message attached to a node that reported nothing at all.
pub const NO_VERDICT: &str = "node produced no verdict";

/// The record a check node serializes into its first warning.
#[derive(Debug, Deserialize)]
struct WarningRecord {
    status: Status,
    message: String,
}

/// Resolve one node's status and message from its warning and error surfaces.
///
/// Errors always win. Otherwise the first warning carries the verdict. A node with
/// neither is an error unless its type is configured as diagnostic-free.
pub fn classify(
    node_name: &str,
    node_type: &str,
    warnings: &[String],
    errors: &[String],
    config: &EngineConfig,
) -> Result<NodeDiagnostic, ReportError> {
    let diagnostic = |status, message: String| NodeDiagnostic {
        message,
        node_name: node_name.to_string(),
        node_type: node_type.to_string(),
        status,
    };

    let error_text = errors.join("\n");
    if !error_text.is_empty() {
        return Ok(diagnostic(Status::Error, error_text));
    }

    match warnings.first() {
        Some(first) => {
            let body = first.strip_prefix(WARNING_PREFIX).unwrap_or(first);
            let record: WarningRecord =
                serde_json::from_str(body).map_err(|e| ReportError::MalformedWarning {
                    node: node_name.to_string(),
                    warning: first.clone(),
                    reason: e.to_string(),
                })?;
            Ok(diagnostic(record.status, record.message))
        }
        None if config.is_diagnostic_free(node_type) => Ok(diagnostic(Status::Pass, String::new())),
        None => Ok(diagnostic(Status::Error, NO_VERDICT.to_string())),
    }
}

pub struct Collector<'a> {
    config: &'a EngineConfig,
    identity: &'a Identity,
}

impl<'a> Collector<'a> {
    pub fn new(config: &'a EngineConfig, identity: &'a Identity) -> Self {
        Self { config, identity }
    }

    /// Collect the report for `chain`, treating the node at `terminal` as the
    /// report-emitting node. Ancestry comes from the chain's own back-pointers.
    pub fn collect(
        &self,
        host: &mut dyn HostSession,
        chain: &Chain,
        terminal: usize,
    ) -> Result<Report, ReportError> {
        let terminal_node = chain.node(terminal).ok_or_else(|| {
            ReportError::Host(HostError::OperationFailed(format!(
                "chain {} has no node at position {terminal}",
                chain.id().0
            )))
        })?;
        let ancestors: Vec<(NodeHandle, String)> = chain
            .ancestors(terminal)
            .into_iter()
            .map(|n| (n.handle, n.type_name.clone()))
            .collect();
        self.collect_from(host, terminal_node.handle, ancestors)
    }

    /// Collect the report for an arbitrary node by walking its primary inputs on
    /// the host. Used when no chain model exists for the node.
    pub fn collect_detached(
        &self,
        host: &mut dyn HostSession,
        terminal: NodeHandle,
    ) -> Result<Report, ReportError> {
        let mut seen = HashSet::from([terminal]);
        let mut handles = Vec::new();
        let mut current = host.inputs(terminal)?.first().copied();
        while let Some(handle) = current {
            if !seen.insert(handle) {
                return Err(HostError::Protocol(format!(
                    "input cycle through {handle} upstream of {terminal}"
                ))
                .into());
            }
            handles.push(handle);
            current = host.inputs(handle)?.first().copied();
        }
        handles.reverse();

        let mut ancestors = Vec::with_capacity(handles.len());
        for handle in handles {
            let node_type = host.node_type(handle)?;
            ancestors.push((handle, node_type));
        }
        self.collect_from(host, terminal, ancestors)
    }

    fn collect_from(
        &self,
        host: &mut dyn HostSession,
        terminal: NodeHandle,
        ancestors: Vec<(NodeHandle, String)>,
    ) -> Result<Report, ReportError> {
        let cook_success = match host.cook(terminal) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    node = %terminal,
                    error = %err,
                    "Cook failed, collecting diagnostics anyway"
                );
                false
            }
        };

        let asset_path = self.asset_path(host, terminal, &ancestors)?;

        let mut diagnostics = Vec::new();
        for (handle, node_type) in &ancestors {
            if self.config.is_loader(node_type) {
                continue;
            }
            let node_name = host.node_name(*handle)?;
            let warnings = host.warnings(*handle)?;
            let errors = host.errors(*handle)?;
            let diagnostic = classify(&node_name, node_type, &warnings, &errors, self.config)?;
            tracing::debug!(node = %node_name, status = %diagnostic.status, "Node classified");
            diagnostics.push(diagnostic);
        }

        Ok(Report {
            asset_path,
            cook_success,
            diagnostics,
            host: self.identity.host.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            user: self.identity.user.clone(),
            version: REPORT_VERSION.to_string(),
        })
    }

    fn asset_path(
        &self,
        host: &mut dyn HostSession,
        terminal: NodeHandle,
        ancestors: &[(NodeHandle, String)],
    ) -> Result<String, ReportError> {
        let missing = |host: &mut dyn HostSession| {
            let name = host
                .node_name(terminal)
                .unwrap_or_else(|_| terminal.to_string());
            ReportError::MissingLoader(name)
        };

        let Some((loader, _)) = ancestors.first() else {
            return Err(missing(host));
        };
        let Some(parm) = host.get_parameter(*loader, &self.config.loader_file_parm)? else {
            return Err(missing(host));
        };
        let value = host.parameter_value(&parm)?;
        Ok(match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        })
    }
}
