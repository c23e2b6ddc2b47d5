//! Session orchestration: the "check" and "run" flows over one host session.
//!
//! Every asset's chain is built before any trigger fires, so a bad pipeline fails
//! the whole invocation without producing partial reports.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSetBuilder};
use qagraph_types::QaError;

use crate::builder::GraphBuilder;
use crate::chain::{Chain, ChainId};
use crate::config::{EngineConfig, Identity};
use crate::coordinator::{Coordinator, TriggerOutcome, TriggerRecord};
use crate::hooks::{default_registry, HookOutcome, HookRegistry};
use crate::host::HostSession;
use crate::substitution::{normalize_separators, resolve, ASSET_INPUT_PATH, REPORT_PATH};
use crate::validation::{NodeSpec, PipelineSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenReport {
    pub path: PathBuf,
    pub passed: bool,
}

/// What happened for one asset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetSummary {
    pub asset: String,
    pub reports: Vec<WrittenReport>,
    /// Reports that could not be produced.
    pub report_failures: Vec<String>,
    /// Host-side trigger failures. Logged, not fatal.
    pub trigger_failures: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub assets: Vec<AssetSummary>,
    pub triggers: Vec<TriggerRecord>,
}

impl RunSummary {
    /// True when every requested report was produced. Diagnostic statuses do not
    /// count.
    pub fn succeeded(&self) -> bool {
        self.assets.iter().all(|a| a.report_failures.is_empty())
    }

    pub fn report_paths(&self) -> Vec<&Path> {
        self.assets
            .iter()
            .flat_map(|a| a.reports.iter().map(|r| r.path.as_path()))
            .collect()
    }
}

/// The fixed chain used by the check flow: loader, the named checks, report writer.
pub fn check_pipeline(checks: &[String], config: &EngineConfig) -> PipelineSpec {
    let loader = config
        .loader_types
        .first()
        .map_or("file", String::as_str);

    let mut nodes = Vec::with_capacity(checks.len() + 2);
    nodes.push(NodeSpec::new(loader).parm(config.loader_file_parm.as_str(), ASSET_INPUT_PATH));
    nodes.extend(checks.iter().map(|c| NodeSpec::new(c.as_str())));
    nodes.push(
        NodeSpec::new(config.report_node_type.as_str())
            .parm(config.report_path_parm.as_str(), REPORT_PATH)
            .press(config.report_trigger.as_str()),
    );
    PipelineSpec::new(nodes)
}

pub struct Session<'h> {
    host: &'h mut dyn HostSession,
    config: EngineConfig,
    identity: Identity,
    hooks: HookRegistry,
    scene: Option<PathBuf>,
}

impl<'h> Session<'h> {
    pub fn new(host: &'h mut dyn HostSession, config: EngineConfig, identity: Identity) -> Self {
        let hooks = default_registry(&config);
        Self {
            host,
            config,
            identity,
            hooks,
            scene: None,
        }
    }

    /// Save the scene to `path` once all triggers have fired.
    pub fn with_scene(mut self, path: Option<PathBuf>) -> Self {
        self.scene = path;
        self
    }

    /// Run the named checks over every asset.
    pub fn check(
        &mut self,
        assets: &[String],
        checks: &[String],
        out: &mut dyn Write,
    ) -> Result<RunSummary, QaError> {
        let spec = check_pipeline(checks, &self.config);
        self.run(&spec, assets, out)
    }

    /// Build `spec` once per asset, then fire every trigger in order.
    pub fn run(
        &mut self,
        spec: &PipelineSpec,
        assets: &[String],
        out: &mut dyn Write,
    ) -> Result<RunSummary, QaError> {
        let mut builder = GraphBuilder::new();
        let mut chains = Vec::with_capacity(assets.len());
        let mut triggers = Vec::new();

        for asset in assets {
            let subs = resolve(asset)?;
            let built = builder.build(spec, &mut *self.host, &subs)?;
            chains.push(built.chain);
            triggers.extend(built.triggers);
        }
        tracing::info!(assets = assets.len(), triggers = triggers.len(), "All chains built");

        let records = Coordinator::new(&self.hooks, &self.config, &self.identity).run(
            &mut *self.host,
            &chains,
            &triggers,
            out,
        );

        if let Err(err) = self.host.layout() {
            tracing::warn!(error = %err, "Scene layout failed");
        }
        if let Some(path) = &self.scene {
            self.host.save_scene(path)?;
            tracing::info!(path = %path.display(), "Scene saved");
        }

        let mut summary = RunSummary {
            assets: chains
                .iter()
                .map(|c| AssetSummary {
                    asset: c.asset().to_string(),
                    ..AssetSummary::default()
                })
                .collect(),
            triggers: Vec::new(),
        };
        for record in &records {
            let Some(asset) = asset_for(&mut summary, &chains, record.chain) else {
                continue;
            };
            match &record.outcome {
                TriggerOutcome::Hooked(HookOutcome::ReportWritten { path, passed }) => {
                    asset.reports.push(WrittenReport {
                        path: path.clone(),
                        passed: *passed,
                    });
                }
                TriggerOutcome::Hooked(HookOutcome::Done) | TriggerOutcome::Fired => {}
                TriggerOutcome::HookFailed(err) => {
                    asset.report_failures.push(format!("{}: {err}", record.name));
                }
                TriggerOutcome::HostFailed(err) => {
                    asset.trigger_failures.push(format!("{}: {err}", record.name));
                }
            }
        }
        summary.triggers = records;
        Ok(summary)
    }
}

fn asset_for<'s>(
    summary: &'s mut RunSummary,
    chains: &[Chain],
    id: ChainId,
) -> Option<&'s mut AssetSummary> {
    let index = chains.iter().position(|c| c.id() == id)?;
    summary.assets.get_mut(index)
}

/// Merge explicit asset paths with files under `root` matching any of `patterns`.
///
/// Pattern matches are relative to `root`, use `/` separators and come out sorted.
/// `*` stays within one path segment; use `**` to descend into subdirectories.
/// Explicit paths keep their order and go first; duplicates are dropped.
pub fn expand_asset_patterns(
    root: &Path,
    explicit: &[String],
    patterns: &[String],
) -> Result<Vec<String>, QaError> {
    let mut assets: Vec<String> = explicit.iter().map(|a| normalize_separators(a)).collect();

    if !patterns.is_empty() {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| QaError::Other(format!("invalid asset pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| QaError::Other(format!("invalid asset patterns: {e}")))?;

        let mut files = Vec::new();
        walk_files(root, root, &mut files)?;
        let mut matched: Vec<String> = files.into_iter().filter(|f| set.is_match(f)).collect();
        matched.sort();
        tracing::debug!(
            patterns = patterns.len(),
            matched = matched.len(),
            "Asset patterns expanded"
        );
        assets.extend(matched);
    }

    let mut seen = HashSet::new();
    assets.retain(|a| seen.insert(a.clone()));
    Ok(assets)
}

fn walk_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(normalize_separators(&rel.to_string_lossy()));
        }
    }
    Ok(())
}
