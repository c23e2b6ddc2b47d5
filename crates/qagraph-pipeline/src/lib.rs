//! Pipeline compiler and diagnostics engine for asset QA.
//!
//! This crate validates declarative pipeline specs, builds one linear chain of host
//! nodes per asset, fires deferred triggers in order, and collects each chain's
//! per-node diagnostics into a versioned report.

pub mod bridge_host;
pub mod builder;
pub mod chain;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod hooks;
pub mod host;
pub mod memory_host;
pub mod report;
pub mod session;
pub mod substitution;
pub mod validation;

pub use bridge_host::BridgeHost;
pub use builder::{BuiltChain, GraphBuilder, TriggerHandle};
pub use chain::{AssignedParam, Chain, ChainId, ChainNode, ValueSource};
pub use collector::{classify, Collector, NO_VERDICT, WARNING_PREFIX};
pub use config::{EngineConfig, Identity};
pub use coordinator::{Coordinator, TriggerOutcome, TriggerRecord};
pub use hooks::{default_registry, HookContext, HookOutcome, HookRegistry, ReportHook, TriggerHook};
pub use host::{ActionHandle, HostResult, HostSession, NodeHandle, ParamHandle};
pub use memory_host::{verdict_warning, MemoryHost, NodeTypeDef};
pub use report::{read_report, render_terminal, report_schema, write_report};
pub use session::{
    check_pipeline, expand_asset_patterns, AssetSummary, RunSummary, Session, WrittenReport,
};
pub use substitution::{resolve, SubstitutionMap, ASSET_INPUT_PATH, ASSET_OUTPUT_PATH, REPORT_PATH};
pub use validation::{parse_pipeline, validate, Directive, NodeSpec, PipelineSpec};
