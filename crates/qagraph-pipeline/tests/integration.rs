//! End-to-end tests for the QA pipeline engine against the in-memory host.
//!
//! Each test drives the public API: pipeline -> build -> fire triggers -> collect -> report.

use std::path::{Path, PathBuf};

use qagraph_pipeline::{
    default_registry, parse_pipeline, read_report, render_terminal, resolve, write_report,
    Collector, Coordinator, EngineConfig, GraphBuilder, HostSession, Identity, MemoryHost,
    NodeSpec, NodeTypeDef, PipelineSpec, Session, TriggerOutcome,
};
use qagraph_types::{BuildError, QaError, Report, ReportError, Status, REPORT_VERSION};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn host() -> MemoryHost {
    let mut host = MemoryHost::with_standard_types();
    host.register(
        NodeTypeDef::check("check_polycount", Status::Pass, "312 polygons").param("max", 5000i64),
    );
    host.register(NodeTypeDef::check("check_uv", Status::Fail, "UVs outside 0-1"));
    host.register(NodeTypeDef::new("check_silent"));
    host.register(NodeTypeDef::new("check_broken").warning("Vex error: not a record"));
    host.register(NodeTypeDef::check("check_crash", Status::Pass, "").failing_cook());
    host.register(
        NodeTypeDef::check("check_topology", Status::Pass, "looks fine")
            .error("non-manifold edge"),
    );
    host.register(NodeTypeDef::new("rop_fbx").param("sopoutput", "").trigger("execute"));
    host
}

fn identity() -> Identity {
    Identity::new("artist", "ws01")
}

fn asset_in(dir: &Path, rel: &str) -> String {
    dir.join(rel).to_string_lossy().replace('\\', "/")
}

fn report_path_for(asset: &str) -> PathBuf {
    PathBuf::from(resolve(asset).unwrap().get("$REPORT_PATH").unwrap())
}

fn checks(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

#[test]
fn three_node_chain_round_trips_through_host_inputs() {
    let mut host = host();
    let spec = parse_pipeline(
        r#"{"nodes": [
            {"type_name": "file", "parm_file": "$ASSET_INPUT_PATH"},
            {"type_name": "check_polycount", "parm_max": 10000},
            {"type_name": "report_json", "parm_json_path": "$REPORT_PATH", "press_write": true}
        ]}"#,
    )
    .unwrap();
    let built = GraphBuilder::new()
        .build(&spec, &mut host, &resolve("props/crate.fbx").unwrap())
        .unwrap();
    assert_eq!(built.chain.len(), 3);

    // Walk back from the last node through the host and compare with declaration order.
    let mut walked = Vec::new();
    let mut current = Some(built.chain.last().unwrap().handle);
    while let Some(handle) = current {
        walked.push(host.node_type(handle).unwrap());
        current = host.inputs(handle).unwrap().first().copied();
    }
    walked.reverse();
    let declared: Vec<_> = spec.nodes().iter().map(|n| n.type_name.clone()).collect();
    assert_eq!(walked, declared);
}

#[test]
fn unknown_node_type_leaves_nothing_behind() {
    let mut host = host();
    let spec = PipelineSpec::new(vec![
        NodeSpec::new("file").parm("file", "$ASSET_INPUT_PATH"),
        NodeSpec::new("check_polycount"),
        NodeSpec::new("check_does_not_exist"),
    ]);
    let err = GraphBuilder::new()
        .build(&spec, &mut host, &resolve("a.fbx").unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::UnknownNodeType { ref type_name } if type_name == "check_does_not_exist"
    ));
    assert_eq!(host.node_count(), 0);
}

#[test]
fn chains_for_different_assets_never_cross_connect() {
    let mut host = host();
    let spec =
        qagraph_pipeline::check_pipeline(&checks(&["check_polycount"]), &EngineConfig::default());
    let mut builder = GraphBuilder::new();
    let a = builder.build(&spec, &mut host, &resolve("a.fbx").unwrap()).unwrap();
    let b = builder.build(&spec, &mut host, &resolve("b.fbx").unwrap()).unwrap();

    assert!(host.inputs(b.chain.first().unwrap().handle).unwrap().is_empty());
    for node in b.chain.nodes() {
        for upstream in host.inputs(node.handle).unwrap() {
            assert!(!a.chain.contains(upstream));
            assert!(b.chain.contains(upstream));
        }
    }
}

// ---------------------------------------------------------------------------
// Check flow
// ---------------------------------------------------------------------------

#[test]
fn single_passing_check_produces_passing_report() {
    let dir = tempfile::tempdir().unwrap();
    let asset = asset_in(dir.path(), "props/crate.fbx");
    let mut host = host();
    let mut out = Vec::new();

    let summary = Session::new(&mut host, EngineConfig::default(), identity())
        .check(&[asset.clone()], &checks(&["check_polycount"]), &mut out)
        .unwrap();
    assert!(summary.succeeded());

    let expected_path = report_path_for(&asset);
    assert_eq!(summary.report_paths(), vec![expected_path.as_path()]);

    let report = read_report(&expected_path).unwrap();
    assert_eq!(report.version, REPORT_VERSION);
    assert_eq!(report.asset_path, asset);
    assert_eq!(report.user, "artist");
    assert_eq!(report.host, "ws01");
    assert!(report.cook_success);
    assert_eq!(report.diagnostics.len(), 1);
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.status, Status::Pass);
    assert_eq!(diagnostic.node_type, "check_polycount");
    assert_eq!(diagnostic.node_name, "check_polycount1");
    assert_eq!(diagnostic.message, "312 polygons");

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.starts_with(&format!("[PASS] Checks for {asset}")));
    assert_eq!(printed, render_terminal(&report).unwrap());
}

#[test]
fn failing_diagnostics_do_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let asset = asset_in(dir.path(), "crate.fbx");
    let mut host = host();

    let summary = Session::new(&mut host, EngineConfig::default(), identity())
        .check(&[asset], &checks(&["check_polycount", "check_uv"]), &mut std::io::sink())
        .unwrap();
    assert!(summary.succeeded());
    assert!(!summary.assets[0].reports[0].passed);

    let report = read_report(&summary.assets[0].reports[0].path).unwrap();
    let statuses: Vec<_> = report.diagnostics.iter().map(|d| d.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Fail]);
    assert_eq!(report.count(Status::Fail), 1);
}

#[test]
fn errors_override_warnings_and_silence_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let asset = asset_in(dir.path(), "crate.fbx");
    let mut host = host();

    let summary = Session::new(&mut host, EngineConfig::default(), identity())
        .check(&[asset], &checks(&["check_topology", "check_silent"]), &mut std::io::sink())
        .unwrap();
    let report = read_report(&summary.assets[0].reports[0].path).unwrap();

    assert_eq!(report.diagnostics[0].status, Status::Error);
    assert_eq!(report.diagnostics[0].message, "non-manifold edge");
    assert_eq!(report.diagnostics[1].status, Status::Error);
    assert_eq!(report.diagnostics[1].message, qagraph_pipeline::NO_VERDICT);
}

#[test]
fn diagnostic_free_types_pass_when_silent() {
    let dir = tempfile::tempdir().unwrap();
    let asset = asset_in(dir.path(), "crate.fbx");
    let mut host = host();
    let config = EngineConfig {
        diagnostic_free_types: vec!["check_silent".into()],
        render_terminal: false,
        ..EngineConfig::default()
    };

    let summary = Session::new(&mut host, config, identity())
        .check(&[asset], &checks(&["check_silent"]), &mut std::io::sink())
        .unwrap();
    assert!(summary.assets[0].reports[0].passed);
}

#[test]
fn build_error_aborts_before_any_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let good = asset_in(dir.path(), "good.fbx");
    let mut host = host();

    let err = Session::new(&mut host, EngineConfig::default(), identity())
        .check(
            &[good.clone(), asset_in(dir.path(), "other.fbx")],
            &checks(&["check_nope"]),
            &mut std::io::sink(),
        )
        .unwrap_err();
    assert!(matches!(err, QaError::Build(BuildError::UnknownNodeType { .. })));
    assert!(err.is_spec_defect());
    assert!(host.fired().is_empty());
    assert!(!report_path_for(&good).exists());
}

#[test]
fn malformed_warning_fails_only_that_report() {
    let dir = tempfile::tempdir().unwrap();
    let asset = asset_in(dir.path(), "crate.fbx");
    let mut host = host();

    let summary = Session::new(&mut host, EngineConfig::default(), identity())
        .check(&[asset.clone()], &checks(&["check_broken"]), &mut std::io::sink())
        .unwrap();
    assert!(!summary.succeeded());
    assert!(summary.assets[0].reports.is_empty());
    assert_eq!(summary.assets[0].report_failures.len(), 1);
    assert!(!report_path_for(&asset).exists());
}

// ---------------------------------------------------------------------------
// Run flow
// ---------------------------------------------------------------------------

#[test]
fn triggers_fire_per_asset_in_declaration_order() {
    let dir = tempfile::tempdir().unwrap();
    let assets = vec![asset_in(dir.path(), "a.fbx"), asset_in(dir.path(), "b.fbx")];
    let spec = parse_pipeline(
        r#"{"nodes": [
            {"node_type_name": "file", "parm_file": "$ASSET_INPUT_PATH"},
            {"type_name": "check_polycount"},
            {"type_name": "report_json", "parm_json_path": "$REPORT_PATH", "press_write": 1},
            {"type_name": "rop_fbx", "parm_sopoutput": "$ASSET_OUTPUT_PATH", "press_execute": 1}
        ]}"#,
    )
    .unwrap();
    let mut host = host();

    let summary = Session::new(&mut host, EngineConfig::default(), identity())
        .run(&spec, &assets, &mut std::io::sink())
        .unwrap();

    let order: Vec<_> = summary
        .triggers
        .iter()
        .map(|r| (r.chain.0, r.name.as_str()))
        .collect();
    assert_eq!(order, vec![(0, "write"), (0, "execute"), (1, "write"), (1, "execute")]);
    assert!(matches!(summary.triggers[1].outcome, TriggerOutcome::Fired));

    // Only the export triggers reach the host; the report writes run in-process.
    assert_eq!(host.fired().len(), 2);
    for (asset, fired) in assets.iter().zip(host.fired()) {
        let output = resolve(asset).unwrap().get("$ASSET_OUTPUT_PATH").unwrap().to_string();
        assert_eq!(
            host.value_of(fired.node, "sopoutput").and_then(|v| v.as_str()),
            Some(output.as_str())
        );
    }
    for asset in &assets {
        assert!(report_path_for(asset).exists());
    }
    assert_eq!(host.layout_calls(), 1);
}

#[test]
fn scene_is_saved_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let scene = dir.path().join("debug/scene.json");
    let mut host = host();

    Session::new(&mut host, EngineConfig::default(), identity())
        .with_scene(Some(scene.clone()))
        .check(&[asset_in(dir.path(), "a.fbx")], &checks(&[]), &mut std::io::sink())
        .unwrap();
    assert_eq!(host.saved_scenes(), &[scene.clone()]);
    assert!(scene.exists());
}

// ---------------------------------------------------------------------------
// Collection and persistence
// ---------------------------------------------------------------------------

#[test]
fn cook_failure_is_isolated_to_its_asset() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        render_terminal: false,
        ..EngineConfig::default()
    };
    let identity = identity();
    let mut host = host();
    let mut builder = GraphBuilder::new();

    let broken_asset = asset_in(dir.path(), "broken.fbx");
    let fine_asset = asset_in(dir.path(), "fine.fbx");
    let broken = builder
        .build(
            &qagraph_pipeline::check_pipeline(&checks(&["check_crash"]), &config),
            &mut host,
            &resolve(&broken_asset).unwrap(),
        )
        .unwrap();
    let fine = builder
        .build(
            &qagraph_pipeline::check_pipeline(&checks(&["check_polycount"]), &config),
            &mut host,
            &resolve(&fine_asset).unwrap(),
        )
        .unwrap();

    let chains = vec![broken.chain.clone(), fine.chain.clone()];
    let triggers: Vec<_> = broken.triggers.iter().chain(&fine.triggers).cloned().collect();
    let registry = default_registry(&config);
    let records = Coordinator::new(&registry, &config, &identity).run(
        &mut host,
        &chains,
        &triggers,
        &mut std::io::sink(),
    );
    assert!(records.iter().all(|r| !r.outcome.is_failure()));

    let broken_report = read_report(&report_path_for(&broken_asset)).unwrap();
    assert!(!broken_report.cook_success);
    assert_eq!(broken_report.diagnostics[0].status, Status::Pass);

    let fine_report = read_report(&report_path_for(&fine_asset)).unwrap();
    assert!(fine_report.cook_success);
}

#[test]
fn malformed_warning_is_isolated_to_its_asset() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        render_terminal: false,
        ..EngineConfig::default()
    };
    let identity = identity();
    let mut host = host();
    let mut builder = GraphBuilder::new();

    let broken_asset = asset_in(dir.path(), "broken.fbx");
    let fine_asset = asset_in(dir.path(), "fine.fbx");
    let broken = builder
        .build(
            &qagraph_pipeline::check_pipeline(&checks(&["check_broken"]), &config),
            &mut host,
            &resolve(&broken_asset).unwrap(),
        )
        .unwrap();
    let fine = builder
        .build(
            &qagraph_pipeline::check_pipeline(&checks(&["check_polycount"]), &config),
            &mut host,
            &resolve(&fine_asset).unwrap(),
        )
        .unwrap();

    let chains = vec![broken.chain.clone(), fine.chain.clone()];
    let triggers: Vec<_> = broken.triggers.iter().chain(&fine.triggers).cloned().collect();
    let registry = default_registry(&config);
    let records = Coordinator::new(&registry, &config, &identity).run(
        &mut host,
        &chains,
        &triggers,
        &mut std::io::sink(),
    );
    assert_eq!(records.len(), 2);
    assert!(matches!(
        records[0].outcome,
        TriggerOutcome::HookFailed(ReportError::MalformedWarning { .. })
    ));
    assert!(!records[1].outcome.is_failure());

    assert!(!report_path_for(&broken_asset).exists());
    let fine_report = read_report(&report_path_for(&fine_asset)).unwrap();
    assert_eq!(fine_report.diagnostics.len(), 1);
    assert_eq!(fine_report.diagnostics[0].status, Status::Pass);
}

#[test]
fn detached_collection_matches_chain_collection() {
    let config = EngineConfig::default();
    let identity = identity();
    let mut host = host();
    let spec =
        qagraph_pipeline::check_pipeline(&checks(&["check_polycount", "check_uv"]), &config);
    let built = GraphBuilder::new()
        .build(&spec, &mut host, &resolve("props/crate.fbx").unwrap())
        .unwrap();

    let collector = Collector::new(&config, &identity);
    let terminal = built.chain.len() - 1;
    let from_chain = collector.collect(&mut host, &built.chain, terminal).unwrap();
    let detached = collector
        .collect_detached(&mut host, built.chain.nodes()[terminal].handle)
        .unwrap();

    assert_eq!(from_chain.asset_path, "props/crate.fbx");
    assert_eq!(from_chain.diagnostics, detached.diagnostics);
    assert_eq!(from_chain.asset_path, detached.asset_path);
}

#[test]
fn report_without_loader_is_rejected() {
    let config = EngineConfig::default();
    let identity = identity();
    let mut host = host();
    let spec = PipelineSpec::new(vec![
        NodeSpec::new("check_polycount"),
        NodeSpec::new("report_json"),
    ]);
    let built = GraphBuilder::new()
        .build(&spec, &mut host, &resolve("a.fbx").unwrap())
        .unwrap();
    let err = Collector::new(&config, &identity)
        .collect(&mut host, &built.chain, 1)
        .unwrap_err();
    assert!(matches!(err, qagraph_types::ReportError::MissingLoader(_)));
}

#[test]
fn writing_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let report = Report {
        asset_path: "props/crate.fbx".into(),
        cook_success: true,
        diagnostics: vec![qagraph_types::NodeDiagnostic {
            message: "ok".into(),
            node_name: "check_uv1".into(),
            node_type: "check_uv".into(),
            status: Status::Pass,
        }],
        host: "ws01".into(),
        timestamp: "2026-03-01T12:00:00+00:00".into(),
        user: "artist".into(),
        version: REPORT_VERSION.into(),
    };
    let first = dir.path().join("one.json");
    let second = dir.path().join("two.json");
    write_report(&report, &first).unwrap();
    write_report(&report, &second).unwrap();

    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    assert_eq!(read_report(&first).unwrap(), report);
}
