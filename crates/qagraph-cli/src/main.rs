//! CLI binary for running QA checks and pipelines over 3D assets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qagraph_pipeline::{
    expand_asset_patterns, parse_pipeline, report_schema, BridgeHost, Directive, EngineConfig,
    Identity, PipelineSpec, RunSummary, Session,
};
use qagraph_types::QaError;

#[derive(Parser)]
#[command(name = "qa", version, about = "Node-graph driven quality checks for 3D assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Command that starts the host bridge
    #[arg(long, global = true, env = "QA_HOST")]
    host: Option<String>,
}

#[derive(Args)]
struct AssetArgs {
    /// Asset file to process (repeatable)
    #[arg(short, long = "asset")]
    assets: Vec<String>,

    /// Glob matched against files under the current directory (repeatable)
    #[arg(long = "assets-pattern")]
    patterns: Vec<String>,

    /// Save the host scene here after processing, for debugging
    #[arg(long)]
    scene: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run named checks over assets and write a report for each
    Check {
        /// Check node type to run (repeatable, in order)
        #[arg(short, long = "check", required = true)]
        checks: Vec<String>,

        #[command(flatten)]
        assets: AssetArgs,
    },

    /// Build and run a pipeline over assets
    Run {
        /// Pipeline as inline JSON
        #[arg(long, conflicts_with = "pipeline_file", required_unless_present = "pipeline_file")]
        pipeline: Option<String>,

        /// Path to a pipeline JSON file
        #[arg(long)]
        pipeline_file: Option<PathBuf>,

        #[command(flatten)]
        assets: AssetArgs,
    },

    /// Validate a pipeline file without touching a host
    Validate {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,
    },

    /// Print the JSON Schema of the report format
    Schema,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{}", error_line(&err));
        std::process::exit(1);
    }
}

/// One-line rendering of a fatal error. Pipeline defects are called out as such.
fn error_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<QaError>() {
        Some(qa) if qa.is_spec_defect() => format!("[ERROR] invalid pipeline: {qa}"),
        _ => format!("[ERROR] {err:#}"),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Check { checks, assets } => {
            let assets_list = collect_assets(&assets)?;
            let summary =
                with_session(cli.host.as_deref(), config, assets.scene, |session, out| {
                    session.check(&assets_list, &checks, out)
                })?;
            finish(&summary);
        }
        Commands::Run {
            pipeline,
            pipeline_file,
            assets,
        } => {
            let spec = load_spec(pipeline.as_deref(), pipeline_file.as_deref())?;
            let assets_list = collect_assets(&assets)?;
            let summary =
                with_session(cli.host.as_deref(), config, assets.scene, |session, out| {
                    session.run(&spec, &assets_list, out)
                })?;
            finish(&summary);
        }
        Commands::Validate { pipeline } => cmd_validate(&pipeline)?,
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&report_schema())?);
        }
    }

    Ok(())
}

fn load_spec(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<PipelineSpec> {
    let text = match (inline, file) {
        (Some(text), None) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline {}", path.display()))?,
        _ => bail!("pass exactly one of --pipeline or --pipeline-file"),
    };
    Ok(parse_pipeline(&text).map_err(QaError::from)?)
}

fn collect_assets(args: &AssetArgs) -> anyhow::Result<Vec<String>> {
    let cwd = std::env::current_dir()?;
    let assets = expand_asset_patterns(&cwd, &args.assets, &args.patterns)?;
    if assets.is_empty() {
        bail!("no assets given: pass --asset or a matching --assets-pattern");
    }
    tracing::debug!(count = assets.len(), "Assets resolved");
    Ok(assets)
}

fn with_session<F>(
    host_command: Option<&str>,
    config: EngineConfig,
    scene: Option<PathBuf>,
    body: F,
) -> anyhow::Result<RunSummary>
where
    F: FnOnce(&mut Session<'_>, &mut dyn std::io::Write) -> qagraph_types::Result<RunSummary>,
{
    let Some(command) = host_command else {
        bail!("no host configured: pass --host or set QA_HOST");
    };
    let mut host = BridgeHost::spawn(command)
        .with_context(|| format!("failed to start host bridge '{command}'"))?;
    let mut session = Session::new(&mut host, config, Identity::from_env()).with_scene(scene);
    let mut stdout = std::io::stdout().lock();
    Ok(body(&mut session, &mut stdout)?)
}

/// Report per-asset results; exits non-zero if any report could not be produced.
fn finish(summary: &RunSummary) {
    for asset in &summary.assets {
        for failure in &asset.trigger_failures {
            eprintln!("[WARN] {}: {failure}", asset.asset);
        }
        for failure in &asset.report_failures {
            eprintln!("[ERROR] {}: {failure}", asset.asset);
        }
    }
    if !summary.succeeded() {
        std::process::exit(1);
    }
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline {}", path.display()))?;
    let spec = match parse_pipeline(&text) {
        Ok(spec) => spec,
        Err(err) => {
            println!("[ERROR] {err}");
            std::process::exit(1);
        }
    };

    println!("Pipeline is valid");
    println!("Nodes: {}", spec.len());
    for (index, node) in spec.nodes().iter().enumerate() {
        let directives: Vec<String> = node
            .directives
            .iter()
            .map(|d| match d {
                Directive::Parameter { name, value } => format!("{name}={value}"),
                Directive::Trigger { name } => format!("press {name}"),
            })
            .collect();
        println!("  [{index}] {} {}", node.type_name, directives.join(" "));
    }
    Ok(())
}
