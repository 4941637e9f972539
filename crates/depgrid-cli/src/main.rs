use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use depgrid_core::{KeyInfo, KeyRegistry, Suggestion};
use depgrid_store::{
    export, layout_for_path, policy_for, ExportFormat, Reconciler, TrackerCache, TrackerConfig, TrackerKind,
    TrackerNotFound, TrackerStore, DEFAULT_CONFIG_FILE,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "DG_LOG";

#[derive(Debug, Parser)]
#[command(name = "dg")]
#[command(about = "Dependency grid tracker CLI")]
struct Cli {
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Defaults to `<root>/.depgrid.yaml`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Tracker {
        #[command(subcommand)]
        command: Box<TrackerCommand>,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum TrackerCommand {
    Show(TrackerArgs),
    Validate(TrackerArgs),
    Update(UpdateArgs),
    RemoveKey(RemoveKeyArgs),
    RemovePath(RemovePathArgs),
    Merge(MergeArgs),
    Export(ExportArgs),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
}

#[derive(Debug, Args)]
struct TrackerArgs {
    #[arg(long)]
    tracker: PathBuf,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long, value_enum)]
    kind: KindArg,
    /// Module directory, required for `--kind module`.
    #[arg(long)]
    module: Option<PathBuf>,
    /// JSON array of key registry entries.
    #[arg(long)]
    registry: PathBuf,
    /// JSON array of `{source, target, relation}` suggestions.
    #[arg(long)]
    suggestions: Option<PathBuf>,
    #[arg(long = "new-key")]
    new_keys: Vec<String>,
}

#[derive(Debug, Args)]
struct RemoveKeyArgs {
    #[arg(long)]
    tracker: PathBuf,
    #[arg(long)]
    key: String,
}

#[derive(Debug, Args)]
struct RemovePathArgs {
    #[arg(long)]
    tracker: PathBuf,
    #[arg(long)]
    path: String,
    #[arg(long)]
    registry: PathBuf,
}

#[derive(Debug, Args)]
struct MergeArgs {
    #[arg(long)]
    primary: PathBuf,
    #[arg(long)]
    secondary: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    tracker: PathBuf,
    #[arg(long, value_enum)]
    format: FormatArg,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Global,
    Doc,
    Module,
}

impl From<KindArg> for TrackerKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Global => Self::Global,
            KindArg::Doc => Self::Doc,
            KindArg::Module => Self::Module,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Csv,
    Dot,
    Md,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => Self::Json,
            FormatArg::Csv => Self::Csv,
            FormatArg::Dot => Self::Dot,
            FormatArg::Md => Self::Md,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init().ok();
}

fn read_json_file<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse {what} file {}", path.display()))
}

fn load_registry(path: &Path) -> Result<KeyRegistry> {
    let entries = read_json_file::<Vec<KeyInfo>>(path, "registry")?;
    KeyRegistry::new(entries).with_context(|| format!("invalid registry {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve project root {}", cli.root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));
    let config = TrackerConfig::load(&config_path)?;
    tracing::debug!(root = %root.display(), config = %config_path.display(), "loaded configuration");

    match cli.command {
        Command::Tracker { command } => run_tracker(*command, &root, &config),
        Command::Config { command } => run_config(&command, &config_path, &config),
    }
}

fn run_tracker(command: TrackerCommand, root: &Path, config: &TrackerConfig) -> Result<()> {
    let scope = config.scope(root);
    let store = TrackerStore::with_cache(Arc::new(TrackerCache::new()));
    let reconciler = Reconciler::new(scope.clone(), store.clone());

    match command {
        TrackerCommand::Show(args) => {
            if !args.tracker.is_file() {
                return Err(TrackerNotFound { path: args.tracker }.into());
            }
            let tracker = store.read_cached(&args.tracker, &layout_for_path(&args.tracker))?;
            emit_json(serde_json::json!({
                "tracker_path": args.tracker,
                "key_order": tracker.key_order(),
                "keys": tracker.keys,
                "grid": tracker.grid,
                "last_key_edit": tracker.last_key_edit,
                "last_grid_edit": tracker.last_grid_edit,
            }))
        }
        TrackerCommand::Validate(args) => {
            if !args.tracker.is_file() {
                return Err(TrackerNotFound { path: args.tracker }.into());
            }
            let tracker = store.read_layout(&args.tracker, &layout_for_path(&args.tracker))?;
            let issues = tracker.issues();
            emit_json(serde_json::json!({
                "tracker_path": args.tracker,
                "key_count": tracker.keys.len(),
                "valid": issues.is_empty(),
                "issues": issues,
            }))
        }
        TrackerCommand::Update(args) => {
            let registry = load_registry(&args.registry)?;
            let suggestions = match &args.suggestions {
                Some(path) => read_json_file::<Vec<Suggestion>>(path, "suggestions")?,
                None => Vec::new(),
            };
            let policy = policy_for(args.kind.into(), &scope, args.module.as_deref())?;
            let report = reconciler.update(policy.as_ref(), &registry, &suggestions, &args.new_keys)?;
            emit_json(serde_json::to_value(report)?)
        }
        TrackerCommand::RemoveKey(args) => {
            let report = reconciler.remove_key(&args.tracker, &args.key)?;
            emit_json(serde_json::to_value(report)?)
        }
        TrackerCommand::RemovePath(args) => {
            let registry = load_registry(&args.registry)?;
            let report = reconciler.remove_path(&args.tracker, &args.path, &registry)?;
            emit_json(serde_json::to_value(report)?)
        }
        TrackerCommand::Merge(args) => {
            let report = reconciler.merge(&args.primary, &args.secondary, args.out.as_deref())?;
            emit_json(serde_json::to_value(report)?)
        }
        TrackerCommand::Export(args) => {
            let format = ExportFormat::from(args.format);
            let output = export(&store, &args.tracker, format, args.out.as_deref())?;
            emit_json(serde_json::json!({
                "tracker_path": args.tracker,
                "format": format,
                "output_path": output,
            }))
        }
    }
}

fn run_config(command: &ConfigCommand, config_path: &Path, config: &TrackerConfig) -> Result<()> {
    match command {
        ConfigCommand::Show => emit_json(serde_json::json!({
            "config_path": config_path,
            "config_file_present": config_path.is_file(),
            "config": config,
        })),
    }
}
