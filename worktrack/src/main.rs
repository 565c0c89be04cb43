//! Change tracking and status aggregation CLI.
//!
//! Records live under `.worktrack/records` (one JSON file per unit or
//! container) and configuration under `.worktrack/config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use worktrack::core::types::{SnapshotDescriptor, UnitStatus};
use worktrack::diff::compute_diff;
use worktrack::error::TrackError;
use worktrack::exit_codes;
use worktrack::io::config::{TrackerConfig, load_config, write_config};
use worktrack::io::events::{EventSink, JsonlSink, NullSink};
use worktrack::io::git::GitProbe;
use worktrack::io::store::DirStore;
use worktrack::logging;
use worktrack::model::{ContainerKind, UnitMetrics};
use worktrack::tracker::{CompleteRequest, StartRequest, Tracker};
use worktrack::unit::{complete_unit, start_unit};

const CONFIG_FILE: &str = "config.toml";
const RECORDS_DIR: &str = "records";

#[derive(Parser)]
#[command(
    name = "worktrack",
    version,
    about = "Track what agent work units change and roll their status up"
)]
struct Cli {
    /// Directory holding config and records.
    #[arg(long, global = true, default_value = ".worktrack")]
    store: PathBuf,

    /// git executable used by every probe.
    #[arg(long, global = true, default_value = "git")]
    git: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store directory and a default config if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Manage containers (phases, workflows, missions).
    Container {
        #[command(subcommand)]
        command: ContainerCommand,
    },
    /// Snapshot the tree and record a new in-progress unit.
    Start {
        #[arg(long)]
        container: String,
        /// Unit id; generated when omitted.
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        parent_unit: Option<String>,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Declared work area (repeatable).
        #[arg(long = "area")]
        areas: Vec<String>,
    },
    /// Diff, verify and close a unit, then recompute its containers.
    Complete {
        #[arg(long)]
        unit: String,
        #[arg(long, value_enum)]
        status: StatusArg,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
        #[arg(long, default_value_t = 0)]
        input_tokens: u64,
        #[arg(long, default_value_t = 0)]
        output_tokens: u64,
    },
    /// Recompute a container's status and rollup from its children.
    Recompute { container: String },
    /// Set the BLOCKED overlay on a container.
    Block { container: String },
    /// Clear the BLOCKED overlay on a container.
    Unblock { container: String },
    /// Print a snapshot descriptor for `--root` without recording anything.
    Snapshot {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Print the change set since a revision or a saved snapshot descriptor.
    Diff {
        #[command(flatten)]
        since: Since,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Check changes since a revision or snapshot against declared areas.
    Verify {
        #[command(flatten)]
        since: Since,
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long = "area")]
        areas: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ContainerCommand {
    /// Create a PENDING container.
    Create {
        id: String,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        parent: Option<String>,
    },
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct Since {
    /// Revision the work started from: a commit id, branch, tag or any other
    /// name `git rev-parse` resolves to a commit.
    #[arg(long)]
    from: Option<String>,
    /// JSON file holding a descriptor printed by `worktrack snapshot`.
    #[arg(long)]
    descriptor: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusArg {
    Success,
    PartialSuccess,
    Failed,
}

impl From<StatusArg> for UnitStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Success => UnitStatus::Success,
            StatusArg::PartialSuccess => UnitStatus::PartialSuccess,
            StatusArg::Failed => UnitStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Phase,
    Workflow,
    Mission,
}

impl From<KindArg> for ContainerKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Phase => ContainerKind::Phase,
            KindArg::Workflow => ContainerKind::Workflow,
            KindArg::Mission => ContainerKind::Mission,
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.store, force),
        Command::Container {
            command: ContainerCommand::Create { id, kind, parent },
        } => {
            let tracker = open_tracker(&cli.store, &cli.git)?;
            let container = tracker.create_container(&id, kind.into(), parent.as_deref())?;
            print_json(&container)?;
            Ok(exit_codes::OK)
        }
        Command::Start {
            container,
            id,
            parent_unit,
            root,
            areas,
        } => {
            let tracker = open_tracker(&cli.store, &cli.git)?;
            let unit = tracker.begin_unit(StartRequest {
                unit_id: id,
                container_id: container,
                parent_unit_id: parent_unit,
                root: absolute(&root)?,
                declared_areas: areas,
            })?;
            print_json(&unit)?;
            Ok(exit_codes::OK)
        }
        Command::Complete {
            unit,
            status,
            duration_ms,
            input_tokens,
            output_tokens,
        } => {
            let tracker = open_tracker(&cli.store, &cli.git)?;
            let unit = tracker.finish_unit(CompleteRequest {
                unit_id: unit,
                status: status.into(),
                metrics: UnitMetrics {
                    duration_ms,
                    input_tokens,
                    output_tokens,
                },
            })?;
            print_json(&unit)?;
            Ok(exit_codes::OK)
        }
        Command::Recompute { container } => {
            let tracker = open_tracker(&cli.store, &cli.git)?;
            let (status, rollup) = tracker.recompute_container_status(&container)?;
            print_json(&serde_json::json!({ "status": status, "rollup": rollup }))?;
            Ok(exit_codes::OK)
        }
        Command::Block { container } => cmd_set_blocked(&cli.store, &cli.git, &container, true),
        Command::Unblock { container } => cmd_set_blocked(&cli.store, &cli.git, &container, false),
        Command::Snapshot { root } => {
            let cfg = load_store_config(&cli.store)?;
            let probe = git_probe(&cli.git, &cfg);
            let descriptor = start_unit(&probe, &root, &[], &cfg.fingerprint);
            print_json(&descriptor)?;
            Ok(exit_codes::OK)
        }
        Command::Diff { since, root } => {
            let cfg = load_store_config(&cli.store)?;
            let probe = git_probe(&cli.git, &cfg);
            let report = since
                .descriptor(&probe, &root)
                .and_then(|descriptor| Ok(compute_diff(&probe, &descriptor, &root)?));
            match report {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(exit_codes::OK)
                }
                Err(err) if diff_unavailable(&err) => {
                    eprintln!("diff unavailable: {err:#}");
                    Ok(exit_codes::DIFF_UNAVAILABLE)
                }
                Err(err) => Err(err),
            }
        }
        Command::Verify { since, root, areas } => {
            let cfg = load_store_config(&cli.store)?;
            let probe = git_probe(&cli.git, &cfg);
            let outcome = since
                .descriptor(&probe, &root)
                .and_then(|descriptor| Ok(complete_unit(&probe, &descriptor, &root, &areas)?));
            match outcome {
                Ok(outcome) => {
                    print_json(&outcome)?;
                    if outcome.verdict.scope_match {
                        Ok(exit_codes::OK)
                    } else {
                        Ok(exit_codes::SCOPE_MISMATCH)
                    }
                }
                Err(err) if diff_unavailable(&err) => {
                    eprintln!("diff unavailable: {err:#}");
                    Ok(exit_codes::DIFF_UNAVAILABLE)
                }
                Err(err) => Err(err),
            }
        }
    }
}

fn diff_unavailable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TrackError>()
        .is_some_and(TrackError::is_probe_unavailable)
}

impl Since {
    /// Starting point for a diff under `root`; `--from` is resolved to a full
    /// commit id so branch names and `HEAD~N` work.
    fn descriptor(&self, probe: &GitProbe, root: &Path) -> Result<SnapshotDescriptor> {
        match (&self.from, &self.descriptor) {
            (Some(revision), _) => {
                let id = probe
                    .resolve_revision(root, revision)
                    .with_context(|| format!("resolve --from {revision}"))?;
                Ok(SnapshotDescriptor::Versioned { id })
            }
            (None, Some(path)) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
            }
            (None, None) => bail!("either --from or --descriptor is required"),
        }
    }
}

fn cmd_init(store: &Path, force: bool) -> Result<i32> {
    let config_path = store.join(CONFIG_FILE);
    std::fs::create_dir_all(store.join(RECORDS_DIR))
        .with_context(|| format!("create {}", store.join(RECORDS_DIR).display()))?;
    if force || !config_path.exists() {
        write_config(&config_path, &TrackerConfig::default())?;
    }
    Ok(exit_codes::OK)
}

fn cmd_set_blocked(store: &Path, git: &Path, container: &str, blocked: bool) -> Result<i32> {
    let tracker = open_tracker(store, git)?;
    let status = tracker.set_blocked(container, blocked)?;
    print_json(&serde_json::json!({ "container_id": container, "status": status }))?;
    Ok(exit_codes::OK)
}

fn load_store_config(store: &Path) -> Result<TrackerConfig> {
    load_config(&store.join(CONFIG_FILE))
}

fn git_probe(program: &Path, cfg: &TrackerConfig) -> GitProbe {
    GitProbe::new(cfg.probe_limits()).with_program(program)
}

type CliTracker = Tracker<GitProbe, DirStore, Box<dyn EventSink>>;

fn open_tracker(store: &Path, git: &Path) -> Result<CliTracker> {
    let cfg = load_store_config(store)?;
    let events: Box<dyn EventSink> = match &cfg.events.path {
        Some(path) if path.is_absolute() => Box::new(JsonlSink::new(path.clone())),
        Some(path) => Box::new(JsonlSink::new(store.join(path))),
        None => Box::new(NullSink),
    };
    let probe = git_probe(git, &cfg);
    Ok(Tracker::new(
        probe,
        DirStore::new(store.join(RECORDS_DIR)),
        events,
        cfg,
    ))
}

/// Units outlive the shell they were started from, so store absolute roots.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
