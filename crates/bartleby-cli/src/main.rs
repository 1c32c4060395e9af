mod cmd_card;
mod cmd_config;
mod cmd_init;
mod cmd_link;
mod cmd_log;
mod cmd_network;
mod cmd_rebuild;
mod cmd_refs;
mod cmd_settings;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bartleby_aggregate::Workspace;
use bartleby_core::CoreError;
use bartleby_ledger::{BartlebyPaths, Settings};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bartleby", version, about = "Cards, links and wiki references on an event log")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a new .bartleby/ workspace
    Init,
    /// Create, edit and browse cards
    Card {
        #[command(subcommand)]
        cmd: cmd_card::CardCmd,
    },
    /// Create, edit and list links between cards
    Link {
        #[command(subcommand)]
        cmd: cmd_link::LinkCmd,
    },
    /// Show cards reachable from a card through links
    Network {
        /// Center card id
        id: String,
        /// Maximum number of hops
        #[arg(long, default_value_t = 1)]
        depth: usize,
        /// Only follow these link types (repeatable)
        #[arg(long = "type")]
        link_types: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change the project configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
    /// Show events from the log
    Log {
        /// Only events strictly after this timestamp (epoch ms)
        #[arg(long)]
        since: Option<i64>,
        /// Filter by event type (card.created, link.deleted, ...), newest first
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Maximum number of events
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Report resolved, ghost and ambiguous references in a card
    Refs {
        /// Card id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear all views and replay the event log
    Rebuild,
    /// Show or change local runtime settings
    Settings {
        #[command(subcommand)]
        cmd: cmd_settings::SettingsCmd,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: cannot read current directory: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cwd);

    match dispatch(cli.cmd, &cwd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cmd: Command, cwd: &Path) -> anyhow::Result<()> {
    match cmd {
        Command::Init => cmd_init::execute(cwd),
        Command::Card { cmd } => cmd_card::run(cmd, cwd),
        Command::Link { cmd } => cmd_link::run(cmd, cwd),
        Command::Network {
            id,
            depth,
            link_types,
            json,
        } => cmd_network::execute(cwd, &id, depth, &link_types, json),
        Command::Config { cmd } => cmd_config::run(cmd, cwd),
        Command::Log {
            since,
            event_type,
            limit,
            json,
        } => cmd_log::execute(&cmd_log::LogParams {
            cwd,
            since,
            event_type: event_type.as_deref(),
            limit,
            json,
        }),
        Command::Refs { id, json } => cmd_refs::execute(cwd, &id, json),
        Command::Rebuild => cmd_rebuild::execute(cwd),
        Command::Settings { cmd } => cmd_settings::run(cmd, cwd),
    }
}

/// Domain failures print their stable code; anything else prints the chain.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<CoreError>() {
        Some(core) => eprintln!("error[{}]: {core}", core.code()),
        None => eprintln!("error: {err:#}"),
    }
}

/// Log filter: `BARTLEBY_LOG`, then the `log_filter` setting, then `warn`.
fn init_tracing(cwd: &Path) {
    let filter = EnvFilter::try_from_env("BARTLEBY_LOG")
        .ok()
        .or_else(|| {
            let root = BartlebyPaths::find_root(cwd)?;
            let settings = Settings::load(&BartlebyPaths::discover(root).settings_json).ok()?;
            EnvFilter::try_new(settings.log_filter?).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Root of the enclosing workspace.
pub(crate) fn workspace_root(cwd: &Path) -> anyhow::Result<PathBuf> {
    BartlebyPaths::find_root(cwd)
        .ok_or_else(|| anyhow::anyhow!("not inside a bartleby workspace (run `bartleby init`)"))
}

/// Open the enclosing workspace.
pub(crate) fn open_workspace(cwd: &Path) -> anyhow::Result<Workspace> {
    let root = workspace_root(cwd)?;
    debug!(root = %root.display(), "opening workspace");
    Ok(Workspace::open(&root)?)
}
