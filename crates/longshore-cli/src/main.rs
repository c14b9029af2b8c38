//! longshore - Package-import fleet lifecycle manager
//!
//! Usage:
//!   longshore install            # First-time node setup from config
//!   longshore update             # Reconcile services against config
//!   longshore start / stop       # Drive the managed services
//!   longshore status             # Live service status

mod interactive;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use longshore_core::backend::SystemdBackend;
use longshore_core::commands::{self, DriverContext};
use longshore_core::config::NodeConfig;
use longshore_core::env;
use longshore_core::fsops::LocalFs;
use longshore_core::node::Subsystems;
use longshore_core::source::GitCloner;
use longshore_core::state::StateStore;
use longshore_core::status::NodeStatus;

const DEFAULT_CONFIG_PATH: &str = "/etc/longshore/longshore.toml";

#[derive(Parser)]
#[command(name = "longshore")]
#[command(version, about = "Package-import fleet lifecycle manager", long_about = None)]
struct Cli {
    /// Desired-state config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// State directory (default: XDG state dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// First-time creation of this node's services
    Install,

    /// Reconcile running services against the config file
    Update {
        /// Destroy and recreate every service even if unchanged
        #[arg(long)]
        force_refresh: bool,
    },

    /// Start managed services
    Start {
        #[command(flatten)]
        skip: SkipArgs,
    },

    /// Stop managed services
    Stop {
        #[command(flatten)]
        skip: SkipArgs,
    },

    /// Remove all managed services and forget recorded state
    Destroy {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show live service status
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct SkipArgs {
    /// Leave the broker alone
    #[arg(long)]
    skip_broker: bool,

    /// Leave the poller alone
    #[arg(long)]
    skip_poller: bool,

    /// Leave the workers alone
    #[arg(long)]
    skip_workers: bool,
}

impl SkipArgs {
    fn subsystems(&self) -> Subsystems {
        Subsystems {
            broker: !self.skip_broker,
            poller: !self.skip_poller,
            workers: !self.skip_workers,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "longshore=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => StateStore::default_state_dir()?,
    };
    let backend = SystemdBackend::new();
    let fs = LocalFs::new();
    let cloner = GitCloner::new();
    let ctx = DriverContext::new(&backend, &fs, &cloner, state_dir);

    match cli.command {
        Commands::Install => {
            let desired = load_config(&cli.config)?;
            commands::install(&ctx, desired)?;
            println!("{} node installed", style("ok").green().bold());
        }
        Commands::Update { force_refresh } => {
            let desired = load_config(&cli.config)?;
            commands::update(&ctx, desired, force_refresh)?;
            println!("{} node reconciled", style("ok").green().bold());
        }
        Commands::Start { skip } => {
            commands::start(&ctx, skip.subsystems())?;
            println!("{} services started", style("ok").green().bold());
        }
        Commands::Stop { skip } => {
            commands::stop(&ctx, skip.subsystems())?;
            println!("{} services stopped", style("ok").green().bold());
        }
        Commands::Destroy { yes } => {
            if !yes && !interactive::confirm_destroy()? {
                println!("{} destroy aborted", style("!!").yellow().bold());
                return Ok(());
            }
            commands::destroy(&ctx)?;
            println!("{} node destroyed", style("ok").green().bold());
        }
        Commands::Status { format } => {
            let status = commands::status(&ctx)?;
            match format {
                OutputFormat::Table => print_status_table(&status),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(path)?;
    env::fill_proxy_defaults(&mut config.proxy);
    Ok(config)
}

fn print_status_table(status: &NodeStatus) {
    println!(
        "{} node {} ({}, {} workers)",
        style("::").blue().bold(),
        status.node_id,
        status.role,
        status.worker_count
    );
    for service in &status.services {
        let state = if service.running {
            style("running").green()
        } else {
            style("stopped").red()
        };
        println!("  {:<14} {:<8} {}", service.unit_name, service.kind.to_string(), state);
    }
    println!(
        "{} {}/{} services running",
        style("::").blue().bold(),
        status.summary.running,
        status.summary.total
    );
}
