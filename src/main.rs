use anyhow::Result;
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use fundwatch::core::fund::HistoryRange;
use fundwatch::core::log::init_logging;

/// Largest interval whose millisecond value still fits in a `u64`.
const MAX_INTERVAL_SECS: u64 = u64::MAX / 1000;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Refresh and display the watch-list
    List {
        /// Bypass cached valuations
        #[arg(short, long)]
        force: bool,
    },
    /// Add funds to the watch-list by code
    Add {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Remove funds from the watch-list
    Remove {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Search the fund index by code or name
    Search { keyword: String },
    /// Display settled net values of a fund
    History {
        code: String,
        /// Lookback window: 7d, 30d, 90d or any number of days
        #[arg(short, long, default_value = "30d")]
        range: HistoryRange,
    },
    /// Show or change auto-refresh settings
    #[command(group(ArgGroup::new("toggle").args(["on", "off"])))]
    Auto {
        #[arg(long)]
        on: bool,
        #[arg(long)]
        off: bool,
        /// Refresh interval in seconds
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS))]
        interval: Option<u64>,
    },
    /// Live view that refreshes on the configured interval
    Watch,
}

impl From<Commands> for fundwatch::AppCommand {
    fn from(cmd: Commands) -> fundwatch::AppCommand {
        match cmd {
            Commands::List { force } => fundwatch::AppCommand::List { force },
            Commands::Add { codes } => fundwatch::AppCommand::Add { codes },
            Commands::Remove { codes } => fundwatch::AppCommand::Remove { codes },
            Commands::Search { keyword } => fundwatch::AppCommand::Search { keyword },
            Commands::History { code, range } => fundwatch::AppCommand::History { code, range },
            Commands::Auto { on, off, interval } => fundwatch::AppCommand::Auto {
                enabled: match (on, off) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                interval_ms: interval.map(|secs| secs * 1000),
            },
            Commands::Watch => fundwatch::AppCommand::Watch,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fundwatch::cli::setup::setup_at_path(path),
            None => fundwatch::cli::setup::setup(),
        },
        Some(cmd) => fundwatch::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
