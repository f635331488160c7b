//! Savekeeper CLI - savekeeper command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// Savekeeper - Back up every quicksave and nag when you forget to save
#[derive(Parser)]
#[command(name = "savekeeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Saves directory to watch (default: the game's multiplayer saves)
    #[arg(long, global = true)]
    saves_dir: Option<PathBuf>,

    /// Save entry to track (default: "000000 - quicksave")
    #[arg(long, global = true)]
    target: Option<String>,

    /// Log every file event
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for saves, back them up and run the save reminder (default)
    Watch {
        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Show or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
    /// List existing backups, newest first
    Backups {
        /// Number of backups to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration and any problems with it
    List,
    /// Print the config file location
    Path {
        /// Write a default config file if none exists
        #[arg(long)]
        create: bool,
    },
    /// Print a default config file
    Example,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {:#}", e);
        cli_lib::util::pause_before_exit();
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let options = cmd::GlobalOptions {
        config: cli.config,
        saves_dir: cli.saves_dir,
        target: cli.target,
        verbose: cli.verbose,
    };

    match cli.command.unwrap_or(Commands::Watch { log_file: None }) {
        Commands::Watch { log_file } => cmd::watch::run(&options, log_file.as_deref()).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&options),
            ConfigCommands::Path { create } => cmd::config::run_path(&options, create),
            ConfigCommands::Example => cmd::config::run_example(),
        },
        Commands::Backups { limit } => cmd::backups::run(&options, limit),
    }
}
