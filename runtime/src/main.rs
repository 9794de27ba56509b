// Copyright 2026 FeedRelay Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use feedrelay_runtime::{cli, telemetry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "feedrelay",
    about = "FeedRelay — relay a live on-page signal into an append-only store",
    version,
    after_help = "Run 'feedrelay <command> --help' for details on each command.\nRun 'feedrelay' with no command to start relaying."
)]
struct Cli {
    /// Configuration file (default: $FEEDRELAY_CONFIG or ./feedrelay.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is not set (e.g. "debug", "feedrelay_runtime=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print every feed event as a JSON line on stdout
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured feed (default)
    Run {
        /// Run only the named feed
        #[arg(long)]
        feed: Option<String>,
    },
    /// Validate the configuration and print it with secrets masked
    Check,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_level.as_deref(), cli.json_logs);

    match cli.command.unwrap_or(Commands::Run { feed: None }) {
        Commands::Run { feed } => cli::run_cmd::run(cli.config, feed, cli.events).await,
        Commands::Check => cli::check_cmd::run(cli.config),
        Commands::Doctor => cli::doctor::run(cli.config),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "feedrelay",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
