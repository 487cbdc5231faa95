use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cmd;

#[derive(Parser)]
#[command(name = "prereview")]
#[command(version, about = "Resumable pre-PR review pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Base reference to diff against. Overrides repository.base_candidates in review.toml
    #[arg(long, global = true)]
    pub base: Option<String>,

    /// Changed-file count above which a change set is high risk. Overrides review.toml
    #[arg(long, global = true)]
    pub threshold: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the review pipeline, waiting for each response in turn
    Run {
        /// Exit after the next request is written instead of waiting
        #[arg(long)]
        no_wait: bool,

        /// Response for the stage currently awaiting one
        #[arg(long)]
        response_file: Option<PathBuf>,
    },
    /// Show the change set and per-stage progress
    Status,
    /// Materialize a single stage's request without advancing the rest
    Stage {
        /// Stage id, e.g. coverage_analysis
        id: String,

        /// Discard the stage and its dependents, then request it again
        #[arg(long)]
        force: bool,
    },
    /// Supply the response for the stage awaiting one
    Respond {
        /// Stage id
        id: String,

        /// File containing the response (stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print a stored request or response
    View {
        /// Stage id
        id: String,

        /// Show the response instead of the request
        #[arg(long)]
        response: bool,
    },
    /// Delete the session for the current branch
    Clean {
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate review.toml and show any warnings
    Validate,
    /// Write a default review.toml
    Init,
}

/// Logs go to stderr; stdout is for command output.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "prereview=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            no_wait,
            response_file,
        } => cmd::cmd_run(&cli, project_dir, *no_wait, response_file.as_deref())?,
        Commands::Status => cmd::cmd_status(&cli, project_dir)?,
        Commands::Stage { id, force } => cmd::cmd_stage(&cli, project_dir, id, *force)?,
        Commands::Respond { id, file } => {
            cmd::cmd_respond(&cli, project_dir, id, file.as_deref())?
        }
        Commands::View { id, response } => cmd::cmd_view(&cli, project_dir, id, *response)?,
        Commands::Clean { force } => cmd::cmd_clean(&cli, project_dir, *force)?,
        Commands::Config { command } => cmd::cmd_config(&cli, project_dir, command.clone())?,
    }

    Ok(())
}
