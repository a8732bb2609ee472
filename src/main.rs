use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mend::mend_config::CliOverrides;

mod cmd;

#[derive(Parser)]
#[command(name = "mend")]
#[command(version, about = "Automated build-error remediation")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the project and try to fix whatever fails
    Fix {
        /// Maximum build → fix cycles. Overrides mend.toml.
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Candidate fixes requested per file. Overrides mend.toml.
        #[arg(long)]
        max_fixes: Option<usize>,

        /// Build command. Overrides mend.toml and MEND_BUILD_CMD.
        #[arg(long)]
        build_cmd: Option<String>,

        /// Branch the run works on (defaults to the checked-out branch)
        #[arg(long)]
        branch: Option<String>,

        /// Commit fixes locally without pushing
        #[arg(long)]
        no_push: bool,

        /// Number of an open pull request for the branch; fixes are committed to it
        #[arg(long)]
        pr: Option<u64>,
    },
    /// Extract structured errors from captured build output
    Parse {
        /// File with build output, or "-" for stdin
        input: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// List recorded remediation runs
    Runs {
        /// Show at most this many runs
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default mend.toml file
    Init,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Fix {
            max_iterations,
            max_fixes,
            build_cmd,
            branch,
            no_push,
            pr,
        } => {
            let overrides = CliOverrides {
                max_iterations: *max_iterations,
                max_fixes: *max_fixes,
                build_cmd: build_cmd.clone(),
                branch: branch.clone(),
                no_push: *no_push,
                pr: *pr,
            };
            cmd::cmd_fix(&cli, project_dir, overrides).await?;
        }
        Commands::Parse { input } => cmd::cmd_parse(&project_dir, input).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Runs { limit } => cmd::cmd_runs(&project_dir, *limit)?,
    }

    Ok(())
}
