//! CLI argument parsing for the environment bootstrap.
//!
//! The CLI stays thin: every subcommand resolves the configuration once and
//! hands it to a handler in `workflow`.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "envboot",
    version,
    about = "Bring up the database, object store and workflow engine in dependency order",
    after_help = "Commands:\n  up                 Launch, verify and provision every service\n  status             Show per-service platform state\n  down               Stop the environment\n  logs <SERVICE>     Show recent logs of one service\n  config             Print the resolved configuration\n\nExamples:\n  envboot up\n  envboot up --report bootstrap.json\n  envboot status --json\n  envboot logs postgres --tail 200\n  ENVBOOT_PROBE_MAX_ATTEMPTS=6 envboot up --verbose",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

impl RootArgs {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Command::Up(args) => args.verbose,
            _ => false,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Up(UpArgs),
    Status(StatusArgs),
    Down(DownArgs),
    Logs(LogsArgs),
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Launch, verify and provision every service")]
pub struct UpArgs {
    /// Write the bootstrap result as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Print the bootstrap result as JSON instead of the text summary
    #[arg(long)]
    pub json: bool,

    /// Log at debug level (overrides ENVBOOT_LOG)
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show per-service platform state")]
pub struct StatusArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Stop the environment")]
pub struct DownArgs {
    /// Also remove named volumes
    #[arg(long)]
    pub volumes: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show recent logs of one service")]
pub struct LogsArgs {
    /// Service name from the catalog
    pub service: String,

    /// Number of trailing lines (defaults to ENVBOOT_LOG_TAIL_LINES)
    #[arg(long, value_name = "N")]
    pub tail: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(about = "Print the resolved configuration as JSON")]
pub struct ConfigArgs {
    /// Print passwords and secret keys instead of masking them
    #[arg(long)]
    pub show_secrets: bool,
}
