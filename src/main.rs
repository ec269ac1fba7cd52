mod admin;
mod checks;
mod cli;
mod config;
mod env_file;
mod error;
mod orchestrator;
mod platform;
mod probe;
mod provision;
mod result;
mod services;
mod signal;
mod summary;
#[cfg(test)]
mod testing;
mod util;
mod volumes;
mod workflow;

use clap::Parser;
use cli::{Command, RootArgs};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Process exit code for plumbing errors outside the bootstrap phases.
const EXIT_FAILURE: u8 = 1;

/// Log to stderr so stdout carries only reports. `ENVBOOT_LOG` takes
/// `EnvFilter` syntax; `--verbose` forces debug.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("ENVBOOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose());

    let config = config::resolve();
    let outcome = match args.command {
        Command::Up(args) => workflow::run_up(args, &config),
        Command::Status(args) => workflow::run_status(args, &config),
        Command::Down(args) => workflow::run_down(args, &config),
        Command::Logs(args) => workflow::run_logs(args, &config),
        Command::Config(args) => workflow::run_config(args, &config),
    };
    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<error::BootstrapError>()
                .map(|err| err.kind().exit_code())
                .unwrap_or(EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}
