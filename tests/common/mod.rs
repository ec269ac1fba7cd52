//! Shared helpers for driving the built binary.

use std::path::Path;
use std::process::{Command, Output};

/// Run `envboot` with a scrubbed environment rooted at `project_dir`.
pub fn run_envboot(project_dir: &Path, vars: &[(&str, &str)], args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_envboot"));
    command
        .env_clear()
        .env("ENVBOOT_PROJECT_DIR", project_dir)
        .env("ENVBOOT_LOG", "off")
        .current_dir(project_dir)
        .args(args);
    for (key, value) in vars {
        command.env(key, value);
    }
    command.output().expect("spawn envboot")
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}
