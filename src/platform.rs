//! Orchestration platform capability and its compose-backed implementation.
//!
//! The orchestrator only sees [`Platform`]; any supervisor able to start,
//! inspect, tail and tear down named services satisfies it.
use crate::error::BootstrapError;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const REDACTED_VALUE: &str = "***";

/// Wall-clock bounds for platform subprocesses. A command still running at
/// its bound is killed and reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandTimeouts {
    /// `ps`, `logs`, `exec` and the version check. Readiness checks run
    /// through these, so this also bounds a single check attempt.
    pub query_secs: u64,
    /// `up`, `down` and one-off containers, which may pull images or migrate.
    pub lifecycle_secs: u64,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            query_secs: 30,
            lifecycle_secs: 600,
        }
    }
}

impl CommandTimeouts {
    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    pub fn lifecycle(&self) -> Duration {
        Duration::from_secs(self.lifecycle_secs)
    }
}

/// Captured result of a platform command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, for matching on tool messages.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// One-line failure detail, preferring stderr.
    pub fn failure_detail(&self) -> String {
        let first_line = |text: &str| {
            text.trim()
                .lines()
                .find(|line| !line.trim().is_empty())
                .map(|line| line.trim().to_string())
        };
        first_line(&self.stderr)
            .or_else(|| first_line(&self.stdout))
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Per-service state as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

impl ServiceHealth {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// Running, and not flagged by a platform-level healthcheck.
    pub fn is_healthy(&self) -> bool {
        self.is_running()
            && !matches!(
                self.health.as_deref(),
                Some("unhealthy") | Some("starting")
            )
    }
}

pub trait Platform: Sync {
    /// Confirm the platform tooling is installed and responding.
    fn ensure_available(&self) -> Result<(), BootstrapError>;

    /// Create and start services detached.
    fn start(&self, services: &[String]) -> Result<()>;

    fn status(&self, services: &[String]) -> Result<Vec<ServiceHealth>>;

    fn logs(&self, service: &str, tail_lines: usize) -> Result<String>;

    fn down(&self, remove_volumes: bool) -> Result<()>;

    /// Run a command inside a running service. `env` is set for that
    /// command only.
    fn exec(
        &self,
        service: &str,
        env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput>;

    /// Run a command in a one-off container built from a service definition,
    /// without starting its dependencies.
    fn run_once(
        &self,
        service: &str,
        env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput>;
}

/// `docker compose` (or a compatible CLI) driven as a subprocess.
#[derive(Debug, Clone)]
pub struct ComposePlatform {
    command: Vec<String>,
    compose_file: PathBuf,
    project_name: String,
    project_dir: PathBuf,
    timeouts: CommandTimeouts,
}

impl ComposePlatform {
    pub fn new(
        command: Vec<String>,
        compose_file: PathBuf,
        project_name: String,
        project_dir: PathBuf,
    ) -> Self {
        Self {
            command,
            compose_file,
            project_name,
            project_dir,
            timeouts: CommandTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn program(&self) -> Result<&str> {
        self.command
            .first()
            .map(String::as_str)
            .ok_or_else(|| anyhow!("compose command is empty"))
    }

    fn base_command(&self) -> Result<Command> {
        let mut command = Command::new(self.program()?);
        command
            .args(&self.command[1..])
            .arg("-f")
            .arg(&self.compose_file)
            .arg("-p")
            .arg(&self.project_name)
            .current_dir(&self.project_dir);
        Ok(command)
    }

    fn run<I, S>(&self, args: I, timeout: Duration) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = self.base_command()?;
        command.args(args);
        run_command(&mut command, timeout)
    }

    fn run_checked<I, S>(&self, label: &str, args: I, timeout: Duration) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = self.run(args, timeout)?;
        if !output.success() {
            return Err(anyhow!("{label} failed: {}", output.failure_detail()));
        }
        Ok(output)
    }
}

impl Platform for ComposePlatform {
    fn ensure_available(&self) -> Result<(), BootstrapError> {
        let program = self
            .program()
            .map_err(|err| BootstrapError::PrerequisiteMissing {
                tool: "compose".to_string(),
                reason: err.to_string(),
            })?
            .to_string();
        which::which(&program).map_err(|err| BootstrapError::PrerequisiteMissing {
            tool: program.clone(),
            reason: err.to_string(),
        })?;
        let mut command = Command::new(&program);
        command.args(&self.command[1..]).arg("version");
        let output = run_command(&mut command, self.timeouts.query()).map_err(|err| {
            BootstrapError::PrerequisiteMissing {
                tool: program.clone(),
                reason: format!("{err:#}"),
            }
        })?;
        if !output.success() {
            return Err(BootstrapError::PrerequisiteMissing {
                tool: self.command.join(" "),
                reason: output.failure_detail(),
            });
        }
        if !self.compose_file.is_file() {
            return Err(BootstrapError::PrerequisiteMissing {
                tool: "compose file".to_string(),
                reason: format!("{} not found", self.compose_file.display()),
            });
        }
        Ok(())
    }

    fn start(&self, services: &[String]) -> Result<()> {
        let mut args = vec!["up".to_string(), "-d".to_string()];
        args.extend(services.iter().cloned());
        self.run_checked("compose up", &args, self.timeouts.lifecycle())?;
        Ok(())
    }

    fn status(&self, services: &[String]) -> Result<Vec<ServiceHealth>> {
        let mut args = vec![
            "ps".to_string(),
            "--all".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        args.extend(services.iter().cloned());
        let output = self.run_checked("compose ps", &args, self.timeouts.query())?;
        parse_ps_output(&output.stdout)
    }

    fn logs(&self, service: &str, tail_lines: usize) -> Result<String> {
        let tail = tail_lines.to_string();
        let output = self.run_checked(
            "compose logs",
            ["logs", "--no-color", "--tail", tail.as_str(), service],
            self.timeouts.query(),
        )?;
        Ok(output.combined())
    }

    fn down(&self, remove_volumes: bool) -> Result<()> {
        let mut args = vec!["down"];
        if remove_volumes {
            args.push("--volumes");
        }
        self.run_checked("compose down", &args, self.timeouts.lifecycle())?;
        Ok(())
    }

    fn exec(
        &self,
        service: &str,
        env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput> {
        let mut args = vec!["exec".to_string(), "-T".to_string()];
        push_env_args(&mut args, env);
        args.push(service.to_string());
        args.extend(argv.iter().cloned());
        self.run(&args, self.timeouts.query())
    }

    fn run_once(
        &self,
        service: &str,
        env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--no-deps".to_string(),
            "-T".to_string(),
        ];
        push_env_args(&mut args, env);
        args.push(service.to_string());
        args.extend(argv.iter().cloned());
        self.run(&args, self.timeouts.lifecycle())
    }
}

fn push_env_args(args: &mut Vec<String>, env: &[(String, String)]) {
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
}

fn run_command(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let described = describe_command(command);
    let start = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("run {described}"))?;
    // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("wait for {described}"))?
        {
            break status;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(command = %described, ?timeout, "platform command timed out");
            return Err(anyhow!("{described} timed out after {timeout:?}"));
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    };
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    tracing::debug!(
        command = %described,
        elapsed_ms = start.elapsed().as_millis(),
        exit_code = ?status.code(),
        stdout_bytes = stdout.len(),
        "platform command complete"
    );
    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Shell-quoted command line for logs and errors. Values passed with `-e`
/// or `--password` may carry credentials and are masked.
fn describe_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    let mut previous = String::new();
    for arg in command.get_args() {
        let arg = arg.to_string_lossy().into_owned();
        let shown = match previous.as_str() {
            "-e" => match arg.split_once('=') {
                Some((key, _)) => format!("{key}={REDACTED_VALUE}"),
                None => arg.clone(),
            },
            "--password" => REDACTED_VALUE.to_string(),
            _ => arg.clone(),
        };
        parts.push(shown);
        previous = arg;
    }
    shell_words::join(parts)
}

#[derive(Deserialize)]
struct PsEntry {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: Option<String>,
}

/// Parse `compose ps --format json`, which is a JSON array on older releases
/// and one object per line on newer ones.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ServiceHealth>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("parse compose ps JSON array")?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("parse compose ps JSON line"))
            .collect::<Result<_>>()?
    };
    Ok(entries
        .into_iter()
        .map(|entry| ServiceHealth {
            service: entry.service,
            state: entry.state,
            health: entry.health.filter(|health| !health.is_empty()),
        })
        .collect())
}

/// Locate the first JSON value of the requested shape in noisy tool output.
///
/// Administrative CLIs often print log lines before their JSON payload.
pub fn extract_json(raw: &str, open: char) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != open {
            continue;
        }
        let mut deserializer = serde_json::Deserializer::from_str(&raw[idx..]);
        if let Ok(value) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}
