//! In-memory fakes for the platform, admin protocols and readiness checks.
use crate::admin::{CreateOutcome, ObjectStoreAdmin, WorkflowAdmin};
use crate::config::AdminAccount;
use crate::error::BootstrapError;
use crate::platform::{CommandOutput, Platform, ServiceHealth};
use crate::probe::{ReadinessCheck, Sleeper};
use crate::signal::CancelToken;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered record of side effects shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().expect("event log lock").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().expect("event log lock").clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[derive(Default)]
struct PlatformState {
    calls: Vec<String>,
    exec_script: VecDeque<CommandOutput>,
    run_once_script: VecDeque<CommandOutput>,
    health: BTreeMap<String, ServiceHealth>,
    start_failures: BTreeMap<String, String>,
    start_interrupts: BTreeMap<String, CancelToken>,
    logs: BTreeMap<String, String>,
    missing_tool: Option<String>,
}

/// Platform double. Unscripted `exec`/`run_once` calls succeed silently.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    fn with_state<T>(&self, f: impl FnOnce(&mut PlatformState) -> T) -> T {
        f(&mut self.state.lock().expect("fake platform lock"))
    }

    pub fn script_exec(&self, output: CommandOutput) {
        self.with_state(|s| s.exec_script.push_back(output));
    }

    pub fn script_run_once(&self, output: CommandOutput) {
        self.with_state(|s| s.run_once_script.push_back(output));
    }

    pub fn set_health(&self, health: ServiceHealth) {
        self.with_state(|s| {
            s.health.insert(health.service.clone(), health);
        });
    }

    pub fn fail_start(&self, service: &str, reason: &str) {
        self.with_state(|s| {
            s.start_failures
                .insert(service.to_string(), reason.to_string());
        });
    }

    /// Starting `service` cancels `token` and fails the way a child killed by
    /// the terminal's SIGINT does.
    pub fn interrupt_start(&self, service: &str, token: &CancelToken) {
        self.with_state(|s| {
            s.start_interrupts.insert(service.to_string(), token.clone());
        });
    }

    pub fn set_logs(&self, service: &str, text: &str) {
        self.with_state(|s| {
            s.logs.insert(service.to_string(), text.to_string());
        });
    }

    pub fn set_missing_tool(&self, tool: &str) {
        self.with_state(|s| s.missing_tool = Some(tool.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }
}

impl Platform for FakePlatform {
    fn ensure_available(&self) -> Result<(), BootstrapError> {
        match self.with_state(|s| s.missing_tool.clone()) {
            Some(tool) => Err(BootstrapError::PrerequisiteMissing {
                tool,
                reason: "not found in PATH".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn start(&self, services: &[String]) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(format!("start {}", services.join(" ")));
            if let Some(token) = services.iter().find_map(|name| s.start_interrupts.get(name)) {
                token.cancel();
                return Err(anyhow!("compose up: signal: interrupt"));
            }
            match services.iter().find_map(|name| s.start_failures.get(name)) {
                Some(reason) => Err(anyhow!("{reason}")),
                None => Ok(()),
            }
        })
    }

    fn status(&self, services: &[String]) -> Result<Vec<ServiceHealth>> {
        self.with_state(|s| {
            s.calls.push(format!("status {}", services.join(" ")).trim_end().to_string());
            Ok(s.health
                .values()
                .filter(|h| services.is_empty() || services.contains(&h.service))
                .cloned()
                .collect())
        })
    }

    fn logs(&self, service: &str, tail_lines: usize) -> Result<String> {
        self.with_state(|s| {
            s.calls.push(format!("logs {service} {tail_lines}"));
            Ok(s.logs.get(service).cloned().unwrap_or_default())
        })
    }

    fn down(&self, remove_volumes: bool) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(if remove_volumes {
                "down --volumes".to_string()
            } else {
                "down".to_string()
            });
        });
        Ok(())
    }

    fn exec(
        &self,
        service: &str,
        env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput> {
        self.with_state(|s| {
            let keys: Vec<&str> = env.iter().map(|(key, _)| key.as_str()).collect();
            let env_note = if keys.is_empty() {
                String::new()
            } else {
                format!("env={} ", keys.join(","))
            };
            s.calls
                .push(format!("exec {service} {env_note}{}", argv.join(" ")));
            Ok(s.exec_script.pop_front().unwrap_or_else(success))
        })
    }

    fn run_once(
        &self,
        service: &str,
        _env: &[(String, String)],
        argv: &[String],
    ) -> Result<CommandOutput> {
        self.with_state(|s| {
            s.calls.push(format!("run_once {service} {}", argv.join(" ")));
            Ok(s.run_once_script.pop_front().unwrap_or_else(success))
        })
    }
}

fn success() -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        ..CommandOutput::default()
    }
}

/// Readiness check that fails a fixed number of times, then passes.
#[derive(Clone)]
pub struct ScriptedCheck {
    failures_before_ready: Option<u32>,
    calls: Arc<AtomicU32>,
    events: Option<(EventLog, String)>,
    cancel_on_failure: Option<CancelToken>,
}

impl ScriptedCheck {
    pub fn failing_then_ready(failures: u32) -> Self {
        Self {
            failures_before_ready: Some(failures),
            calls: Arc::new(AtomicU32::new(0)),
            events: None,
            cancel_on_failure: None,
        }
    }

    pub fn never_ready() -> Self {
        Self {
            failures_before_ready: None,
            calls: Arc::new(AtomicU32::new(0)),
            events: None,
            cancel_on_failure: None,
        }
    }

    /// Push `ready <label>` to `events` when the check passes.
    pub fn recording(mut self, events: &EventLog, label: &str) -> Self {
        self.events = Some((events.clone(), label.to_string()));
        self
    }

    /// Cancel `token` on every failed attempt, as an operator interrupt would.
    pub fn cancelling(mut self, token: &CancelToken) -> Self {
        self.cancel_on_failure = Some(token.clone());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReadinessCheck for ScriptedCheck {
    fn describe(&self) -> String {
        "scripted check".to_string()
    }

    fn check(&self, _platform: &dyn Platform) -> Result<()> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.failures_before_ready {
            Some(failures) if attempt > failures => {
                if let Some((events, label)) = &self.events {
                    events.push(format!("ready {label}"));
                }
                Ok(())
            }
            _ => {
                if let Some(token) = &self.cancel_on_failure {
                    token.cancel();
                }
                Err(anyhow!("connection refused (attempt {attempt})"))
            }
        }
    }
}

/// Sleeper that only accumulates the requested time.
#[derive(Default)]
pub struct InstantSleeper {
    total: Mutex<Duration>,
}

impl InstantSleeper {
    pub fn total(&self) -> Duration {
        *self.total.lock().expect("sleeper lock")
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration) {
        *self.total.lock().expect("sleeper lock") += duration;
    }
}

#[derive(Default)]
struct WorkflowState {
    schema_ready: bool,
    schema_inits: u32,
    schema_failure: Option<String>,
    schema_interrupt: Option<CancelToken>,
    users: BTreeSet<String>,
    listing_hidden: bool,
    create_user_calls: u32,
}

#[derive(Default)]
pub struct FakeWorkflow {
    state: Mutex<WorkflowState>,
    events: EventLog,
}

impl FakeWorkflow {
    pub fn with_events(events: &EventLog) -> Self {
        Self {
            state: Mutex::default(),
            events: events.clone(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut WorkflowState) -> T) -> T {
        f(&mut self.state.lock().expect("fake workflow lock"))
    }

    pub fn add_user(&self, username: &str) {
        self.with_state(|s| {
            s.users.insert(username.to_string());
        });
    }

    /// Make `user_exists` miss every account, as if it was created after the check.
    pub fn hide_users_from_listing(&self) {
        self.with_state(|s| s.listing_hidden = true);
    }

    pub fn fail_schema_init(&self, reason: &str) {
        self.with_state(|s| s.schema_failure = Some(reason.to_string()));
    }

    /// Schema init cancels `token` and fails as if its container was killed.
    pub fn interrupt_schema_init(&self, token: &CancelToken) {
        self.with_state(|s| s.schema_interrupt = Some(token.clone()));
    }

    pub fn schema_inits(&self) -> u32 {
        self.with_state(|s| s.schema_inits)
    }

    pub fn create_user_calls(&self) -> u32 {
        self.with_state(|s| s.create_user_calls)
    }
}

impl WorkflowAdmin for FakeWorkflow {
    fn schema_initialized(&self) -> Result<bool> {
        Ok(self.with_state(|s| s.schema_ready))
    }

    fn init_schema(&self, _connection_string: &str) -> Result<()> {
        self.events.push("workflow init-schema");
        self.with_state(|s| {
            if let Some(token) = &s.schema_interrupt {
                token.cancel();
                return Err(anyhow!("airflow db migrate: exit status 130"));
            }
            if let Some(reason) = &s.schema_failure {
                return Err(anyhow!("{reason}"));
            }
            s.schema_ready = true;
            s.schema_inits += 1;
            Ok(())
        })
    }

    fn user_exists(&self, username: &str) -> Result<bool> {
        Ok(self.with_state(|s| !s.listing_hidden && s.users.contains(username)))
    }

    fn create_user(&self, account: &AdminAccount) -> Result<CreateOutcome> {
        self.events.push(format!("workflow create-user {}", account.username));
        Ok(self.with_state(|s| {
            s.create_user_calls += 1;
            if s.users.insert(account.username.clone()) {
                CreateOutcome::Created
            } else {
                CreateOutcome::AlreadyExists
            }
        }))
    }
}

#[derive(Default)]
struct ObjectStoreState {
    buckets: BTreeSet<String>,
    created_elsewhere: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeObjectStore {
    state: Mutex<ObjectStoreState>,
    events: EventLog,
}

impl FakeObjectStore {
    pub fn with_events(events: &EventLog) -> Self {
        Self {
            state: Mutex::default(),
            events: events.clone(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ObjectStoreState) -> T) -> T {
        f(&mut self.state.lock().expect("fake object store lock"))
    }

    /// Another client creates `bucket` between the listing and the create call.
    pub fn race_on_create(&self, bucket: &str) {
        self.with_state(|s| {
            s.created_elsewhere.insert(bucket.to_string());
        });
    }

    pub fn buckets(&self) -> Vec<String> {
        self.with_state(|s| s.buckets.iter().cloned().collect())
    }
}

impl ObjectStoreAdmin for FakeObjectStore {
    fn register_alias(&self) -> Result<()> {
        self.events.push("object-store register-alias");
        Ok(())
    }

    fn list_buckets(&self) -> Result<Vec<String>> {
        self.events.push("object-store list-buckets");
        Ok(self.buckets())
    }

    fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome> {
        self.events.push(format!("object-store create-bucket {bucket}"));
        Ok(self.with_state(|s| {
            if s.created_elsewhere.contains(bucket) || s.buckets.contains(bucket) {
                CreateOutcome::AlreadyExists
            } else {
                s.buckets.insert(bucket.to_string());
                CreateOutcome::Created
            }
        }))
    }
}
