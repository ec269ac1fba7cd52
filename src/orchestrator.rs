//! Phase-ordered bring-up of the environment.
//!
//! Phases run strictly in sequence and never retry across a boundary. A
//! fatal error ends the run as `Aborted` at the phase being attempted; the
//! effects of earlier phases are left in place because every provisioning
//! action is idempotent and a full re-run is safe.
use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::platform::Platform;
use crate::probe::{wait_ready, ProbeOutcome, ReadinessCheck, Sleeper};
use crate::provision::{run_action, ActionStatus, ProvisionContext};
use crate::result::{ActionRecord, BootstrapResult, Diagnostic, Outcome};
use crate::services::{Catalog, ServiceRole};
use crate::signal::CancelToken;
use crate::volumes;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    DirectoriesReady,
    DatabaseReady,
    DatabaseProvisioned,
    ObjectStoreReady,
    ObjectStoreProvisioned,
    AllServicesLaunched,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Init => "init",
            Phase::DirectoriesReady => "directories-ready",
            Phase::DatabaseReady => "database-ready",
            Phase::DatabaseProvisioned => "database-provisioned",
            Phase::ObjectStoreReady => "object-store-ready",
            Phase::ObjectStoreProvisioned => "object-store-provisioned",
            Phase::AllServicesLaunched => "all-services-launched",
            Phase::Done => "done",
        };
        f.write_str(label)
    }
}

pub struct Orchestrator<'a> {
    pub config: &'a BootstrapConfig,
    pub platform: &'a dyn Platform,
    pub catalog: &'a Catalog,
    pub provision: ProvisionContext<'a>,
    pub sleeper: &'a dyn Sleeper,
    pub cancel: CancelToken,
}

struct RunState {
    result: BootstrapResult,
    current: Phase,
    started: BTreeSet<String>,
}

impl Orchestrator<'_> {
    pub fn run(&self) -> BootstrapResult {
        let mut state = RunState {
            result: BootstrapResult::default(),
            current: Phase::Init,
            started: BTreeSet::new(),
        };
        match self.drive(&mut state) {
            Ok(()) => {
                state.result.outcome = Outcome::Done;
                tracing::info!(
                    started = state.result.services_started.len(),
                    applied = state.result.actions_applied().count(),
                    skipped = state.result.actions_skipped().count(),
                    "bootstrap complete"
                );
            }
            Err(err) => {
                // An interrupt also kills in-flight children; their failure is
                // reported as the interrupt itself.
                let err = if self.cancel.is_cancelled() {
                    BootstrapError::Interrupted
                } else {
                    err
                };
                tracing::error!(phase = %state.current, error = %err, "bootstrap aborted");
                self.capture_diagnostics(&err, &mut state.result);
                state.result.abort(state.current, &err);
            }
        }
        state.result
    }

    fn drive(&self, state: &mut RunState) -> Result<(), BootstrapError> {
        self.enter(state, Phase::Init)?;
        self.platform.ensure_available()?;
        self.complete(state);

        self.enter(state, Phase::DirectoriesReady)?;
        state.result.directories = volumes::ensure(&self.config.volumes.paths())?;
        self.complete(state);

        self.enter(state, Phase::DatabaseReady)?;
        let database = self.launch_role(state, ServiceRole::Database)?;
        self.complete(state);

        self.enter(state, Phase::DatabaseProvisioned)?;
        self.provision(state, &database)?;
        self.complete(state);

        self.enter(state, Phase::ObjectStoreReady)?;
        let object_store = self.launch_role(state, ServiceRole::ObjectStore)?;
        self.complete(state);

        self.enter(state, Phase::ObjectStoreProvisioned)?;
        self.provision(state, &object_store)?;
        self.complete(state);

        self.enter(state, Phase::AllServicesLaunched)?;
        let remaining: Vec<String> = self
            .catalog
            .names()
            .into_iter()
            .filter(|name| !state.started.contains(name))
            .collect();
        let workloads = self.launch(state, &remaining)?;
        self.provision(state, &workloads)?;
        self.complete(state);

        state.current = Phase::Done;
        self.complete(state);
        Ok(())
    }

    fn enter(&self, state: &mut RunState, phase: Phase) -> Result<(), BootstrapError> {
        state.current = phase;
        self.check_cancel()?;
        tracing::info!(phase = %phase, "entering phase");
        Ok(())
    }

    fn complete(&self, state: &mut RunState) {
        tracing::info!(phase = %state.current, "phase complete");
        state.result.phases_completed.push(state.current);
    }

    fn check_cancel(&self) -> Result<(), BootstrapError> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Interrupted);
        }
        Ok(())
    }

    fn launch_role(
        &self,
        state: &mut RunState,
        role: ServiceRole,
    ) -> Result<Vec<String>, BootstrapError> {
        match self.catalog.with_role(role) {
            Some(service) => self.launch(state, &self.catalog.closure(&service.name)),
            None => {
                tracing::warn!(?role, "no service declared for role");
                Ok(Vec::new())
            }
        }
    }

    /// Start `targets` level by level, probing each level before the next.
    /// Returns the services that became ready.
    fn launch(
        &self,
        state: &mut RunState,
        targets: &[String],
    ) -> Result<Vec<String>, BootstrapError> {
        let pending: Vec<String> = targets
            .iter()
            .filter(|name| !state.started.contains(*name))
            .cloned()
            .collect();
        let mut ready = Vec::new();
        for level in self.catalog.levels(&pending) {
            self.check_cancel()?;
            tracing::info!(services = %level.join(", "), "starting services");
            if let Err(err) = self.platform.start(&level) {
                self.check_cancel()?;
                state.result.services_failed.extend(level.iter().cloned());
                return Err(BootstrapError::Launch {
                    services: level.join(", "),
                    reason: format!("{err:#}"),
                });
            }

            let mut failure = None;
            for (name, outcome) in self.probe_level(&level) {
                match outcome {
                    ProbeOutcome::Ready { .. } => {
                        state.started.insert(name.clone());
                        state.result.services_started.push(name.clone());
                        ready.push(name);
                    }
                    ProbeOutcome::TimedOut {
                        attempts,
                        last_error,
                    } => {
                        state.result.services_failed.push(name.clone());
                        if failure.is_none() {
                            failure = Some(BootstrapError::Readiness {
                                service: name,
                                attempts,
                                reason: last_error,
                            });
                        }
                    }
                    ProbeOutcome::Cancelled { .. } => {
                        failure = Some(BootstrapError::Interrupted);
                    }
                }
            }
            if let Some(err) = failure {
                return Err(err);
            }
        }
        Ok(ready)
    }

    /// Probe every service of one level, concurrently when there are several.
    fn probe_level(&self, level: &[String]) -> Vec<(String, ProbeOutcome)> {
        let checks: Vec<(&str, &dyn ReadinessCheck)> = level
            .iter()
            .filter_map(|name| self.catalog.get(name))
            .map(|service| (service.name.as_str(), service.readiness.as_ref()))
            .collect();
        let platform = self.platform;
        let policy = &self.config.probe;
        let sleeper = self.sleeper;
        let cancel = &self.cancel;

        if let [(name, check)] = checks.as_slice() {
            let outcome = wait_ready(name, *check, platform, policy, sleeper, cancel);
            return vec![(name.to_string(), outcome)];
        }
        std::thread::scope(|scope| {
            let handles: Vec<_> = checks
                .iter()
                .map(|&(name, check)| {
                    let handle = scope
                        .spawn(move || wait_ready(name, check, platform, policy, sleeper, cancel));
                    (name, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| ProbeOutcome::TimedOut {
                        attempts: 0,
                        last_error: "readiness probe panicked".to_string(),
                    });
                    (name.to_string(), outcome)
                })
                .collect()
        })
    }

    /// Run the provisioning actions of `services` in order, stopping at the
    /// first failure.
    fn provision(&self, state: &mut RunState, services: &[String]) -> Result<(), BootstrapError> {
        for name in services {
            let Some(service) = self.catalog.get(name) else {
                continue;
            };
            for action in &service.actions {
                self.check_cancel()?;
                let status = run_action(action.as_ref(), &self.provision);
                state.result.actions.push(ActionRecord {
                    name: action.name(),
                    service: name.clone(),
                    result: status.clone(),
                });
                if let ActionStatus::Failed(reason) = status {
                    return Err(BootstrapError::Provisioning {
                        action: action.name(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Attach the recent logs of every service the failure implicates.
    fn capture_diagnostics(&self, err: &BootstrapError, result: &mut BootstrapResult) {
        if !matches!(
            err,
            BootstrapError::Launch { .. } | BootstrapError::Readiness { .. }
        ) {
            return;
        }
        let mut services: Vec<String> = err
            .implicated_service()
            .map(str::to_string)
            .into_iter()
            .collect();
        for failed in &result.services_failed {
            if !services.contains(failed) {
                services.push(failed.clone());
            }
        }
        for service in services {
            let log_tail = match self.platform.logs(&service, self.config.log_tail_lines) {
                Ok(text) => text,
                Err(err) => format!("(could not fetch logs: {err:#})"),
            };
            result.diagnostics.push(Diagnostic { service, log_tail });
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
