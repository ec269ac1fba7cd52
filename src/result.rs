//! Outcome record of one bootstrap run.
use crate::error::{BootstrapError, ErrorKind};
use crate::orchestrator::Phase;
use crate::provision::ActionStatus;
use crate::volumes::DirectoryReport;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    /// The run has not finished yet.
    Pending,
    Done,
    Aborted {
        phase: Phase,
        kind: ErrorKind,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub name: String,
    pub service: String,
    pub result: ActionStatus,
}

/// Recent platform logs of a service implicated in a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub service: String,
    pub log_tail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapResult {
    pub services_started: Vec<String>,
    pub services_failed: Vec<String>,
    pub actions: Vec<ActionRecord>,
    pub phases_completed: Vec<Phase>,
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
    pub directories: DirectoryReport,
}

impl Default for BootstrapResult {
    fn default() -> Self {
        Self {
            services_started: Vec::new(),
            services_failed: Vec::new(),
            actions: Vec::new(),
            phases_completed: Vec::new(),
            outcome: Outcome::Pending,
            diagnostics: Vec::new(),
            directories: DirectoryReport::default(),
        }
    }
}

impl BootstrapResult {
    /// Result of a run that failed before orchestration could begin.
    pub fn aborted(phase: Phase, err: &BootstrapError) -> Self {
        let mut result = Self::default();
        result.abort(phase, err);
        result
    }

    pub fn abort(&mut self, phase: Phase, err: &BootstrapError) {
        self.outcome = Outcome::Aborted {
            phase,
            kind: err.kind(),
            reason: err.to_string(),
        };
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Done
    }

    pub fn actions_applied(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions
            .iter()
            .filter(|record| record.result == ActionStatus::Applied)
    }

    pub fn actions_skipped(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions
            .iter()
            .filter(|record| record.result == ActionStatus::Skipped)
    }

    pub fn exit_code(&self) -> u8 {
        match &self.outcome {
            Outcome::Done => 0,
            Outcome::Aborted { kind, .. } => kind.exit_code(),
            Outcome::Pending => 1,
        }
    }
}
