//! Typed failure kinds for a bootstrap run.
//!
//! Adapters report plumbing failures through `anyhow`; the orchestrator folds
//! them into one of these kinds so the exit code and diagnostics are decided
//! per kind.
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort the current bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Required platform tooling is absent.
    #[error("prerequisite missing: {tool} ({reason})")]
    PrerequisiteMissing { tool: String, reason: String },

    /// The service catalog is not a valid dependency graph.
    #[error("invalid service catalog: {0}")]
    InvalidCatalog(String),

    /// A mounted directory could not be created or opened up.
    #[error("filesystem setup failed for {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The platform refused to create or start a service.
    #[error("failed to launch {services}: {reason}")]
    Launch { services: String, reason: String },

    /// A service never passed its readiness check within budget.
    #[error("{service} did not become ready after {attempts} attempt(s): {reason}")]
    Readiness {
        service: String,
        attempts: u32,
        reason: String,
    },

    /// A provisioning action failed for a reason other than "already exists".
    #[error("provisioning action {action} failed: {reason}")]
    Provisioning { action: String, reason: String },

    /// The operator interrupted the run.
    #[error("interrupted by operator")]
    Interrupted,
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BootstrapError::PrerequisiteMissing { .. } => ErrorKind::PrerequisiteMissing,
            BootstrapError::InvalidCatalog(_) => ErrorKind::InvalidCatalog,
            BootstrapError::Filesystem { .. } => ErrorKind::Filesystem,
            BootstrapError::Launch { .. } => ErrorKind::Launch,
            BootstrapError::Readiness { .. } => ErrorKind::Readiness,
            BootstrapError::Provisioning { .. } => ErrorKind::Provisioning,
            BootstrapError::Interrupted => ErrorKind::Interrupted,
        }
    }

    /// Service whose recent logs explain this failure, if any.
    pub fn implicated_service(&self) -> Option<&str> {
        match self {
            BootstrapError::Readiness { service, .. } => Some(service.as_str()),
            BootstrapError::Launch { services, .. } => services.split(',').next().map(str::trim),
            _ => None,
        }
    }
}

/// Serializable discriminant of [`BootstrapError`], carried in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PrerequisiteMissing,
    InvalidCatalog,
    Filesystem,
    Launch,
    Readiness,
    Provisioning,
    Interrupted,
}

impl ErrorKind {
    /// Process exit code reported for a run aborted with this kind.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::PrerequisiteMissing | ErrorKind::InvalidCatalog => 2,
            ErrorKind::Filesystem => 3,
            ErrorKind::Launch => 4,
            ErrorKind::Readiness => 5,
            ErrorKind::Provisioning => 6,
            ErrorKind::Interrupted => 130,
        }
    }
}
