//! Idempotent one-time provisioning actions.
//!
//! Every action pairs a precondition against observable state with an apply
//! step. A satisfied precondition, or an apply that finds the target already
//! present, is reported as `Skipped`; re-running after a partial failure is
//! always safe.
use crate::admin::{CreateOutcome, ObjectStoreAdmin, WorkflowAdmin};
use crate::config::AdminAccount;
use serde::Serialize;

/// Administrative capabilities available to provisioning actions.
#[derive(Clone, Copy)]
pub struct ProvisionContext<'a> {
    pub workflow: &'a dyn WorkflowAdmin,
    pub object_store: &'a dyn ObjectStoreAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Applied,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    AlreadySatisfied,
}

impl From<CreateOutcome> for ApplyOutcome {
    fn from(outcome: CreateOutcome) -> Self {
        match outcome {
            CreateOutcome::Created => ApplyOutcome::Applied,
            CreateOutcome::AlreadyExists => ApplyOutcome::AlreadySatisfied,
        }
    }
}

pub trait ProvisioningAction: Send + Sync {
    fn name(&self) -> String;

    /// Whether the desired state already holds.
    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<bool>;

    fn apply(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<ApplyOutcome>;
}

/// Check the precondition, apply if needed, and classify the result.
pub fn run_action(action: &dyn ProvisioningAction, ctx: &ProvisionContext<'_>) -> ActionStatus {
    let name = action.name();
    match action.is_satisfied(ctx) {
        Ok(true) => {
            tracing::info!(action = %name, "already satisfied");
            return ActionStatus::Skipped;
        }
        Ok(false) => {}
        Err(err) => {
            let reason = format!("precondition check failed: {err:#}");
            tracing::error!(action = %name, %reason, "provisioning failed");
            return ActionStatus::Failed(reason);
        }
    }
    match action.apply(ctx) {
        Ok(ApplyOutcome::Applied) => {
            tracing::info!(action = %name, "applied");
            ActionStatus::Applied
        }
        Ok(ApplyOutcome::AlreadySatisfied) => {
            tracing::info!(action = %name, "satisfied concurrently");
            ActionStatus::Skipped
        }
        Err(err) => {
            let reason = format!("{err:#}");
            tracing::error!(action = %name, %reason, "provisioning failed");
            ActionStatus::Failed(reason)
        }
    }
}

/// Initialize the workflow engine's metadata schema.
pub struct SchemaInit {
    pub connection_string: String,
}

impl ProvisioningAction for SchemaInit {
    fn name(&self) -> String {
        "schema-init".to_string()
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<bool> {
        ctx.workflow.schema_initialized()
    }

    fn apply(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<ApplyOutcome> {
        ctx.workflow.init_schema(&self.connection_string)?;
        Ok(ApplyOutcome::Applied)
    }
}

/// Create the workflow engine's administrative account.
pub struct AdminAccountCreation {
    pub account: AdminAccount,
}

impl ProvisioningAction for AdminAccountCreation {
    fn name(&self) -> String {
        format!("admin-user:{}", self.account.username)
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<bool> {
        ctx.workflow.user_exists(&self.account.username)
    }

    fn apply(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<ApplyOutcome> {
        Ok(ctx.workflow.create_user(&self.account)?.into())
    }
}

/// Create one object-store bucket.
pub struct BucketCreation {
    pub bucket: String,
}

impl ProvisioningAction for BucketCreation {
    fn name(&self) -> String {
        format!("bucket:{}", self.bucket)
    }

    fn is_satisfied(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<bool> {
        Ok(ctx
            .object_store
            .list_buckets()?
            .iter()
            .any(|bucket| bucket == &self.bucket))
    }

    fn apply(&self, ctx: &ProvisionContext<'_>) -> anyhow::Result<ApplyOutcome> {
        Ok(ctx.object_store.create_bucket(&self.bucket)?.into())
    }
}
