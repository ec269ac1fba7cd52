//! Administrative protocols of the workflow engine and the object store.
//!
//! Both are consumed as capabilities; the compose-backed implementations run
//! the engines' own CLIs through the platform. The object-store CLI runs
//! inside the object-store container, so its endpoint is always the
//! container-local address and no network discovery is needed.
use crate::config::{AdminAccount, BootstrapConfig};
use crate::platform::{extract_json, CommandOutput, Platform};
use crate::services::{DATABASE_SERVICE, OBJECT_STORE_SERVICE, WORKFLOW_WEBSERVER_SERVICE};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::cell::Cell;
use std::sync::OnceLock;

/// Result of a create call that tolerates a concurrent or earlier creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

pub trait WorkflowAdmin {
    /// Whether the metadata store already holds the engine's tables.
    fn schema_initialized(&self) -> Result<bool>;

    fn init_schema(&self, connection_string: &str) -> Result<()>;

    fn user_exists(&self, username: &str) -> Result<bool>;

    fn create_user(&self, account: &AdminAccount) -> Result<CreateOutcome>;
}

pub trait ObjectStoreAdmin {
    /// Register the CLI alias for the object-store endpoint.
    fn register_alias(&self) -> Result<()>;

    fn list_buckets(&self) -> Result<Vec<String>>;

    fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome>;
}

fn already_exists_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)already\s+(exists?|own)").expect("valid already-exists pattern")
    })
}

/// True when tool output reports that the target already exists.
pub fn reports_already_exists(output: &CommandOutput) -> bool {
    already_exists_pattern().is_match(&output.combined())
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Workflow engine administered through its CLI in one-off containers.
pub struct ComposeWorkflowAdmin<'a> {
    platform: &'a dyn Platform,
    database_user: String,
    database_name: String,
    connection_string: String,
}

impl<'a> ComposeWorkflowAdmin<'a> {
    pub fn new(platform: &'a dyn Platform, config: &BootstrapConfig) -> Self {
        Self {
            platform,
            database_user: config.database.user.clone(),
            database_name: config.database.name.clone(),
            connection_string: config.database.connection_string(),
        }
    }

    fn engine_env(&self, connection_string: &str) -> Vec<(String, String)> {
        vec![(
            "AIRFLOW__DATABASE__SQL_ALCHEMY_CONN".to_string(),
            connection_string.to_string(),
        )]
    }

    fn run_engine(&self, parts: &[&str]) -> Result<CommandOutput> {
        self.platform
            .run_once(
                WORKFLOW_WEBSERVER_SERVICE,
                &self.engine_env(&self.connection_string),
                &argv(parts),
            )
            .with_context(|| format!("run {}", parts[..parts.len().min(3)].join(" ")))
    }
}

impl WorkflowAdmin for ComposeWorkflowAdmin<'_> {
    fn schema_initialized(&self) -> Result<bool> {
        let query = "SELECT to_regclass('public.alembic_version') IS NOT NULL";
        let output = self
            .platform
            .exec(
                DATABASE_SERVICE,
                &[],
                &argv(&[
                    "psql",
                    "-U",
                    &self.database_user,
                    "-d",
                    &self.database_name,
                    "-tAc",
                    query,
                ]),
            )
            .context("query metadata schema")?;
        if !output.success() {
            return Err(anyhow!("schema query failed: {}", output.failure_detail()));
        }
        Ok(output.stdout.trim() == "t")
    }

    fn init_schema(&self, connection_string: &str) -> Result<()> {
        let output = self
            .platform
            .run_once(
                WORKFLOW_WEBSERVER_SERVICE,
                &self.engine_env(connection_string),
                &argv(&["airflow", "db", "migrate"]),
            )
            .context("run airflow db migrate")?;
        if !output.success() {
            return Err(anyhow!("airflow db migrate: {}", output.failure_detail()));
        }
        Ok(())
    }

    fn user_exists(&self, username: &str) -> Result<bool> {
        let output = self.run_engine(&["airflow", "users", "list", "--output", "json"])?;
        if !output.success() {
            return Err(anyhow!("airflow users list: {}", output.failure_detail()));
        }
        let users = extract_json(&output.stdout, '[')
            .ok_or_else(|| anyhow!("airflow users list returned no JSON"))?;
        let users = users
            .as_array()
            .ok_or_else(|| anyhow!("airflow users list JSON is not an array"))?;
        Ok(users
            .iter()
            .any(|user| user.get("username").and_then(|value| value.as_str()) == Some(username)))
    }

    fn create_user(&self, account: &AdminAccount) -> Result<CreateOutcome> {
        let output = self.run_engine(&[
            "airflow",
            "users",
            "create",
            "--username",
            &account.username,
            "--password",
            &account.password,
            "--role",
            &account.role,
            "--email",
            &account.email,
            "--firstname",
            &account.first_name,
            "--lastname",
            &account.last_name,
        ])?;
        // The engine prints "already exist" and may still exit 0.
        if reports_already_exists(&output) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        if !output.success() {
            return Err(anyhow!("airflow users create: {}", output.failure_detail()));
        }
        Ok(CreateOutcome::Created)
    }
}

const ALIAS_ACCESS_KEY_VAR: &str = "ENVBOOT_MC_ACCESS_KEY";
const ALIAS_SECRET_KEY_VAR: &str = "ENVBOOT_MC_SECRET_KEY";

/// Object store administered with `mc` inside its own container.
pub struct ComposeObjectStoreAdmin<'a> {
    platform: &'a dyn Platform,
    alias: String,
    access_key: String,
    secret_key: String,
    alias_registered: Cell<bool>,
}

impl<'a> ComposeObjectStoreAdmin<'a> {
    const LOCAL_ENDPOINT: &'static str = "http://localhost:9000";

    pub fn new(platform: &'a dyn Platform, config: &BootstrapConfig) -> Self {
        Self {
            platform,
            alias: "local".to_string(),
            access_key: config.object_store.access_key.clone(),
            secret_key: config.object_store.secret_key.clone(),
            alias_registered: Cell::new(false),
        }
    }

    fn mc(&self, parts: &[&str]) -> Result<CommandOutput> {
        let mut full = vec!["mc"];
        full.extend_from_slice(parts);
        self.platform
            .exec(OBJECT_STORE_SERVICE, &[], &argv(&full))
            .with_context(|| format!("run {}", full.join(" ")))
    }

    fn ensure_alias(&self) -> Result<()> {
        if !self.alias_registered.get() {
            self.register_alias()?;
        }
        Ok(())
    }
}

impl ObjectStoreAdmin for ComposeObjectStoreAdmin<'_> {
    fn register_alias(&self) -> Result<()> {
        // Keys travel as environment so they never appear on a command line.
        let env = vec![
            (ALIAS_ACCESS_KEY_VAR.to_string(), self.access_key.clone()),
            (ALIAS_SECRET_KEY_VAR.to_string(), self.secret_key.clone()),
        ];
        let script = format!(
            "mc alias set \"$0\" \"$1\" \"${ALIAS_ACCESS_KEY_VAR}\" \"${ALIAS_SECRET_KEY_VAR}\""
        );
        let output = self
            .platform
            .exec(
                OBJECT_STORE_SERVICE,
                &env,
                &argv(&["sh", "-c", &script, &self.alias, Self::LOCAL_ENDPOINT]),
            )
            .context("run mc alias set")?;
        if !output.success() {
            return Err(anyhow!("mc alias set: {}", output.failure_detail()));
        }
        self.alias_registered.set(true);
        Ok(())
    }

    fn list_buckets(&self) -> Result<Vec<String>> {
        self.ensure_alias()?;
        let output = self.mc(&["ls", "--json", &self.alias])?;
        if !output.success() {
            return Err(anyhow!("mc ls: {}", output.failure_detail()));
        }
        parse_bucket_listing(&output.stdout)
    }

    fn create_bucket(&self, bucket: &str) -> Result<CreateOutcome> {
        self.ensure_alias()?;
        let target = format!("{}/{}", self.alias, bucket);
        let output = self.mc(&["mb", &target])?;
        if output.success() {
            return Ok(CreateOutcome::Created);
        }
        if reports_already_exists(&output) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(anyhow!("mc mb {target}: {}", output.failure_detail()))
    }
}

/// Bucket names from `mc ls --json`, one JSON object per line.
pub fn parse_bucket_listing(stdout: &str) -> Result<Vec<String>> {
    let mut buckets = Vec::new();
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let entry: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("parse mc ls line {line:?}"))?;
        if let Some(key) = entry.get("key").and_then(|value| value.as_str()) {
            buckets.push(key.trim_end_matches('/').to_string());
        }
    }
    Ok(buckets)
}
