//! Environment resolution for a bootstrap run.
//!
//! Every setting has a compiled-in default. A `.env` file in the project
//! directory overrides defaults, and the process environment overrides both.
//! Resolution never fails: malformed overrides fall back to the default and
//! are recorded as warnings.
use crate::env_file::load_env_file;
use crate::platform::CommandTimeouts;
use crate::probe::ProbePolicy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";
pub const DEFAULT_COMPOSE_COMMAND: &str = "docker compose";
pub const DEFAULT_BUCKETS: &str = "raw,processed";
pub const DEFAULT_LOG_TAIL_LINES: usize = 50;
const REDACTED: &str = "********";

/// Immutable settings shared by every component of a run.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapConfig {
    pub project: ProjectSettings,
    pub database: DatabaseSettings,
    pub workflow: WorkflowSettings,
    pub object_store: ObjectStoreSettings,
    pub volumes: VolumeSettings,
    pub probe: ProbePolicy,
    pub commands: CommandTimeouts,
    pub log_tail_lines: usize,
    /// Overrides that were present but unusable.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSettings {
    pub dir: PathBuf,
    pub name: String,
    pub compose_file: PathBuf,
    pub compose_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl DatabaseSettings {
    /// SQLAlchemy connection string handed to the workflow engine, with the
    /// user and password percent-encoded.
    pub fn connection_string(&self) -> String {
        let base = format!(
            "postgresql+psycopg2://{}:{}/{}",
            self.host, self.port, self.name
        );
        let Ok(mut url) = Url::parse(&base) else {
            return format!(
                "postgresql+psycopg2://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.name
            );
        };
        // Only fails for URLs without a host, which `base` always has.
        let _ = url.set_username(&self.user);
        let _ = url.set_password(Some(&self.password));
        url.into()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSettings {
    pub web_url: String,
    pub admin: AdminAccount,
}

/// Administrative account created in the workflow engine.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AdminAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectStoreSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub secure: bool,
    pub console_url: String,
    pub buckets: Vec<String>,
}

impl ObjectStoreSettings {
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}

/// Host directories mounted into the services.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeSettings {
    pub dags: PathBuf,
    pub logs: PathBuf,
    pub plugins: PathBuf,
    pub data: PathBuf,
    pub object_store_data: PathBuf,
    pub database_data: PathBuf,
}

impl VolumeSettings {
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![
            self.dags.clone(),
            self.logs.clone(),
            self.plugins.clone(),
            self.data.clone(),
            self.object_store_data.clone(),
            self.database_data.clone(),
        ]
    }
}

impl BootstrapConfig {
    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> BootstrapConfig {
        let mut config = self.clone();
        config.database.password = REDACTED.to_string();
        config.workflow.admin.password = REDACTED.to_string();
        config.object_store.secret_key = REDACTED.to_string();
        config
    }
}

/// Resolve the configuration from the process environment.
pub fn resolve() -> BootstrapConfig {
    let process: BTreeMap<String, String> = std::env::vars().collect();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(&process, &cwd)
}

/// Resolve against an explicit variable set and working directory.
pub fn resolve_from(process: &BTreeMap<String, String>, cwd: &Path) -> BootstrapConfig {
    let project_dir = process
        .get("ENVBOOT_PROJECT_DIR")
        .map(|value| expand_home(value))
        .map(|dir| if dir.is_absolute() { dir } else { cwd.join(dir) })
        .unwrap_or_else(|| cwd.to_path_buf());
    let (file_vars, file_warning) = match load_env_file(&project_dir.join(".env")) {
        Ok(vars) => (vars, None),
        Err(err) => (BTreeMap::new(), Some(format!("ignoring .env: {err:#}"))),
    };
    let mut env = Layered {
        process,
        file: file_vars,
        warnings: file_warning.into_iter().collect(),
    };

    let project_name = env.string("ENVBOOT_PROJECT_NAME", &default_project_name(&project_dir));
    let compose_file = project_dir.join(env.path("ENVBOOT_COMPOSE_FILE", DEFAULT_COMPOSE_FILE));
    let compose_command = env.words("ENVBOOT_COMPOSE_COMMAND", DEFAULT_COMPOSE_COMMAND);

    let database = DatabaseSettings {
        host: env.string("POSTGRES_HOST", "postgres"),
        port: env.parsed("POSTGRES_PORT", 5432),
        user: env.string("POSTGRES_USER", "airflow"),
        password: env.string("POSTGRES_PASSWORD", "airflow"),
        name: env.string("POSTGRES_DB", "airflow"),
    };

    let workflow = WorkflowSettings {
        web_url: trim_trailing_slash(env.string("AIRFLOW_WEB_URL", "http://localhost:8080")),
        admin: AdminAccount {
            username: env.string("AIRFLOW_ADMIN_USER", "admin"),
            password: env.string("AIRFLOW_ADMIN_PASSWORD", "admin"),
            email: env.string("AIRFLOW_ADMIN_EMAIL", "admin@example.com"),
            first_name: env.string("AIRFLOW_ADMIN_FIRSTNAME", "Admin"),
            last_name: env.string("AIRFLOW_ADMIN_LASTNAME", "User"),
            role: "Admin".to_string(),
        },
    };

    let object_store = ObjectStoreSettings {
        endpoint: env.string("MINIO_ENDPOINT", "localhost:9000"),
        access_key: env.string("MINIO_ACCESS_KEY", "minioadmin"),
        secret_key: env.string("MINIO_SECRET_KEY", "minioadmin"),
        secure: env.flag("MINIO_SECURE", false),
        console_url: trim_trailing_slash(env.string("MINIO_CONSOLE_URL", "http://localhost:9001")),
        buckets: env.list("MINIO_BUCKETS", DEFAULT_BUCKETS),
    };

    let data = project_dir.join(env.path("ENVBOOT_DATA_DIR", "data"));
    let volumes = VolumeSettings {
        dags: project_dir.join("dags"),
        logs: project_dir.join("logs"),
        plugins: project_dir.join("plugins"),
        object_store_data: data.join("minio"),
        database_data: data.join("postgres"),
        data,
    };

    let defaults = ProbePolicy::default();
    let probe = ProbePolicy {
        initial_delay_secs: env.parsed(
            "ENVBOOT_PROBE_INITIAL_DELAY_SECS",
            defaults.initial_delay_secs,
        ),
        retry_delay_secs: env.parsed("ENVBOOT_PROBE_RETRY_DELAY_SECS", defaults.retry_delay_secs),
        max_attempts: env.parsed("ENVBOOT_PROBE_MAX_ATTEMPTS", defaults.max_attempts),
    };
    let probe = if probe.max_attempts == 0 {
        env.warnings
            .push("ENVBOOT_PROBE_MAX_ATTEMPTS must be at least 1; using 1".to_string());
        ProbePolicy {
            max_attempts: 1,
            ..probe
        }
    } else {
        probe
    };

    let command_defaults = CommandTimeouts::default();
    let commands = CommandTimeouts {
        query_secs: env.parsed("ENVBOOT_QUERY_TIMEOUT_SECS", command_defaults.query_secs),
        lifecycle_secs: env.parsed(
            "ENVBOOT_LIFECYCLE_TIMEOUT_SECS",
            command_defaults.lifecycle_secs,
        ),
    };

    let log_tail_lines = env.parsed("ENVBOOT_LOG_TAIL_LINES", DEFAULT_LOG_TAIL_LINES);

    BootstrapConfig {
        project: ProjectSettings {
            dir: project_dir,
            name: project_name,
            compose_file,
            compose_command,
        },
        database,
        workflow,
        object_store,
        volumes,
        probe,
        commands,
        log_tail_lines,
        warnings: env.warnings,
    }
}

/// Process environment layered over `.env` values.
struct Layered<'a> {
    process: &'a BTreeMap<String, String>,
    file: BTreeMap<String, String>,
    warnings: Vec<String>,
}

impl Layered<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.process
            .get(key)
            .or_else(|| self.file.get(key))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or(default).to_string()
    }

    fn path(&self, key: &str, default: &str) -> PathBuf {
        self.lookup(key)
            .map(expand_home)
            .unwrap_or_else(|| PathBuf::from(default))
    }

    fn parsed<T: std::str::FromStr>(&mut self, key: &str, default: T) -> T {
        let Some(raw) = self.lookup(key) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                let warning = format!("{key}={raw:?} is not a valid value; using default");
                self.warnings.push(warning);
                default
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        let Some(raw) = self.lookup(key) else {
            return default;
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                let warning = format!("{key}={raw:?} is not a boolean; using default");
                self.warnings.push(warning);
                default
            }
        }
    }

    fn list(&self, key: &str, default: &str) -> Vec<String> {
        self.lookup(key)
            .unwrap_or(default)
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn words(&mut self, key: &str, default: &str) -> Vec<String> {
        let default_words = || default.split_whitespace().map(str::to_string).collect();
        let Some(raw) = self.lookup(key) else {
            return default_words();
        };
        match shell_words::split(raw) {
            Ok(words) if !words.is_empty() => words,
            _ => {
                let warning = format!("{key}={raw:?} is not a usable command; using default");
                self.warnings.push(warning);
                default_words()
            }
        }
    }
}

fn default_project_name(project_dir: &Path) -> String {
    project_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "envboot".to_string())
}

fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

fn trim_trailing_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
