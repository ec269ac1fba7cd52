//! Service descriptors and the dependency graph they form.
use crate::checks::{ContainerRunning, HttpLiveness, PgIsReady};
use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::probe::ReadinessCheck;
use crate::provision::{AdminAccountCreation, BucketCreation, ProvisioningAction, SchemaInit};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const DATABASE_SERVICE: &str = "postgres";
pub const OBJECT_STORE_SERVICE: &str = "minio";
pub const WORKFLOW_WEBSERVER_SERVICE: &str = "airflow-webserver";
pub const WORKFLOW_SCHEDULER_SERVICE: &str = "airflow-scheduler";

/// Which bootstrap phase owns a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Database,
    ObjectStore,
    Workload,
}

/// Static declaration of one managed service.
pub struct ServiceDescriptor {
    pub name: String,
    pub role: ServiceRole,
    pub depends_on: Vec<String>,
    pub readiness: Box<dyn ReadinessCheck>,
    /// Run in order once the service is ready.
    pub actions: Vec<Box<dyn ProvisioningAction>>,
}

impl ServiceDescriptor {
    pub fn new(name: &str, role: ServiceRole, readiness: Box<dyn ReadinessCheck>) -> Self {
        Self {
            name: name.to_string(),
            role,
            depends_on: Vec::new(),
            readiness,
            actions: Vec::new(),
        }
    }

    pub fn depends_on(mut self, services: &[&str]) -> Self {
        self.depends_on = services.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn with_action(mut self, action: Box<dyn ProvisioningAction>) -> Self {
        self.actions.push(action);
        self
    }
}

/// Validated set of descriptors, kept in topological order.
pub struct Catalog {
    services: Vec<ServiceDescriptor>,
}

impl Catalog {
    /// Validate the dependency graph and order descriptors so that every
    /// service follows all of its dependencies. Ties break by name.
    pub fn new(services: Vec<ServiceDescriptor>) -> Result<Self, BootstrapError> {
        let mut by_name: BTreeMap<String, ServiceDescriptor> = BTreeMap::new();
        for service in services {
            if by_name.contains_key(&service.name) {
                return Err(BootstrapError::InvalidCatalog(format!(
                    "duplicate service {}",
                    service.name
                )));
            }
            by_name.insert(service.name.clone(), service);
        }
        let order = topological_order(&by_name)?;
        let services = order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();
        Ok(Self { services })
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn with_role(&self, role: ServiceRole) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.role == role)
    }

    /// `name` and everything it transitively depends on, in topological order.
    pub fn closure(&self, name: &str) -> Vec<String> {
        let mut needed = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            if !needed.insert(current.clone()) {
                continue;
            }
            if let Some(service) = self.get(&current) {
                stack.extend(service.depends_on.iter().cloned());
            }
        }
        self.services
            .iter()
            .filter(|s| needed.contains(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Partition `subset` into launch levels. A service lands one level after
    /// the deepest of its dependencies inside the subset; dependencies outside
    /// it are assumed to be running already.
    pub fn levels(&self, subset: &[String]) -> Vec<Vec<String>> {
        let wanted: BTreeSet<&str> = subset.iter().map(String::as_str).collect();
        let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        for service in self.services.iter().filter(|s| wanted.contains(s.name.as_str())) {
            let level = service
                .depends_on
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(service.name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(service.name.clone());
        }
        levels
    }
}

/// Kahn's algorithm with a sorted ready set.
fn topological_order(
    services: &BTreeMap<String, ServiceDescriptor>,
) -> Result<Vec<String>, BootstrapError> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, service) in services {
        indegree.entry(name.as_str()).or_insert(0);
        for dep in &service.depends_on {
            if !services.contains_key(dep) {
                return Err(BootstrapError::InvalidCatalog(format!(
                    "{name} depends on unknown service {dep}"
                )));
            }
            *indegree.entry(name.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(services.len());
    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() != services.len() {
        let stuck: Vec<&str> = indegree
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| *name)
            .collect();
        return Err(BootstrapError::InvalidCatalog(format!(
            "dependency cycle among {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// One readiness check per managed service.
pub struct ReadinessChecks {
    pub database: Box<dyn ReadinessCheck>,
    pub object_store: Box<dyn ReadinessCheck>,
    pub webserver: Box<dyn ReadinessCheck>,
    pub scheduler: Box<dyn ReadinessCheck>,
}

impl ReadinessChecks {
    pub fn for_config(config: &BootstrapConfig) -> Self {
        Self {
            database: Box::new(PgIsReady {
                service: DATABASE_SERVICE.to_string(),
                user: config.database.user.clone(),
                database: config.database.name.clone(),
            }),
            object_store: Box::new(HttpLiveness {
                url: format!("{}/minio/health/live", config.object_store.base_url()),
            }),
            webserver: Box::new(HttpLiveness {
                url: format!("{}/health", config.workflow.web_url),
            }),
            scheduler: Box::new(ContainerRunning {
                service: WORKFLOW_SCHEDULER_SERVICE.to_string(),
            }),
        }
    }
}

/// The database, object store and workflow engine the ingestion workload uses.
pub fn default_catalog(config: &BootstrapConfig) -> Result<Catalog, BootstrapError> {
    catalog_with_checks(config, ReadinessChecks::for_config(config))
}

pub fn catalog_with_checks(
    config: &BootstrapConfig,
    checks: ReadinessChecks,
) -> Result<Catalog, BootstrapError> {
    let database = ServiceDescriptor::new(DATABASE_SERVICE, ServiceRole::Database, checks.database)
        .with_action(Box::new(SchemaInit {
            connection_string: config.database.connection_string(),
        }))
        .with_action(Box::new(AdminAccountCreation {
            account: config.workflow.admin.clone(),
        }));

    let mut object_store = ServiceDescriptor::new(
        OBJECT_STORE_SERVICE,
        ServiceRole::ObjectStore,
        checks.object_store,
    );
    for bucket in &config.object_store.buckets {
        object_store = object_store.with_action(Box::new(BucketCreation {
            bucket: bucket.clone(),
        }));
    }

    let webserver = ServiceDescriptor::new(
        WORKFLOW_WEBSERVER_SERVICE,
        ServiceRole::Workload,
        checks.webserver,
    )
    .depends_on(&[DATABASE_SERVICE, OBJECT_STORE_SERVICE]);

    let scheduler = ServiceDescriptor::new(
        WORKFLOW_SCHEDULER_SERVICE,
        ServiceRole::Workload,
        checks.scheduler,
    )
    .depends_on(&[DATABASE_SERVICE]);

    Catalog::new(vec![database, object_store, webserver, scheduler])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCheck;
    use std::collections::BTreeMap;

    fn service(name: &str, deps: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor::new(
            name,
            ServiceRole::Workload,
            Box::new(ScriptedCheck::failing_then_ready(0)),
        )
        .depends_on(deps)
    }

    #[test]
    fn default_catalog_orders_dependencies_first() {
        let config = crate::config::resolve_from(&BTreeMap::new(), std::path::Path::new("/srv"));
        let catalog = default_catalog(&config).expect("default catalog is a DAG");
        assert_eq!(
            catalog.names(),
            vec!["minio", "postgres", "airflow-scheduler", "airflow-webserver"]
        );
        let database = catalog
            .with_role(ServiceRole::Database)
            .expect("database service");
        let actions: Vec<String> = database.actions.iter().map(|a| a.name()).collect();
        assert_eq!(actions, vec!["schema-init", "admin-user:admin"]);
        let store = catalog
            .get(OBJECT_STORE_SERVICE)
            .expect("object store service");
        assert_eq!(store.actions.len(), 2);
    }

    #[test]
    fn rejects_cycles_and_unknown_dependencies() {
        let cycle = Catalog::new(vec![service("a", &["b"]), service("b", &["a"])]);
        assert!(matches!(cycle, Err(BootstrapError::InvalidCatalog(msg)) if msg.contains("cycle")));

        let unknown = Catalog::new(vec![service("a", &["ghost"])]);
        assert!(
            matches!(unknown, Err(BootstrapError::InvalidCatalog(msg)) if msg.contains("ghost"))
        );

        let duplicate = Catalog::new(vec![service("a", &[]), service("a", &[])]);
        assert!(duplicate.is_err());
    }

    #[test]
    fn closure_and_levels_follow_the_graph() {
        let catalog = Catalog::new(vec![
            service("app", &["cache", "db"]),
            service("cache", &["db"]),
            service("db", &[]),
            service("worker", &["db"]),
        ])
        .expect("valid catalog");
        assert_eq!(catalog.closure("app"), vec!["db", "cache", "app"]);
        assert_eq!(catalog.closure("db"), vec!["db"]);

        let all = catalog.names();
        assert_eq!(
            catalog.levels(&all),
            vec![
                vec!["db".to_string()],
                vec!["cache".to_string(), "worker".to_string()],
                vec!["app".to_string()],
            ]
        );
        // db already running: remaining services start from level zero
        let remaining = vec!["app".to_string(), "cache".to_string(), "worker".to_string()];
        assert_eq!(
            catalog.levels(&remaining),
            vec![
                vec!["cache".to_string(), "worker".to_string()],
                vec!["app".to_string()],
            ]
        );
    }
}
