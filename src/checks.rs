//! Concrete readiness checks for the managed services.
use crate::platform::Platform;
use crate::probe::ReadinessCheck;
use anyhow::{anyhow, Context, Result};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection-level database ping via `pg_isready` inside the container.
pub struct PgIsReady {
    pub service: String,
    pub user: String,
    pub database: String,
}

impl ReadinessCheck for PgIsReady {
    fn describe(&self) -> String {
        format!("pg_isready in {}", self.service)
    }

    fn check(&self, platform: &dyn Platform) -> Result<()> {
        let argv = vec![
            "pg_isready".to_string(),
            "-U".to_string(),
            self.user.clone(),
            "-d".to_string(),
            self.database.clone(),
        ];
        let output = platform
            .exec(&self.service, &[], &argv)
            .context("run pg_isready")?;
        if !output.success() {
            return Err(anyhow!("pg_isready: {}", output.failure_detail()));
        }
        Ok(())
    }
}

/// Liveness endpoint that answers 2xx once the service accepts requests.
pub struct HttpLiveness {
    pub url: String,
}

impl ReadinessCheck for HttpLiveness {
    fn describe(&self) -> String {
        format!("GET {}", self.url)
    }

    fn check(&self, _platform: &dyn Platform) -> Result<()> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build();
        let agent: ureq::Agent = config.into();
        let response = agent
            .get(&self.url)
            .call()
            .with_context(|| format!("GET {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", self.url, status));
        }
        Ok(())
    }
}

/// Platform reports the service running and not failing its own healthcheck.
pub struct ContainerRunning {
    pub service: String,
}

impl ReadinessCheck for ContainerRunning {
    fn describe(&self) -> String {
        format!("{} running", self.service)
    }

    fn check(&self, platform: &dyn Platform) -> Result<()> {
        let statuses = platform.status(std::slice::from_ref(&self.service))?;
        let health = statuses
            .iter()
            .find(|status| status.service == self.service)
            .ok_or_else(|| anyhow!("{} has no container", self.service))?;
        if !health.is_healthy() {
            return Err(anyhow!(
                "{} is {}{}",
                self.service,
                health.state,
                health
                    .health
                    .as_deref()
                    .map(|h| format!(" ({h})"))
                    .unwrap_or_default()
            ));
        }
        Ok(())
    }
}
