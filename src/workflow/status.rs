//! `envboot status`: platform view of every catalog service.
use super::compose_platform;
use crate::cli::StatusArgs;
use crate::config::BootstrapConfig;
use crate::platform::{Platform, ServiceHealth};
use crate::services::default_catalog;
use anyhow::{Context, Result};

pub fn run_status(args: StatusArgs, config: &BootstrapConfig) -> Result<u8> {
    let platform = compose_platform(config);
    platform.ensure_available()?;
    let names = default_catalog(config)?.names();
    let reported = platform.status(&names)?;
    let rows = status_rows(&names, &reported);
    if args.json {
        let text = serde_json::to_string_pretty(&rows).context("serialize service status")?;
        println!("{text}");
    } else {
        print!("{}", render_status(&rows));
    }
    Ok(if rows.iter().all(ServiceHealth::is_healthy) {
        0
    } else {
        1
    })
}

/// One row per catalog service; services without a container are reported
/// as `missing`.
fn status_rows(names: &[String], reported: &[ServiceHealth]) -> Vec<ServiceHealth> {
    names
        .iter()
        .map(|name| {
            reported
                .iter()
                .find(|health| health.service == *name)
                .cloned()
                .unwrap_or_else(|| ServiceHealth {
                    service: name.clone(),
                    state: "missing".to_string(),
                    health: None,
                })
        })
        .collect()
}

fn render_status(rows: &[ServiceHealth]) -> String {
    let mut out = String::new();
    for row in rows {
        let line = format!(
            "{:<20} {:<10} {}",
            row.service,
            row.state,
            row.health.as_deref().unwrap_or("-")
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_without_containers_are_missing() {
        let names = vec!["postgres".to_string(), "minio".to_string()];
        let reported = vec![ServiceHealth {
            service: "postgres".to_string(),
            state: "running".to_string(),
            health: Some("healthy".to_string()),
        }];
        let rows = status_rows(&names, &reported);
        assert_eq!(rows[1].state, "missing");
        assert_eq!(
            render_status(&rows),
            "postgres             running    healthy\nminio                missing    -\n"
        );
    }
}
