//! `envboot up`: the full bootstrap.
use super::compose_platform;
use crate::admin::{ComposeObjectStoreAdmin, ComposeWorkflowAdmin};
use crate::cli::UpArgs;
use crate::config::BootstrapConfig;
use crate::orchestrator::{Orchestrator, Phase};
use crate::probe::ThreadSleeper;
use crate::provision::ProvisionContext;
use crate::result::BootstrapResult;
use crate::services::default_catalog;
use crate::signal::{self, CancelToken};
use crate::summary::render_summary;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn run_up(args: UpArgs, config: &BootstrapConfig) -> Result<u8> {
    for warning in &config.warnings {
        tracing::warn!(%warning, "configuration override ignored");
    }
    signal::install_handlers();
    let cancel = CancelToken::from_signals();
    let platform = compose_platform(config);

    let result = match default_catalog(config) {
        Ok(catalog) => {
            let workflow = ComposeWorkflowAdmin::new(&platform, config);
            let object_store = ComposeObjectStoreAdmin::new(&platform, config);
            Orchestrator {
                config,
                platform: &platform,
                catalog: &catalog,
                provision: ProvisionContext {
                    workflow: &workflow,
                    object_store: &object_store,
                },
                sleeper: &ThreadSleeper,
                cancel,
            }
            .run()
        }
        Err(err) => {
            tracing::error!(error = %err, "service catalog rejected");
            BootstrapResult::aborted(Phase::Init, &err)
        }
    };

    if let Some(path) = &args.report {
        write_report(path, &result)?;
        tracing::info!(path = %path.display(), "wrote bootstrap report");
    }
    if args.json {
        let text = serde_json::to_string_pretty(&result).context("serialize bootstrap result")?;
        println!("{text}");
    } else {
        print!("{}", render_summary(&result, config));
    }
    Ok(result.exit_code())
}

fn write_report(path: &Path, result: &BootstrapResult) -> Result<()> {
    let mut text = serde_json::to_string_pretty(result).context("serialize bootstrap result")?;
    text.push('\n');
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}
