use super::compose_platform;
use crate::cli::LogsArgs;
use crate::config::BootstrapConfig;
use crate::platform::Platform;
use crate::services::default_catalog;
use anyhow::{anyhow, Result};

pub fn run_logs(args: LogsArgs, config: &BootstrapConfig) -> Result<u8> {
    let names = default_catalog(config)?.names();
    if !names.contains(&args.service) {
        return Err(anyhow!(
            "unknown service {} (known: {})",
            args.service,
            names.join(", ")
        ));
    }
    let platform = compose_platform(config);
    platform.ensure_available()?;
    let tail = args.tail.unwrap_or(config.log_tail_lines);
    print!("{}", platform.logs(&args.service, tail)?);
    Ok(0)
}
