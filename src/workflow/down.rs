use super::compose_platform;
use crate::cli::DownArgs;
use crate::config::BootstrapConfig;
use crate::platform::Platform;
use anyhow::Result;

pub fn run_down(args: DownArgs, config: &BootstrapConfig) -> Result<u8> {
    let platform = compose_platform(config);
    platform.ensure_available()?;
    platform.down(args.volumes)?;
    tracing::info!(volumes = args.volumes, project = %config.project.name, "environment stopped");
    Ok(0)
}
