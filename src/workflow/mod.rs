//! Command handlers behind the CLI.
//!
//! Each handler takes the resolved configuration and returns the process
//! exit code; plumbing failures propagate as `anyhow` errors.
mod down;
mod logs;
mod show_config;
mod status;
mod up;

pub use down::run_down;
pub use logs::run_logs;
pub use show_config::run_config;
pub use status::run_status;
pub use up::run_up;

use crate::config::BootstrapConfig;
use crate::platform::ComposePlatform;

fn compose_platform(config: &BootstrapConfig) -> ComposePlatform {
    ComposePlatform::new(
        config.project.compose_command.clone(),
        config.project.compose_file.clone(),
        config.project.name.clone(),
        config.project.dir.clone(),
    )
    .with_timeouts(config.commands)
}
