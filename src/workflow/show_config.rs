use crate::cli::ConfigArgs;
use crate::config::BootstrapConfig;
use anyhow::{Context, Result};

pub fn run_config(args: ConfigArgs, config: &BootstrapConfig) -> Result<u8> {
    let shown = if args.show_secrets {
        config.clone()
    } else {
        config.redacted()
    };
    let text = serde_json::to_string_pretty(&shown).context("serialize configuration")?;
    println!("{text}");
    Ok(0)
}
