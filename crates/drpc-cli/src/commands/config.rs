//! Print or check configuration.

use anyhow::{Context, Result};
use colored::Colorize;
use drpc::core::DrpcConfig;

pub fn run(config: &DrpcConfig, loaded: bool) -> Result<()> {
    if loaded {
        // Loading already validated it.
        println!("{} configuration is valid", "✓".green());
        println!("  registry root:     {}", config.registry.root);
        println!("  call timeout:      {}ms", config.invocation.timeout_ms);
        println!("  max pending calls: {}", config.invocation.max_pending_calls);
        return Ok(());
    }

    let toml = DrpcConfig::default_toml().context("Failed to render default config")?;
    print!("{}", toml);
    Ok(())
}
