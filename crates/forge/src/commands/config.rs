//! Configuration commands.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::{ConfigAction, ConfigCommand};
use crate::config::{CONFIG_ENV, LoadedConfig, user_config_path};

pub fn execute(cmd: ConfigCommand, loaded: &LoadedConfig) -> Result<()> {
    match cmd.action {
        ConfigAction::Show => {
            println!("# source: {}", loaded.source);
            print!("{}", loaded.config.to_toml_string().context("Failed to render config")?);
            Ok(())
        }
        ConfigAction::Validate => {
            loaded.config.validate()?;
            println!("{} {} is valid", "✓".green(), loaded.source);
            Ok(())
        }
        ConfigAction::Path => {
            let env = std::env::var(CONFIG_ENV).ok();
            println!("  {:<10} {}", CONFIG_ENV, env.as_deref().unwrap_or("(unset)").dimmed());
            match user_config_path() {
                Some(path) => {
                    let state = if path.exists() { "exists" } else { "absent" };
                    println!("  {:<10} {} ({})", "user", path.display(), state);
                }
                None => println!("  {:<10} {}", "user", "(no home directory)".dimmed()),
            }
            println!("  {:<10} {}", "active", loaded.source.to_string().cyan());
            Ok(())
        }
    }
}
