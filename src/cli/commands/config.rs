//! Config command - show or initialize configuration

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::GateResult;
use console::style;

/// Handle `config show|path|init`.
pub async fn config(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> GateResult<()> {
    match args.action {
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config)?;
            print!("{text}");
        }
        ConfigAction::Path => {
            println!("{}", manager.path().display());
        }
        ConfigAction::Init => {
            if manager.path().exists() {
                println!(
                    "{} config already exists at {}",
                    style("Skipped:").yellow(),
                    manager.path().display()
                );
            } else {
                manager.save(&Config::default()).await?;
                println!("Wrote default config to {}", manager.path().display());
            }
        }
    }
    Ok(())
}
