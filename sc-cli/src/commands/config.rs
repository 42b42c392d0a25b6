//! Config commands.

use clap::Subcommand;
use console::style;

use sc_core::config::{AppConfig, ConfigHandle};
use sc_core::error::ScResult;

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the current configuration.
    Show,
    /// Print the configuration file path.
    Path,
    /// Set a value by key path and save.
    Set {
        /// Key path (e.g., "server.address", "socket.reconnect_attempts").
        key: String,
        /// New value.
        value: String,
    },
}

/// Copy of the config with the token masked.
fn redacted(cfg: &AppConfig) -> AppConfig {
    let mut cfg = cfg.clone();
    if !cfg.server.token.is_empty() {
        cfg.server.token = "********".into();
    }
    cfg
}

/// Run a config subcommand.
pub async fn run(config: ConfigHandle, action: ConfigAction, format: OutputFormat) -> ScResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = redacted(&*config.read().await);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
                OutputFormat::Text => {
                    let text = toml::to_string_pretty(&cfg)
                        .map_err(|e| sc_core::error::ScError::Config(e.to_string()))?;
                    println!("{text}");
                }
            }
        }
        ConfigAction::Path => {
            let path = config.path()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({"path": path})),
                OutputFormat::Text => println!("{}", path.display()),
            }
        }
        ConfigAction::Set { key, value } => {
            {
                let mut cfg = config.write().await;
                cfg.set_value(&key, &value)?;
                cfg.validate()?;
            }
            config.save().await?;
            let path = config.path()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"key": key, "saved": path}))
                }
                OutputFormat::Text => println!(
                    "  {} {key} updated in {}",
                    style("OK").green().bold(),
                    path.display()
                ),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_token() {
        let mut cfg = AppConfig::default();
        cfg.server.token = "secret".into();
        assert_eq!(redacted(&cfg).server.token, "********");
        assert_eq!(redacted(&AppConfig::default()).server.token, "");
    }
}
