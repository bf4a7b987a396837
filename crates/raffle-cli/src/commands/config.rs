//! Config command - View and manage the raffle desk configuration
//!
//! Provides the `raffle config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), password redacted
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use raffle_core::config::Config;
use tracing::info;

use super::context::GlobalOptions;

const REDACTED: &str = "********";

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "raffle.page_size")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(options),
            ConfigCommand::Set { key, value } => self.execute_set(key, value, options),
            ConfigCommand::Validate => self.execute_validate(options),
        }
    }

    fn execute_show(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let config_path = options.config_path();
        let config = redacted(options.load_config()?);

        info!(config_path = %config_path.display(), "Showing configuration");

        if options.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(&self, key: &str, value: &str, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let config_path = options.config_path();
        // Environment overrides are not persisted
        let mut config = Config::load_or_default(&config_path);

        info!(key = %key, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if options.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {name:<28} - {help}"));
                }
            }
            anyhow::bail!("Configuration not changed");
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid value for '{}': {}", key, messages.join("; "));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&config_path, yaml).context("Failed to write configuration file")?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            let shown = if key == "bootstrap.password" {
                REDACTED
            } else {
                value
            };
            formatter.success(&format!("Set {} = {}", key, shown));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }

        Ok(())
    }

    fn execute_validate(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let config_path = options.config_path();

        let config = match Config::load(&config_path) {
            Ok(cfg) => cfg.with_env_overrides(),
            Err(e) if !config_path.exists() => {
                info!(error = %e, "No configuration file");
                if options.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": true,
                        "config_path": config_path.display().to_string(),
                        "errors": [],
                        "defaults": true,
                    }));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info("Using default configuration. Run 'raffle config set <key> <value>' to create one.");
                }
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to parse configuration {}", config_path.display())
                });
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if options.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Configuration is invalid")
        }
    }
}

const SUPPORTED_KEYS: [(&str, &str); 11] = [
    ("database.path", "SQLite database file"),
    ("database.max_connections", "Connection pool size"),
    ("database.busy_timeout_ms", "Wait for the write lock (ms)"),
    ("raffle.max_number", "Highest ticket number"),
    ("raffle.page_size", "Numbers per dashboard page"),
    ("raffle.audit_page_size", "Audit events per page"),
    ("raffle.recent_limit", "Rows in the admin recent lists"),
    ("bootstrap.username", "Initial superuser name"),
    ("bootstrap.password", "Initial superuser password"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.format", "pretty|json"),
];

fn redacted(mut config: Config) -> Config {
    if !config.bootstrap.password.is_empty() {
        config.bootstrap.password = REDACTED.to_string();
    }
    config
}

/// Apply a dot-notation key/value pair to a [`Config`]
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- database ---
        "database.path" => {
            config.database.path = PathBuf::from(value);
        }
        "database.max_connections" => {
            config.database.max_connections = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "database.busy_timeout_ms" => {
            config.database.busy_timeout_ms = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }

        // --- raffle ---
        "raffle.max_number" => {
            config.raffle.max_number = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "raffle.page_size" => {
            config.raffle.page_size = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "raffle.audit_page_size" => {
            config.raffle.audit_page_size = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "raffle.recent_limit" => {
            config.raffle.recent_limit = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }

        // --- bootstrap ---
        "bootstrap.username" => {
            config.bootstrap.username = value.to_string();
        }
        "bootstrap.password" => {
            config.bootstrap.password = value.to_string();
        }

        // --- logging ---
        "logging.level" => {
            config.logging.level = value.to_string();
        }
        "logging.format" => {
            config.logging.format = value.to_string();
        }

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_database_path() {
        let mut config = Config::default();
        apply_config_value(&mut config, "database.path", "/srv/raffle.db").unwrap();
        assert_eq!(config.database.path, PathBuf::from("/srv/raffle.db"));
    }

    #[test]
    fn test_apply_busy_timeout() {
        let mut config = Config::default();
        apply_config_value(&mut config, "database.busy_timeout_ms", "2500").unwrap();
        assert_eq!(config.database.busy_timeout_ms, 2500);
    }

    #[test]
    fn test_apply_raffle_limits() {
        let mut config = Config::default();
        apply_config_value(&mut config, "raffle.max_number", "5000").unwrap();
        apply_config_value(&mut config, "raffle.page_size", "250").unwrap();
        apply_config_value(&mut config, "raffle.audit_page_size", "20").unwrap();
        apply_config_value(&mut config, "raffle.recent_limit", "5").unwrap();
        assert_eq!(config.raffle.max_number, 5000);
        assert_eq!(config.raffle.page_size, 250);
        assert_eq!(config.raffle.audit_page_size, 20);
        assert_eq!(config.raffle.recent_limit, 5);
    }

    #[test]
    fn test_apply_bootstrap_credentials() {
        let mut config = Config::default();
        apply_config_value(&mut config, "bootstrap.username", "root").unwrap();
        apply_config_value(&mut config, "bootstrap.password", "hunter22").unwrap();
        assert_eq!(config.bootstrap.username, "root");
        assert_eq!(config.bootstrap.password, "hunter22");
    }

    #[test]
    fn test_apply_logging() {
        let mut config = Config::default();
        apply_config_value(&mut config, "logging.level", "debug").unwrap();
        apply_config_value(&mut config, "logging.format", "json").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.root", "/tmp").is_err());
    }

    #[test]
    fn test_apply_negative_number_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "raffle.page_size", "-5").is_err());
        assert!(apply_config_value(&mut config, "raffle.max_number", "many").is_err());
    }

    #[test]
    fn test_supported_keys_all_apply() {
        for (key, _) in SUPPORTED_KEYS {
            let mut config = Config::default();
            let value = if key.starts_with("logging.") || key.starts_with("bootstrap.") {
                "x"
            } else if key == "database.path" {
                "/tmp/raffle.db"
            } else {
                "7"
            };
            apply_config_value(&mut config, key, value).unwrap();
        }
    }

    #[test]
    fn test_show_redacts_password() {
        let mut config = Config::default();
        config.bootstrap.password = "secret".to_string();
        assert_eq!(redacted(config).bootstrap.password, REDACTED);
    }
}
