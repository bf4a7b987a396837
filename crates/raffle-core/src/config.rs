//! Configuration module for the raffle desk.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the raffle desk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub raffle: RaffleConfig,
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
}

/// SQLite storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Milliseconds a transaction waits for the write lock before failing.
    pub busy_timeout_ms: u64,
}

/// Ticket pool and listing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaffleConfig {
    /// Highest ticket number; numbers run from 1 to this value.
    pub max_number: u32,
    /// Numbers per page in the seller's range listing.
    pub page_size: u32,
    /// Events per page in the audit log.
    pub audit_page_size: u32,
    /// Entries in the "recent sales" and "recent activity" panels.
    pub recent_limit: u32,
}

/// Credentials for the superuser created on first start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub username: String,
    pub password: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

/// Environment variable overriding `bootstrap.username`.
pub const ENV_SUPERUSER_USERNAME: &str = "RAFFLE_SUPERUSER_USERNAME";
/// Environment variable overriding `bootstrap.password`.
pub const ENV_SUPERUSER_PASSWORD: &str = "RAFFLE_SUPERUSER_PASSWORD";

/// Minimum password length for every account, bootstrap included.
pub const MIN_PASSWORD_LEN: usize = 6;

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/raffle/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("raffle")
            .join("config.yaml")
    }

    /// Apply the `RAFFLE_SUPERUSER_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply bootstrap overrides from an arbitrary lookup.
    ///
    /// Empty values are ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(username) = non_empty(ENV_SUPERUSER_USERNAME) {
            self.bootstrap.username = username;
        }
        if let Some(password) = non_empty(ENV_SUPERUSER_PASSWORD) {
            self.bootstrap.password = password;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for DatabaseConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("raffle");
        Self {
            path: data_dir.join("raffle.db"),
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            max_number: 100_000,
            page_size: 500,
            audit_page_size: 100,
            recent_limit: 20,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "changeme".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"raffle.max_number"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- database ---
        positive(
            "database.max_connections",
            u64::from(self.database.max_connections),
        );
        positive("database.busy_timeout_ms", self.database.busy_timeout_ms);

        // --- raffle ---
        positive("raffle.max_number", u64::from(self.raffle.max_number));
        positive("raffle.page_size", u64::from(self.raffle.page_size));
        positive(
            "raffle.audit_page_size",
            u64::from(self.raffle.audit_page_size),
        );
        positive("raffle.recent_limit", u64::from(self.raffle.recent_limit));

        // --- bootstrap ---
        if self.bootstrap.username.trim().is_empty() {
            errors.push(ValidationError {
                field: "bootstrap.username".into(),
                message: "must not be empty".into(),
            });
        }
        if self.bootstrap.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(ValidationError {
                field: "bootstrap.password".into(),
                message: format!("must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use raffle_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .max_number(500)
///     .logging_level("debug")
///     .build();
/// assert_eq!(config.raffle.max_number, 500);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- database ---

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database.path = path.into();
        self
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.config.database.max_connections = n;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.database.busy_timeout_ms = ms;
        self
    }

    // --- raffle ---

    pub fn max_number(mut self, n: u32) -> Self {
        self.config.raffle.max_number = n;
        self
    }

    pub fn page_size(mut self, n: u32) -> Self {
        self.config.raffle.page_size = n;
        self
    }

    pub fn audit_page_size(mut self, n: u32) -> Self {
        self.config.raffle.audit_page_size = n;
        self
    }

    pub fn recent_limit(mut self, n: u32) -> Self {
        self.config.raffle.recent_limit = n;
        self
    }

    // --- bootstrap ---

    pub fn bootstrap_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.bootstrap.username = username.into();
        self.config.bootstrap.password = password.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
