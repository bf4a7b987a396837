//! Shared command plumbing
//!
//! Resolves the configuration, opens the database, wires the use cases and
//! logs the caller in. Every command except `completions` and `config` goes
//! through [`Desk::open`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use raffle_audit::ReasonCode;
use raffle_core::config::Config;
use raffle_core::domain::{AllocationError, Identity, User};
use raffle_core::ports::SystemClock;
use raffle_engine::RaffleDesk;
use raffle_store::{DatabasePool, SqliteRaffleRepository};
use tracing::{debug, info};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Options shared by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GlobalOptions {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// `--config` if given, the default location otherwise
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Load the configuration with environment overrides, without validating
    ///
    /// An explicit `--config` must exist and parse; the default location
    /// falls back to built-in defaults.
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => Config::load_or_default(&Config::default_path()),
        };
        Ok(config.with_env_overrides())
    }

    /// [`GlobalOptions::load_config`] followed by validation
    pub fn load_valid_config(&self) -> Result<Config> {
        let config = self.load_config()?;
        let errors = config.validate();
        if !errors.is_empty() {
            let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!("Invalid configuration: {}", listed.join("; "));
        }
        Ok(config)
    }
}

/// An opened database with all use cases wired to it
pub struct Desk {
    pub desk: RaffleDesk,
    pub config: Config,
    /// The superuser created while opening, if there was none before
    pub bootstrapped: Option<User>,
    pool: DatabasePool,
}

impl Desk {
    /// Open the configured database, migrating and bootstrapping as needed
    pub async fn open(options: &GlobalOptions) -> Result<Self> {
        let config = options.load_valid_config()?;
        let pool = DatabasePool::from_config(&config.database)
            .await
            .context("Failed to open database")?;
        let repository = Arc::new(SqliteRaffleRepository::new(pool.pool().clone()));
        let desk = RaffleDesk::new(repository, Arc::new(SystemClock), &config.raffle);

        let bootstrapped = desk
            .accounts
            .bootstrap_superuser(&config.bootstrap.username, &config.bootstrap.password)
            .await?;
        if let Some(user) = &bootstrapped {
            info!(username = %user.username, "Created initial superuser");
        }
        debug!(path = %config.database.path.display(), "Desk opened");

        Ok(Self {
            desk,
            config,
            bootstrapped,
            pool,
        })
    }

    /// Authenticate with `--username` / `--password`
    pub async fn login(&self, options: &GlobalOptions) -> Result<Identity> {
        let (Some(username), Some(password)) = (&options.username, &options.password) else {
            bail!("Credentials required: pass --username and --password or set RAFFLE_USERNAME and RAFFLE_PASSWORD");
        };
        Ok(self.desk.accounts.authenticate(username, password).await?)
    }

    /// Close the pool, letting in-flight statements finish
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Print a failed command through the formatter
///
/// Use-case failures carry their reason code; anything else prints its
/// context chain.
pub fn report_error(formatter: &dyn OutputFormatter, err: &anyhow::Error) {
    match err.downcast_ref::<AllocationError>() {
        Some(rejection) => {
            formatter.failure(&rejection.to_string(), ReasonCode::from(rejection).as_str())
        }
        None => formatter.error(&format!("{err:#}")),
    }
}
