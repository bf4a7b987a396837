//! Raffle CLI - Command-line front end for the raffle desk
//!
//! Provides commands for:
//! - Reserving, selling, editing, voiding and releasing ticket numbers
//! - Looking up numbers and browsing the number range
//! - Managing seller accounts
//! - Searching the audit log and exporting sales
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use raffle_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    audit::AuditCommand,
    completions::CompletionsCommand,
    config::ConfigCommand,
    context::{report_error, GlobalOptions},
    dashboard::{DashboardCommand, SweepCommand},
    export::ExportCommand,
    init::InitCommand,
    sellers::SellersCommand,
    status::{MineCommand, NumbersCommand, StatusCommand},
    tickets::{EditCommand, ReleaseCommand, ReserveCommand, SellCommand, VoidCommand},
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "raffle", version, about = "Raffle ticket desk")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, env = "RAFFLE_CONFIG")]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Username to act as
    #[arg(long, short = 'u', global = true, env = "RAFFLE_USERNAME")]
    username: Option<String>,

    /// Password for --username
    #[arg(long, global = true, env = "RAFFLE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and the first superuser
    Init(InitCommand),
    /// Reserve numbers for 15 minutes
    Reserve(ReserveCommand),
    /// Sell numbers to a buyer
    Sell(SellCommand),
    /// Change the buyer details of a sale
    Edit(EditCommand),
    /// Void a sale
    Void(VoidCommand),
    /// Release a reservation
    Release(ReleaseCommand),
    /// Show the status of one number
    Status(StatusCommand),
    /// Browse the number range
    Numbers(NumbersCommand),
    /// Show your holdings and reservations
    Mine(MineCommand),
    /// Show the overview for your role
    Dashboard(DashboardCommand),
    /// Release expired reservations now
    Sweep(SweepCommand),
    /// Manage seller accounts
    #[command(subcommand)]
    Sellers(SellersCommand),
    /// Search the audit log
    Audit(AuditCommand),
    /// Export all sales as CSV
    Export(ExportCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = GlobalOptions {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
        config: cli.config.clone(),
        username: cli.username.clone(),
        password: cli.password.clone(),
    };

    init_tracing(cli.verbose, &options);

    if let Err(err) = run(cli.command, &options).await {
        report_error(&*options.formatter(), &err);
        std::process::exit(1);
    }
}

async fn run(command: Commands, options: &GlobalOptions) -> Result<()> {
    match command {
        Commands::Init(cmd) => cmd.execute(options).await,
        Commands::Reserve(cmd) => cmd.execute(options).await,
        Commands::Sell(cmd) => cmd.execute(options).await,
        Commands::Edit(cmd) => cmd.execute(options).await,
        Commands::Void(cmd) => cmd.execute(options).await,
        Commands::Release(cmd) => cmd.execute(options).await,
        Commands::Status(cmd) => cmd.execute(options).await,
        Commands::Numbers(cmd) => cmd.execute(options).await,
        Commands::Mine(cmd) => cmd.execute(options).await,
        Commands::Dashboard(cmd) => cmd.execute(options).await,
        Commands::Sweep(cmd) => cmd.execute(options).await,
        Commands::Sellers(cmd) => cmd.execute(options).await,
        Commands::Audit(cmd) => cmd.execute(options).await,
        Commands::Export(cmd) => cmd.execute(options).await,
        Commands::Config(cmd) => cmd.execute(options).await,
        Commands::Completions(cmd) => cmd.execute(),
    }
}

/// Log to stderr; `-v` raises the configured level, `RUST_LOG` overrides both
fn init_tracing(verbose: u8, options: &GlobalOptions) {
    // A broken config file is reported by the command itself
    let logging = options
        .load_config()
        .map(|c| c.logging)
        .unwrap_or_else(|_| Config::default().logging);

    let level = match verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
