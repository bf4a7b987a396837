//! CLI subcommands

pub mod audit;
pub mod completions;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod export;
pub mod init;
pub mod sellers;
pub mod status;
pub mod tickets;

use chrono::{DateTime, Utc};
use raffle_core::domain::TicketNumber;

/// `1, 2, 40`
pub(crate) fn format_list(numbers: &[TicketNumber]) -> String {
    numbers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Second-precision UTC time for terminal output
pub(crate) fn display_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
