//! Ticket commands: reserve, sell, edit, void, release
//!
//! Each command logs in, runs exactly one allocation use case and prints its
//! outcome. A rejected batch changes nothing, so the caller can simply retry
//! with a different selection.

use anyhow::Result;
use clap::Args;
use raffle_core::domain::time::format_timestamp;
use raffle_core::domain::HOLD_DURATION_MINUTES;
use serde_json::json;

use super::context::{Desk, GlobalOptions};
use super::{display_time, format_list};

/// Reserve numbers for 15 minutes
#[derive(Debug, Args)]
pub struct ReserveCommand {
    /// Ticket numbers to reserve
    #[arg(required = true, num_args = 1..)]
    pub numbers: Vec<i64>,
}

impl ReserveCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let batch = desk.desk.allocation.batch(self.numbers.iter().copied())?;
        let outcome = desk.desk.allocation.reserve(&me, &batch).await?;

        if options.format.is_json() {
            formatter.print_json(&json!({
                "success": true,
                "created": outcome.created,
                "extended": outcome.extended,
                "reserved_until": format_timestamp(outcome.reserved_until),
            }));
        } else {
            formatter.success(&format!(
                "Reserved {} number(s) for {} minutes.",
                outcome.total(),
                HOLD_DURATION_MINUTES
            ));
            if !outcome.created.is_empty() {
                formatter.info(&format!("New:      {}", format_list(&outcome.created)));
            }
            if !outcome.extended.is_empty() {
                formatter.info(&format!("Extended: {}", format_list(&outcome.extended)));
            }
            formatter.info(&format!(
                "Held until {}",
                display_time(outcome.reserved_until)
            ));
        }

        desk.close().await;
        Ok(())
    }
}

/// Sell numbers to one buyer
#[derive(Debug, Args)]
pub struct SellCommand {
    /// Ticket numbers to sell
    #[arg(required = true, num_args = 1..)]
    pub numbers: Vec<i64>,

    /// Buyer's name
    #[arg(long)]
    pub buyer_name: String,

    /// Buyer's phone number
    #[arg(long)]
    pub buyer_phone: String,
}

impl SellCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let batch = desk.desk.allocation.batch(self.numbers.iter().copied())?;
        let outcome = desk
            .desk
            .allocation
            .sell(&me, &batch, &self.buyer_name, &self.buyer_phone)
            .await?;

        if options.format.is_json() {
            formatter.print_json(&json!({
                "success": true,
                "sales": outcome.sales,
                "converted": outcome.converted,
            }));
        } else {
            let numbers: Vec<_> = outcome.sales.iter().map(|s| s.number).collect();
            formatter.success(&format!("Sold {} number(s).", outcome.sales.len()));
            formatter.info(&format!("Numbers: {}", format_list(&numbers)));
            if !outcome.converted.is_empty() {
                formatter.info(&format!(
                    "Converted from your reservations: {}",
                    format_list(&outcome.converted)
                ));
            }
        }

        desk.close().await;
        Ok(())
    }
}

/// Change the buyer details of a sale
#[derive(Debug, Args)]
pub struct EditCommand {
    /// Sold ticket number
    pub number: i64,

    /// New buyer name
    #[arg(long)]
    pub buyer_name: String,

    /// New buyer phone number
    #[arg(long)]
    pub buyer_phone: String,
}

impl EditCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let number = desk.desk.allocation.number(self.number)?;
        let sale = desk
            .desk
            .allocation
            .edit_sale(&me, number, &self.buyer_name, &self.buyer_phone)
            .await?;

        if options.format.is_json() {
            formatter.print_json(&json!({ "success": true, "sale": sale }));
        } else {
            formatter.success(&format!("Sale {} updated.", sale.number));
            formatter.info(&format!(
                "Buyer: {} ({})",
                sale.buyer.name(),
                sale.buyer.phone()
            ));
        }

        desk.close().await;
        Ok(())
    }
}

/// Void a sale, making its number available again
#[derive(Debug, Args)]
pub struct VoidCommand {
    /// Sold ticket number
    pub number: i64,
}

impl VoidCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let number = desk.desk.allocation.number(self.number)?;
        let sale = desk.desk.allocation.void_sale(&me, number).await?;

        if options.format.is_json() {
            formatter.print_json(&json!({ "success": true, "voided": sale }));
        } else {
            formatter.success(&format!("Sale {} voided.", sale.number));
        }

        desk.close().await;
        Ok(())
    }
}

/// Release a reservation before it expires
#[derive(Debug, Args)]
pub struct ReleaseCommand {
    /// Reserved ticket number
    pub number: i64,
}

impl ReleaseCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let number = desk.desk.allocation.number(self.number)?;
        let reservation = desk.desk.allocation.release_reservation(&me, number).await?;

        if options.format.is_json() {
            formatter.print_json(&json!({ "success": true, "released": reservation }));
        } else {
            formatter.success(&format!("Reservation {} released.", reservation.number));
        }

        desk.close().await;
        Ok(())
    }
}
