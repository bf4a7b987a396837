//! Status commands - Look up numbers and the caller's holdings
//!
//! Provides the `raffle status`, `raffle numbers` and `raffle mine` commands:
//! 1. The status of one number as the caller may see it
//! 2. One page of the number range with each number's state
//! 3. The caller's counts and reservations, soonest expiry first

use anyhow::Result;
use clap::Args;
use raffle_engine::{NumberCell, NumberState, NumberStatus};

use super::context::{Desk, GlobalOptions};
use super::display_time;

/// Show the status of one number
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Ticket number to look up
    pub number: i64,
}

impl StatusCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let status = desk.desk.reporting.number_status(&me, self.number).await?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::to_value(&status)?);
        } else {
            match &status {
                NumberStatus::Available { number } => {
                    formatter.success(&format!("Number {} is available", number));
                }
                NumberStatus::Reserved {
                    number,
                    reserved_until,
                    reserved_by_me,
                    seller_username,
                } => {
                    let holder = if *reserved_by_me {
                        "you".to_string()
                    } else {
                        seller_username
                            .as_ref()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "another seller".to_string())
                    };
                    formatter.success(&format!("Number {} is reserved by {}", number, holder));
                    formatter.info(&format!("Held until {}", display_time(*reserved_until)));
                }
                NumberStatus::Sold {
                    number,
                    buyer_name,
                    buyer_phone,
                    sold_at,
                    can_edit,
                    seller_username,
                } => {
                    formatter.success(&format!("Number {} is sold", number));
                    formatter.info(&format!("Buyer:   {} ({})", buyer_name, buyer_phone));
                    formatter.info(&format!("Sold at: {}", display_time(*sold_at)));
                    if let Some(seller) = seller_username {
                        formatter.info(&format!("Seller:  {}", seller));
                    }
                    if *can_edit {
                        formatter.info("You may edit or void this sale.");
                    }
                }
            }
        }

        desk.close().await;
        Ok(())
    }
}

/// Show one page of the number range
#[derive(Debug, Args)]
pub struct NumbersCommand {
    /// Page of the range, out-of-range pages are clamped
    #[arg(long, default_value = "1")]
    pub page: u32,
}

impl NumbersCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let dashboard = desk.desk.reporting.seller_dashboard(&me, self.page).await?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::to_value(&dashboard)?);
        } else {
            formatter.success(&format!(
                "Numbers {}-{} (page {} of {})",
                dashboard.start, dashboard.end, dashboard.page, dashboard.page_count
            ));
            formatter.info("  . available   S sold   R reserved by you   x reserved by another seller");
            formatter.info("");
            for row in dashboard.numbers.chunks(GRID_WIDTH) {
                formatter.info(&grid_row(row));
            }
            formatter.info("");
            formatter.info(&format!(
                "You have sold {} and reserve {}.",
                dashboard.holdings.sold, dashboard.holdings.reserved
            ));
        }

        desk.close().await;
        Ok(())
    }
}

/// Show the caller's holdings and reservations
#[derive(Debug, Args)]
pub struct MineCommand {}

impl MineCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let dashboard = desk.desk.reporting.seller_dashboard(&me, 1).await?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "holdings": dashboard.holdings,
                "reservations": dashboard.reservations,
            }));
        } else {
            formatter.success(&format!(
                "{}: {} sold, {} reserved",
                me.username, dashboard.holdings.sold, dashboard.holdings.reserved
            ));
            if dashboard.reservations.is_empty() {
                formatter.info("No active reservations.");
            } else {
                formatter.info("");
                let rows: Vec<Vec<String>> = dashboard
                    .reservations
                    .iter()
                    .map(|r| vec![r.number.to_string(), display_time(r.reserved_until)])
                    .collect();
                formatter.table(&[("Number", 7), ("Held until", 19)], &rows);
            }
        }

        desk.close().await;
        Ok(())
    }
}

const GRID_WIDTH: usize = 20;

fn cell_symbol(state: NumberState) -> char {
    match state {
        NumberState::Available => '.',
        NumberState::Sold => 'S',
        NumberState::ReservedByMe => 'R',
        NumberState::ReservedByOther => 'x',
    }
}

/// `  <first number> <one symbol per number>`
fn grid_row(cells: &[NumberCell]) -> String {
    let first = cells.first().map(|c| c.number.to_string()).unwrap_or_default();
    let symbols: String = cells.iter().map(|c| cell_symbol(c.state)).collect();
    format!("  {:>7} {}", first, symbols)
}
