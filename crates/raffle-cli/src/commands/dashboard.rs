//! Dashboard and sweep commands
//!
//! `raffle dashboard` shows raffle-wide totals to superusers and the range
//! overview to sellers. `raffle sweep` releases lapsed reservations now.

use anyhow::Result;
use clap::Args;
use raffle_core::domain::Identity;
use raffle_engine::AdminDashboard;

use super::context::{Desk, GlobalOptions};
use super::display_time;

/// Show the landing overview for the logged-in user
#[derive(Debug, Args)]
pub struct DashboardCommand {}

impl DashboardCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let result = if me.is_superuser() {
            show_admin(&desk, &me, options).await
        } else {
            show_seller(&desk, &me, options).await
        };

        desk.close().await;
        result
    }
}

async fn show_admin(desk: &Desk, me: &Identity, options: &GlobalOptions) -> Result<()> {
    let formatter = options.formatter();
    let dashboard = desk.desk.reporting.admin_dashboard(me).await?;

    if options.format.is_json() {
        formatter.print_json(&serde_json::to_value(&dashboard)?);
        return Ok(());
    }

    print_admin(&*formatter, &dashboard);
    Ok(())
}

fn print_admin(formatter: &dyn crate::output::OutputFormatter, dashboard: &AdminDashboard) {
    let totals = dashboard.totals;
    formatter.success(&format!(
        "Sold {}   Reserved {}   Remaining {}",
        totals.sold, totals.reserved, totals.remaining
    ));

    formatter.info("");
    formatter.info("Sellers:");
    if dashboard.sellers.is_empty() {
        formatter.info("  (none)");
    }
    let rows: Vec<Vec<String>> = dashboard
        .sellers
        .iter()
        .map(|s| {
            vec![
                s.username.to_string(),
                s.sold_count.to_string(),
                s.reserved_count.to_string(),
            ]
        })
        .collect();
    if !rows.is_empty() {
        formatter.table(&[("Username", 20), ("Sold", 6), ("Reserved", 8)], &rows);
    }

    formatter.info("");
    formatter.info("Recent sales:");
    if dashboard.recent_sales.is_empty() {
        formatter.info("  (none)");
    }
    for view in &dashboard.recent_sales {
        formatter.info(&format!(
            "  {} {:>7} {:<20} by {}",
            display_time(view.sale.sold_at),
            view.sale.number,
            view.sale.buyer.name(),
            view.seller_username
        ));
    }

    formatter.info("");
    formatter.info("Recent activity:");
    if dashboard.recent_audit.is_empty() {
        formatter.info("  (none)");
    }
    for record in &dashboard.recent_audit {
        let actor = record
            .actor_username
            .as_ref()
            .map(|u| u.as_str())
            .unwrap_or("(deleted)");
        let number = record
            .event
            .number
            .map(|n| n.to_string())
            .unwrap_or_default();
        formatter.info(&format!(
            "  {} {:<19} {:<12} {}",
            display_time(record.event.created_at),
            record.event.action.as_str(),
            actor,
            number
        ));
    }
}

async fn show_seller(desk: &Desk, me: &Identity, options: &GlobalOptions) -> Result<()> {
    let formatter = options.formatter();
    let totals = desk.desk.reporting.totals().await?;
    let dashboard = desk.desk.reporting.seller_dashboard(me, 1).await?;

    if options.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "totals": totals,
            "holdings": dashboard.holdings,
            "reservations": dashboard.reservations,
            "page_count": dashboard.page_count,
        }));
        return Ok(());
    }

    formatter.success(&format!(
        "Sold {}   Reserved {}   Remaining {}",
        totals.sold, totals.reserved, totals.remaining
    ));
    formatter.info(&format!(
        "You: {} sold, {} reserved",
        dashboard.holdings.sold, dashboard.holdings.reserved
    ));
    formatter.info(&format!(
        "Browse the range with 'raffle numbers --page <1-{}>'.",
        dashboard.page_count
    ));
    Ok(())
}

/// Release every lapsed reservation now
#[derive(Debug, Args)]
pub struct SweepCommand {}

impl SweepCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let desk = Desk::open(options).await?;
        desk.login(options).await?;

        let released = desk.desk.sweeper.sweep().await?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "released": released,
            }));
        } else {
            formatter.success(&format!("Released {} expired reservation(s).", released));
        }

        desk.close().await;
        Ok(())
    }
}
