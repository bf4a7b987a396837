//! Audit command - Search the audit log
//!
//! Provides the `raffle audit` CLI command which:
//! 1. Filters events by action, actor, seller, number and date range
//! 2. Pages through results newest first
//! 3. Lists the values the filters accept with `--options`

use anyhow::{Context, Result};
use clap::Args;
use raffle_core::domain::AuditAction;
use raffle_core::ports::{AuditFilter, AuditRecord};
use raffle_engine::reporting::audit_date_range;
use tracing::info;

use super::context::{Desk, GlobalOptions};
use super::display_time;

/// Audit search arguments
#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Filter by action (e.g. "sale_void")
    #[arg(long)]
    pub action: Option<String>,

    /// Filter by the username that performed the action
    #[arg(long)]
    pub actor: Option<String>,

    /// Filter by the seller the event concerns
    #[arg(long)]
    pub seller: Option<String>,

    /// Filter by ticket number
    #[arg(long)]
    pub number: Option<i64>,

    /// Earliest date or timestamp (e.g. "2026-04-01")
    #[arg(long)]
    pub from: Option<String>,

    /// Latest date or timestamp, a bare date covers the whole day
    #[arg(long)]
    pub to: Option<String>,

    /// Page of results
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// List recorded actions and known usernames instead of searching
    #[arg(long)]
    pub options: bool,
}

impl AuditCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let desk = Desk::open(options).await?;
        let me = desk.login(options).await?;

        let result = if self.options {
            self.show_options(&desk, &me, options).await
        } else {
            self.search(&desk, &me, options).await
        };

        desk.close().await;
        result
    }

    async fn show_options(
        &self,
        desk: &Desk,
        me: &raffle_core::domain::Identity,
        options: &GlobalOptions,
    ) -> Result<()> {
        let formatter = options.formatter();
        let choices = desk.desk.reporting.audit_filter_options(me).await?;

        if options.format.is_json() {
            formatter.print_json(&serde_json::to_value(&choices)?);
            return Ok(());
        }

        formatter.success("Audit filter options");
        let actions: Vec<&str> = choices.actions.iter().map(AuditAction::as_str).collect();
        formatter.info(&format!("Actions:   {}", actions.join(", ")));
        let usernames: Vec<&str> = choices.usernames.iter().map(|u| u.as_str()).collect();
        formatter.info(&format!("Usernames: {}", usernames.join(", ")));
        Ok(())
    }

    async fn search(
        &self,
        desk: &Desk,
        me: &raffle_core::domain::Identity,
        options: &GlobalOptions,
    ) -> Result<()> {
        let formatter = options.formatter();
        let filter = self.filter(desk)?;
        let page = desk.desk.reporting.audit_log(me, &filter, self.page).await?;

        info!(total = page.total, page = page.page, "Retrieved audit events");

        if options.format.is_json() {
            formatter.print_json(&serde_json::to_value(&page)?);
            return Ok(());
        }

        if page.records.is_empty() {
            formatter.info("No audit events found for the specified criteria.");
            return Ok(());
        }

        formatter.success(&format!(
            "Audit Log ({} events, page {} of {})",
            page.total, page.page, page.page_count
        ));
        formatter.info("");
        let rows: Vec<Vec<String>> = page.records.iter().map(record_row).collect();
        formatter.table(
            &[
                ("Timestamp", 19),
                ("Action", 19),
                ("Actor", 12),
                ("Number", 7),
                ("Details", 7),
            ],
            &rows,
        );

        if page.page < page.page_count {
            formatter.info("");
            formatter.info(&format!("Use --page {} for older events.", page.page + 1));
        }

        Ok(())
    }

    fn filter(&self, desk: &Desk) -> Result<AuditFilter> {
        let mut filter = AuditFilter::new();
        if let Some(action) = non_blank(&self.action) {
            filter = filter.with_action(
                action
                    .parse::<AuditAction>()
                    .with_context(|| format!("Unknown action '{}'", action))?,
            );
        }
        if let Some(actor) = non_blank(&self.actor) {
            filter = filter.with_actor(actor);
        }
        if let Some(seller) = non_blank(&self.seller) {
            filter = filter.with_seller(seller);
        }
        if let Some(value) = self.number {
            filter = filter.with_number(desk.desk.allocation.number(value)?);
        }
        let (from, to) = audit_date_range(self.from.as_deref(), self.to.as_deref())?;
        filter.from = from;
        filter.to = to;
        Ok(filter)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn record_row(record: &AuditRecord) -> Vec<String> {
    let event = &record.event;
    let actor = record
        .actor_username
        .as_ref()
        .map(|u| u.as_str())
        .unwrap_or("(deleted)");
    vec![
        display_time(event.created_at),
        event.action.as_str().to_string(),
        truncate_string(actor, 12),
        event.number.map(|n| n.to_string()).unwrap_or_default(),
        format_details(event.details.as_ref()),
    ]
}

/// Short summary of an event's JSON details
fn format_details(details: Option<&serde_json::Value>) -> String {
    let Some(serde_json::Value::Object(map)) = details else {
        return details.map(|v| truncate_string(&v.to_string(), 40)).unwrap_or_default();
    };

    if let Some(after) = map.get("after") {
        let name = after.get("buyer_name").and_then(|v| v.as_str()).unwrap_or("");
        return truncate_string(&format!("buyer -> {}", name), 40);
    }
    if let Some(name) = map.get("buyer_name").and_then(|v| v.as_str()) {
        return truncate_string(&format!("buyer {}", name), 40);
    }
    if let Some(until) = map.get("reserved_until").and_then(|v| v.as_str()) {
        return format!("until {}", until);
    }
    if let Some(username) = map.get("username").and_then(|v| v.as_str()) {
        return truncate_string(username, 40);
    }
    map.iter()
        .next()
        .map(|(key, value)| truncate_string(&format!("{}={}", key, value), 40))
        .unwrap_or_default()
}

/// Truncate to at most `max_len` characters
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
