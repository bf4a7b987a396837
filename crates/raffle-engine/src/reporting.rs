//! Read-side queries: dashboards, number lookup, audit search and export
//!
//! Every query except the CSV export sweeps lapsed reservations first, so a
//! caller never sees a hold past its deadline once a request has run.
//! Queries never fail on business conflicts; they report status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use raffle_core::config::RaffleConfig;
use raffle_core::domain::{
    AllocationError, AuditAction, DomainError, Identity, Reservation, TicketNumber, UserId,
    Username,
};
use raffle_core::ports::{
    AuditFilter, AuditRecord, Holdings, IRaffleRepository, SaleView, SellerOrder, SellerStats,
};
use serde::Serialize;

use crate::export::{render_sales, CsvExport};
use crate::sweeper::ExpirySweeper;

/// Raffle-wide counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub sold: u64,
    pub reserved: u64,
    /// `max_number - sold - reserved`
    pub remaining: u64,
}

/// State of one number in a seller's range listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberState {
    Available,
    Sold,
    ReservedByMe,
    ReservedByOther,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NumberCell {
    pub number: TicketNumber,
    pub state: NumberState,
}

/// What a seller sees on their landing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerDashboard {
    /// The seller's own sold and reserved counts
    pub holdings: Holdings,
    pub page: u32,
    pub page_count: u32,
    pub start: TicketNumber,
    pub end: TicketNumber,
    /// One cell per number in `start..=end`
    pub numbers: Vec<NumberCell>,
    /// The seller's reservations, soonest expiry first
    pub reservations: Vec<Reservation>,
}

/// What a superuser sees on their landing page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminDashboard {
    pub totals: Totals,
    /// Most sales first
    pub sellers: Vec<SellerStats>,
    pub recent_sales: Vec<SaleView>,
    pub recent_audit: Vec<AuditRecord>,
}

/// Status of a single number as visible to the caller
///
/// Buyer details are shown to every caller. `seller_username` is filled in
/// for superusers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NumberStatus {
    Available {
        number: TicketNumber,
    },
    Reserved {
        number: TicketNumber,
        reserved_until: DateTime<Utc>,
        reserved_by_me: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        seller_username: Option<Username>,
    },
    Sold {
        number: TicketNumber,
        buyer_name: String,
        buyer_phone: String,
        sold_at: DateTime<Utc>,
        /// True when the caller may edit or void the sale
        can_edit: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        seller_username: Option<Username>,
    },
}

impl NumberStatus {
    pub fn number(&self) -> TicketNumber {
        match self {
            NumberStatus::Available { number }
            | NumberStatus::Reserved { number, .. }
            | NumberStatus::Sold { number, .. } => *number,
        }
    }

    /// Short name used in listings
    pub fn name(&self) -> &'static str {
        match self {
            NumberStatus::Available { .. } => "available",
            NumberStatus::Reserved { .. } => "reserved",
            NumberStatus::Sold { .. } => "sold",
        }
    }
}

/// One page of audit search results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    /// Events matching the filter across all pages
    pub total: u64,
    pub page: u32,
    pub page_count: u32,
}

/// Values offered by the audit filter pickers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFilterOptions {
    pub actions: Vec<AuditAction>,
    pub usernames: Vec<Username>,
}

/// Clamp `requested` into `1..=page_count` for `total` items
///
/// There is always at least one page, even when nothing matches.
pub fn clamp_page(requested: u32, total: u64, page_size: u32) -> (u32, u32) {
    let size = u64::from(page_size.max(1));
    let pages = total.div_ceil(size).max(1);
    let page_count = u32::try_from(pages).unwrap_or(u32::MAX);
    (requested.clamp(1, page_count), page_count)
}

/// First and last number shown on `page` of the range listing
fn page_bounds(page: u32, page_size: u32, max_number: u32) -> (u32, u32) {
    let size = u64::from(page_size.max(1));
    let start = (u64::from(page) - 1) * size + 1;
    let end = (u64::from(page) * size).min(u64::from(max_number));
    // Both fit: `page` was clamped so that `start <= max_number`
    (start as u32, end as u32)
}

/// Serves dashboards, lookups, audit pages and the sales export
#[derive(Clone)]
pub struct ReportingService {
    repository: Arc<dyn IRaffleRepository>,
    sweeper: ExpirySweeper,
    limits: RaffleConfig,
}

impl ReportingService {
    pub fn new(
        repository: Arc<dyn IRaffleRepository>,
        sweeper: ExpirySweeper,
        limits: RaffleConfig,
    ) -> Self {
        Self {
            repository,
            sweeper,
            limits,
        }
    }

    /// Sold, reserved and remaining counts for the whole raffle
    pub async fn totals(&self) -> Result<Totals, AllocationError> {
        self.sweeper.sweep().await?;
        self.current_totals().await
    }

    async fn current_totals(&self) -> Result<Totals, AllocationError> {
        let sold = self.repository.count_sales().await?;
        let reserved = self.repository.count_reservations().await?;
        let remaining = u64::from(self.limits.max_number).saturating_sub(sold + reserved);
        Ok(Totals {
            sold,
            reserved,
            remaining,
        })
    }

    /// The seller's counts, one page of the number range and their holds
    ///
    /// `page` is clamped into the valid range.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for superusers
    pub async fn seller_dashboard(
        &self,
        seller: &Identity,
        page: u32,
    ) -> Result<SellerDashboard, AllocationError> {
        seller.require_seller()?;
        self.sweeper.sweep().await?;

        let (page, page_count) = clamp_page(
            page,
            u64::from(self.limits.max_number),
            self.limits.page_size,
        );
        let (first, last) = page_bounds(page, self.limits.page_size, self.limits.max_number);
        let start = TicketNumber::new(i64::from(first), self.limits.max_number)?;
        let end = TicketNumber::new(i64::from(last), self.limits.max_number)?;

        let holdings = self.repository.holdings(seller.user_id).await?;
        let snapshot = self.repository.range_snapshot(start, end).await?;
        let reservations = self
            .repository
            .reservations_for_seller(seller.user_id)
            .await?;

        let mut states: HashMap<TicketNumber, NumberState> = HashMap::new();
        for (number, _) in &snapshot.sold {
            states.insert(*number, NumberState::Sold);
        }
        for (number, owner) in &snapshot.reserved {
            let state = if *owner == seller.user_id {
                NumberState::ReservedByMe
            } else {
                NumberState::ReservedByOther
            };
            states.entry(*number).or_insert(state);
        }

        let mut numbers = Vec::with_capacity((last - first + 1) as usize);
        for value in first..=last {
            let number = TicketNumber::new(i64::from(value), self.limits.max_number)?;
            let state = states
                .get(&number)
                .copied()
                .unwrap_or(NumberState::Available);
            numbers.push(NumberCell { number, state });
        }

        Ok(SellerDashboard {
            holdings,
            page,
            page_count,
            start,
            end,
            numbers,
            reservations,
        })
    }

    /// Totals, seller ranking and the latest sales and audit events
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for sellers
    pub async fn admin_dashboard(
        &self,
        actor: &Identity,
    ) -> Result<AdminDashboard, AllocationError> {
        actor.require_superuser()?;
        self.sweeper.sweep().await?;

        let totals = self.current_totals().await?;
        let sellers = self.repository.seller_stats(SellerOrder::MostSold).await?;
        let recent_sales = self
            .repository
            .recent_sales(self.limits.recent_limit)
            .await?;
        let recent_audit = self
            .repository
            .recent_audit(self.limits.recent_limit)
            .await?;

        Ok(AdminDashboard {
            totals,
            sellers,
            recent_sales,
            recent_audit,
        })
    }

    /// Status of a single number with the caller's visibility applied
    ///
    /// # Errors
    ///
    /// `Validation` if `value` is outside `1..=max_number`
    pub async fn number_status(
        &self,
        caller: &Identity,
        value: i64,
    ) -> Result<NumberStatus, AllocationError> {
        let number = TicketNumber::new(value, self.limits.max_number)?;
        self.sweeper.sweep().await?;

        let superuser = caller.is_superuser();
        if let Some(view) = self.repository.sale_view(number).await? {
            let sale = view.sale;
            return Ok(NumberStatus::Sold {
                number,
                buyer_name: sale.buyer.name().to_string(),
                buyer_phone: sale.buyer.phone().to_string(),
                sold_at: sale.sold_at,
                can_edit: caller.can_manage(sale.seller_id),
                seller_username: superuser.then_some(view.seller_username),
            });
        }

        if let Some(view) = self.repository.reservation_view(number).await? {
            return Ok(NumberStatus::Reserved {
                number,
                reserved_until: view.reservation.reserved_until,
                reserved_by_me: view.reservation.seller_id == caller.user_id,
                seller_username: superuser.then_some(view.seller_username),
            });
        }

        Ok(NumberStatus::Available { number })
    }

    /// One page of audit events matching `filter`, newest first
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for sellers
    pub async fn audit_log(
        &self,
        actor: &Identity,
        filter: &AuditFilter,
        page: u32,
    ) -> Result<AuditPage, AllocationError> {
        actor.require_superuser()?;
        self.sweeper.sweep().await?;

        let size = self.limits.audit_page_size.max(1);
        let total = self.repository.count_audit(filter).await?;
        let (page, page_count) = clamp_page(page, total, size);
        let offset = u64::from(page - 1) * u64::from(size);
        let records = self.repository.search_audit(filter, size, offset).await?;

        Ok(AuditPage {
            records,
            total,
            page,
            page_count,
        })
    }

    /// Recorded actions and known usernames for the audit filter pickers
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for sellers
    pub async fn audit_filter_options(
        &self,
        actor: &Identity,
    ) -> Result<AuditFilterOptions, AllocationError> {
        actor.require_superuser()?;
        Ok(AuditFilterOptions {
            actions: self.repository.audit_actions().await?,
            usernames: self.repository.usernames().await?,
        })
    }

    /// Every sale as `number,buyer_name` CSV, ascending by number
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for sellers
    pub async fn export_sales(&self, actor: &Identity) -> Result<CsvExport, AllocationError> {
        actor.require_superuser()?;
        let sales = self.repository.all_sales().await?;
        let export = render_sales(&sales);
        tracing::info!(actor_id = %actor.user_id, rows = export.rows, "Exported sales");
        Ok(export)
    }

    /// Reservations held by one seller, for the "mine" listing
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless the caller is that seller or a superuser
    pub async fn reservations_of(
        &self,
        caller: &Identity,
        seller_id: UserId,
    ) -> Result<Vec<Reservation>, AllocationError> {
        if !caller.can_manage(seller_id) {
            return Err(AllocationError::PermissionDenied(
                "You do not have permission to view these reservations.".to_string(),
            ));
        }
        self.sweeper.sweep().await?;
        Ok(self.repository.reservations_for_seller(seller_id).await?)
    }
}

/// Parse the `from`/`to` bounds of an audit search
///
/// Date-only input is widened to the start of `from`'s day and the end of
/// `to`'s day.
///
/// # Errors
///
/// `Validation` if either bound is neither a date nor a timestamp
pub fn audit_date_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), DomainError> {
    let parse = |input: Option<&str>, end: bool| {
        input
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| raffle_core::domain::time::parse_date_bound(s, end))
            .transpose()
    };
    Ok((parse(from, false)?, parse(to, true)?))
}
