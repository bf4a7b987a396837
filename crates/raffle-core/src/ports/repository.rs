//! Raffle repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying users,
//! sales, reservations and audit events.
//!
//! ## Design Notes
//!
//! - Writes only happen through an [`IUnitOfWork`] obtained from
//!   [`IRaffleRepository::begin`]. The adapter must take the store's write
//!   lock when the unit of work is opened, before any read it performs, so
//!   that two units of work can never both observe a number as free.
//! - The unit of work is passed by `&mut` into both the mutation and the
//!   audit append, and committed or rolled back exactly once by the use case.
//!   Dropping it without committing rolls it back.
//! - Errors use [`StoreError`] rather than `anyhow` because use cases must
//!   tell a uniqueness violation (a lost race) apart from other failures.
//! - Read queries run outside any unit of work and return typed view records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    newtypes::{AuditId, TicketNumber, UserId, Username},
    AllocationError, AuditAction, AuditEvent, Buyer, NewAuditEvent, Reservation, Role, Sale, User,
};

// ============================================================================
// Errors
// ============================================================================

/// Storage-level failures reported by adapters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or other integrity constraint rejected the write
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// The write lock could not be acquired within the busy timeout
    #[error("Store busy: {0}")]
    Busy(String),

    /// Any other database or connection failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped to a domain type
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for AllocationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AllocationError::ConstraintConflict,
            other => AllocationError::StoreUnavailable {
                detail: other.to_string(),
            },
        }
    }
}

// ============================================================================
// Read models
// ============================================================================

/// Sale and reservation counts owned by one seller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    pub sold: u64,
    pub reserved: u64,
}

impl Holdings {
    pub fn is_empty(&self) -> bool {
        self.sold == 0 && self.reserved == 0
    }
}

/// Per-seller statistics row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerStats {
    pub id: UserId,
    pub username: Username,
    pub created_at: DateTime<Utc>,
    pub sold_count: u64,
    pub reserved_count: u64,
}

/// Ordering for [`IRaffleRepository::seller_stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellerOrder {
    /// Most sales first, ties broken by username
    MostSold,
    /// Alphabetical by username
    Username,
}

/// Sales and reservations within a contiguous number range
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSnapshot {
    /// (number, owning seller) for each sold number, ascending
    pub sold: Vec<(TicketNumber, UserId)>,
    /// (number, owning seller) for each reserved number, ascending
    pub reserved: Vec<(TicketNumber, UserId)>,
}

/// A sale joined with its seller's username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleView {
    pub sale: Sale,
    pub seller_username: Username,
}

/// A reservation joined with its seller's username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationView {
    pub reservation: Reservation,
    pub seller_username: Username,
}

/// An audit event joined with actor and seller usernames
///
/// Usernames are `None` when the referenced user no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub actor_username: Option<Username>,
    pub seller_username: Option<Username>,
}

// ============================================================================
// AuditFilter
// ============================================================================

/// Filter criteria for audit log searches
///
/// All fields are optional; when `None`, no filtering is applied for that field.
/// Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use raffle_core::domain::AuditAction;
/// use raffle_core::ports::AuditFilter;
///
/// let filter = AuditFilter::new()
///     .with_action(AuditAction::SaleVoid)
///     .with_actor("alice");
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    /// Exact action
    pub action: Option<AuditAction>,
    /// Username of the actor
    pub actor: Option<String>,
    /// Username of the seller the event concerns
    pub seller: Option<String>,
    /// Ticket number
    pub number: Option<TicketNumber>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Creates a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_actor(mut self, username: impl Into<String>) -> Self {
        self.actor = Some(username.into());
        self
    }

    pub fn with_seller(mut self, username: impl Into<String>) -> Self {
        self.seller = Some(username.into());
        self
    }

    pub fn with_number(mut self, number: TicketNumber) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.action.is_none()
            && self.actor.is_none()
            && self.seller.is_none()
            && self.number.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }
}

// ============================================================================
// IUnitOfWork
// ============================================================================

/// One open write transaction
///
/// Every method runs inside the transaction. Nothing is visible to other
/// connections until [`IUnitOfWork::commit`] succeeds.
#[async_trait::async_trait]
pub trait IUnitOfWork: Send {
    // --- Tickets ---

    /// The sale for `number`, if any
    async fn sale(&mut self, number: TicketNumber) -> Result<Option<Sale>, StoreError>;

    /// The reservation for `number`, if any
    async fn reservation(&mut self, number: TicketNumber)
        -> Result<Option<Reservation>, StoreError>;

    /// Inserts a sale; a second sale for the same number is a `Conflict`
    async fn insert_sale(
        &mut self,
        number: TicketNumber,
        seller_id: UserId,
        buyer: &Buyer,
        sold_at: DateTime<Utc>,
    ) -> Result<Sale, StoreError>;

    /// Replaces the buyer details of an existing sale
    async fn update_sale_buyer(
        &mut self,
        number: TicketNumber,
        buyer: &Buyer,
    ) -> Result<(), StoreError>;

    /// Deletes the sale for `number` (no-op if absent)
    async fn delete_sale(&mut self, number: TicketNumber) -> Result<(), StoreError>;

    /// Inserts a reservation; a second one for the same number is a `Conflict`
    async fn insert_reservation(
        &mut self,
        number: TicketNumber,
        seller_id: UserId,
        reserved_at: DateTime<Utc>,
        reserved_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError>;

    /// Moves `reserved_until` of an existing reservation
    async fn extend_reservation(
        &mut self,
        number: TicketNumber,
        reserved_until: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deletes the reservation for `number` (no-op if absent)
    async fn delete_reservation(&mut self, number: TicketNumber) -> Result<(), StoreError>;

    /// Reservations whose `reserved_until` is strictly before `now`
    async fn expired_reservations(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Deletes reservations by row ID
    async fn delete_reservations(&mut self, ids: &[i64]) -> Result<(), StoreError>;

    // --- Users ---

    /// Looks up a user by ID
    async fn user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Number of superuser accounts
    async fn count_superusers(&mut self) -> Result<u64, StoreError>;

    /// Inserts a user; a duplicate username is a `Conflict`
    async fn insert_user(
        &mut self,
        username: &Username,
        password_hash: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Deletes a user by ID
    async fn delete_user(&mut self, id: UserId) -> Result<(), StoreError>;

    /// Sales and reservations owned by `seller_id`
    async fn holdings(&mut self, seller_id: UserId) -> Result<Holdings, StoreError>;

    // --- Audit ---

    /// Appends an audit event and returns its ID
    async fn append_audit(&mut self, event: &NewAuditEvent) -> Result<AuditId, StoreError>;

    // --- Completion ---

    /// Commits every change made through this unit of work
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every change made through this unit of work
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

// ============================================================================
// IRaffleRepository
// ============================================================================

/// Port trait for raffle persistence
///
/// Covers the write entry point and all read queries the reporting layer
/// needs. Read methods never fail on business conflicts; they only report
/// state.
#[async_trait::async_trait]
pub trait IRaffleRepository: Send + Sync {
    /// Opens a unit of work holding the store's write lock
    async fn begin(&self) -> Result<Box<dyn IUnitOfWork>, StoreError>;

    // --- Users ---

    /// Looks up a user by username (exact match)
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Looks up a user by ID
    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Number of superuser accounts
    async fn count_superusers(&self) -> Result<u64, StoreError>;

    /// All usernames, alphabetically
    async fn usernames(&self) -> Result<Vec<Username>, StoreError>;

    /// Sellers with their sale and reservation counts
    async fn seller_stats(&self, order: SellerOrder) -> Result<Vec<SellerStats>, StoreError>;

    // --- Counts ---

    /// Total number of sales
    async fn count_sales(&self) -> Result<u64, StoreError>;

    /// Total number of reservations
    async fn count_reservations(&self) -> Result<u64, StoreError>;

    /// Reservations whose deadline lies strictly before `now`
    async fn count_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Sales and reservations owned by `seller_id`
    async fn holdings(&self, seller_id: UserId) -> Result<Holdings, StoreError>;

    // --- Tickets ---

    /// Sold and reserved numbers within `start..=end`
    async fn range_snapshot(
        &self,
        start: TicketNumber,
        end: TicketNumber,
    ) -> Result<RangeSnapshot, StoreError>;

    /// The sale for `number` with its seller's username
    async fn sale_view(&self, number: TicketNumber) -> Result<Option<SaleView>, StoreError>;

    /// The reservation for `number` with its seller's username
    async fn reservation_view(
        &self,
        number: TicketNumber,
    ) -> Result<Option<ReservationView>, StoreError>;

    /// Reservations held by `seller_id`, soonest expiry first
    async fn reservations_for_seller(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Most recent sales first
    async fn recent_sales(&self, limit: u32) -> Result<Vec<SaleView>, StoreError>;

    /// All sales ordered by number ascending
    async fn all_sales(&self) -> Result<Vec<Sale>, StoreError>;

    // --- Audit ---

    /// Most recent audit events first
    async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditRecord>, StoreError>;

    /// Number of audit events matching `filter`
    async fn count_audit(&self, filter: &AuditFilter) -> Result<u64, StoreError>;

    /// Audit events matching `filter`, newest first
    async fn search_audit(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Distinct actions present in the audit log, alphabetically
    async fn audit_actions(&self) -> Result<Vec<AuditAction>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_constraint_conflict() {
        let err: AllocationError = StoreError::Conflict("UNIQUE constraint failed".into()).into();
        assert_eq!(err, AllocationError::ConstraintConflict);
    }

    #[test]
    fn other_store_errors_map_to_unavailable() {
        for e in [
            StoreError::Busy("database is locked".into()),
            StoreError::Unavailable("disk I/O error".into()),
            StoreError::Serialization("bad row".into()),
        ] {
            let err: AllocationError = e.into();
            assert!(matches!(err, AllocationError::StoreUnavailable { .. }));
        }
    }

    #[test]
    fn empty_filter() {
        assert!(AuditFilter::new().is_empty());
        assert!(!AuditFilter::new().with_seller("bob").is_empty());
    }

    #[test]
    fn holdings_empty() {
        assert!(Holdings::default().is_empty());
        assert!(!Holdings { sold: 1, reserved: 0 }.is_empty());
    }
}
