//! Audit event domain entities
//!
//! Every state change in the raffle desk appends exactly one audit event in
//! the same transaction as the change. Events are never updated or deleted.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;
use super::newtypes::{AuditId, TicketNumber, UserId};

/// Actions that can be recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A seller placed a new hold on a number
    ReservationCreate,
    /// A seller re-reserved a number they already held
    ReservationExtend,
    /// A hold was released by its seller or a superuser
    ReservationRelease,
    /// A lapsed hold was removed by the sweeper
    ReservationExpired,
    /// A number was sold
    SaleCreate,
    /// Buyer details of a sale were changed
    SaleEdit,
    /// A sale was voided and the number released
    SaleVoid,
    /// A superuser created a seller account
    SellerCreate,
    /// A superuser deleted a seller account
    SellerDelete,
    /// The initial superuser was created on first start
    SuperuserBootstrap,
}

impl AuditAction {
    /// All actions, in declaration order
    pub const ALL: [AuditAction; 10] = [
        AuditAction::ReservationCreate,
        AuditAction::ReservationExtend,
        AuditAction::ReservationRelease,
        AuditAction::ReservationExpired,
        AuditAction::SaleCreate,
        AuditAction::SaleEdit,
        AuditAction::SaleVoid,
        AuditAction::SellerCreate,
        AuditAction::SellerDelete,
        AuditAction::SuperuserBootstrap,
    ];

    /// Stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ReservationCreate => "reservation_create",
            AuditAction::ReservationExtend => "reservation_extend",
            AuditAction::ReservationRelease => "reservation_release",
            AuditAction::ReservationExpired => "reservation_expired",
            AuditAction::SaleCreate => "sale_create",
            AuditAction::SaleEdit => "sale_edit",
            AuditAction::SaleVoid => "sale_void",
            AuditAction::SellerCreate => "seller_create",
            AuditAction::SellerDelete => "seller_delete",
            AuditAction::SuperuserBootstrap => "superuser_bootstrap",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::InvalidAction(s.to_string()))
    }
}

/// An audit event that has not been persisted yet
///
/// Built by the audit recorder and handed to the open unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    action: AuditAction,
    actor_id: UserId,
    number: Option<TicketNumber>,
    seller_id: Option<UserId>,
    details: Option<Value>,
    created_at: DateTime<Utc>,
}

impl NewAuditEvent {
    /// Creates a new event for `action` performed by `actor_id` at `created_at`
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use raffle_core::domain::{AuditAction, NewAuditEvent, UserId};
    ///
    /// let event = NewAuditEvent::new(AuditAction::SaleVoid, UserId::new(1), Utc::now());
    /// assert!(event.number().is_none());
    /// ```
    pub fn new(action: AuditAction, actor_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            action,
            actor_id,
            number: None,
            seller_id: None,
            details: None,
            created_at,
        }
    }

    /// Sets the ticket number this event concerns
    pub fn with_number(mut self, number: TicketNumber) -> Self {
        self.number = Some(number);
        self
    }

    /// Sets the seller whose record this event concerns
    pub fn with_seller(mut self, seller_id: UserId) -> Self {
        self.seller_id = Some(seller_id);
        self
    }

    /// Sets the structured details payload
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn number(&self) -> Option<TicketNumber> {
        self.number
    }

    pub fn seller_id(&self) -> Option<UserId> {
        self.seller_id
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach the database-assigned ID, producing the stored event
    pub fn into_stored(self, id: AuditId) -> AuditEvent {
        AuditEvent {
            id,
            action: self.action,
            actor_id: self.actor_id,
            number: self.number,
            seller_id: self.seller_id,
            details: self.details,
            created_at: self.created_at,
        }
    }
}

/// A persisted, immutable audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditId,
    pub action: AuditAction,
    pub actor_id: UserId,
    pub number: Option<TicketNumber>,
    pub seller_id: Option<UserId>,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}
