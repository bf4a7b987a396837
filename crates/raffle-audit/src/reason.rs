//! Reason codes for rejected operations
//!
//! Provides stable, machine-readable codes for why an allocation, account or
//! reporting call failed. They tag warn/error log events and the `code`
//! field of JSON error output; the human message stays in the error itself.

use std::fmt;

use raffle_core::domain::AllocationError;
use serde::{Deserialize, Serialize};

/// Structured reason codes for failures and conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Input failed validation before any transaction began
    InvalidInput,
    /// The number already has a sale
    AlreadySold,
    /// The number is held by another seller (reserve path)
    AlreadyReserved,
    /// The number is held by another seller (sell path)
    ReservedByOther,
    /// A uniqueness constraint fired despite the business checks
    ConstraintConflict,
    /// The store failed or its write lock timed out
    StoreUnavailable,
    /// Missing role or ownership
    PermissionDenied,
    /// The addressed record does not exist
    NotFound,
    /// Login failed
    InvalidCredentials,
    /// Duplicate username
    UsernameTaken,
    /// Seller still owns sales or reservations
    SellerHasHoldings,
}

impl ReasonCode {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidInput => "invalid_input",
            ReasonCode::AlreadySold => "already_sold",
            ReasonCode::AlreadyReserved => "already_reserved",
            ReasonCode::ReservedByOther => "reserved_by_other",
            ReasonCode::ConstraintConflict => "constraint_conflict",
            ReasonCode::StoreUnavailable => "store_unavailable",
            ReasonCode::PermissionDenied => "permission_denied",
            ReasonCode::NotFound => "not_found",
            ReasonCode::InvalidCredentials => "invalid_credentials",
            ReasonCode::UsernameTaken => "username_taken",
            ReasonCode::SellerHasHoldings => "seller_has_holdings",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&AllocationError> for ReasonCode {
    fn from(e: &AllocationError) -> Self {
        match e {
            AllocationError::Validation(_) => ReasonCode::InvalidInput,
            AllocationError::AlreadySold(_) => ReasonCode::AlreadySold,
            AllocationError::AlreadyReserved(_) => ReasonCode::AlreadyReserved,
            AllocationError::ReservedByOther(_) => ReasonCode::ReservedByOther,
            AllocationError::ConstraintConflict => ReasonCode::ConstraintConflict,
            AllocationError::StoreUnavailable { .. } => ReasonCode::StoreUnavailable,
            AllocationError::PermissionDenied(_) => ReasonCode::PermissionDenied,
            AllocationError::NotFound(_) => ReasonCode::NotFound,
            AllocationError::InvalidCredentials => ReasonCode::InvalidCredentials,
            AllocationError::UsernameTaken => ReasonCode::UsernameTaken,
            AllocationError::SellerHasHoldings { .. } => ReasonCode::SellerHasHoldings,
        }
    }
}
