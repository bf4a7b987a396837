//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! - [`DomainError`] for value validation (raised before any transaction)
//! - [`AllocationError`] for the outcome taxonomy of every use case

use thiserror::Error;

use super::newtypes::TicketNumber;

/// Errors that can occur while validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// No ticket numbers were selected
    #[error("Select at least one number.")]
    EmptySelection,

    /// A ticket number outside `1..=max`
    #[error("Number {value} is out of range (1-{max}).")]
    NumberOutOfRange {
        /// The rejected value
        value: i64,
        /// The configured maximum
        max: u32,
    },

    /// A stored or parsed value is not a valid ticket number
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Buyer name or phone missing
    #[error("Buyer name and phone are required.")]
    MissingBuyerDetails,

    /// Password shorter than the minimum length
    #[error("Password should be at least {min} characters.")]
    WeakPassword {
        /// Minimum accepted length
        min: usize,
    },

    /// Unknown role name
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Unknown audit action name
    #[error("Invalid audit action: {0}")]
    InvalidAction(String),

    /// Timestamp text that cannot be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Generic validation failure
    #[error("{0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Outcome taxonomy shared by all allocation, account and reporting use cases
///
/// Every mutating operation is all-or-nothing: whichever variant is returned,
/// nothing from the failed call was committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Input rejected before any transaction began
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// The number already has a sale
    #[error("Number {0} is already sold.")]
    AlreadySold(TicketNumber),

    /// The number is held by another seller's reservation (reserve path)
    #[error("Number {0} is already reserved.")]
    AlreadyReserved(TicketNumber),

    /// The number is held by another seller's reservation (sell path)
    #[error("Number {0} is reserved by another seller.")]
    ReservedByOther(TicketNumber),

    /// A uniqueness constraint fired despite the business checks
    #[error("One or more numbers were already taken. Please refresh and try again.")]
    ConstraintConflict,

    /// Any other storage failure, including lock timeouts
    #[error("Database error. Please try again.")]
    StoreUnavailable {
        /// Underlying storage message, for logs only
        detail: String,
    },

    /// The actor lacks the role or ownership required
    #[error("{0}")]
    PermissionDenied(String),

    /// The addressed sale, reservation or user does not exist
    #[error("{0} not found.")]
    NotFound(String),

    /// Unknown username or wrong password
    #[error("Invalid username or password.")]
    InvalidCredentials,

    /// Duplicate username on seller creation
    #[error("Username already exists.")]
    UsernameTaken,

    /// Seller deletion blocked by existing sales or reservations
    #[error("Seller has sales or reservations and cannot be deleted.")]
    SellerHasHoldings {
        /// Sales owned by the seller
        sold: u64,
        /// Reservations owned by the seller
        reserved: u64,
    },
}

impl AllocationError {
    /// True for errors after which the caller should refresh and retry
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AllocationError::AlreadySold(_)
                | AllocationError::AlreadyReserved(_)
                | AllocationError::ReservedByOther(_)
                | AllocationError::ConstraintConflict
        )
    }

    /// The ticket number named by a business conflict, if any
    pub fn conflicting_number(&self) -> Option<TicketNumber> {
        match self {
            AllocationError::AlreadySold(n)
            | AllocationError::AlreadyReserved(n)
            | AllocationError::ReservedByOther(n) => Some(*n),
            _ => None,
        }
    }

    /// Shorthand for a storage failure
    pub fn store(detail: impl Into<String>) -> Self {
        AllocationError::StoreUnavailable {
            detail: detail.into(),
        }
    }
}
