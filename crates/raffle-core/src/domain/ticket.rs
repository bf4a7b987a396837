//! Sales and reservations
//!
//! A ticket number has no row of its own. Its state is derived from the
//! presence of a [`Sale`] or a [`Reservation`]; the store guarantees at most
//! one of the two exists for any number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{TicketNumber, UserId};

/// Buyer contact details attached to a sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    name: String,
    phone: String,
}

impl Buyer {
    /// Create buyer details, trimming both fields
    ///
    /// # Errors
    /// Returns `DomainError::MissingBuyerDetails` if either field is blank
    pub fn new(name: impl AsRef<str>, phone: impl AsRef<str>) -> Result<Self, DomainError> {
        let name = name.as_ref().trim();
        let phone = phone.as_ref().trim();
        if name.is_empty() || phone.is_empty() {
            return Err(DomainError::MissingBuyerDetails);
        }
        Ok(Self {
            name: name.to_string(),
            phone: phone.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }
}

/// A completed sale of one ticket number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub number: TicketNumber,
    pub seller_id: UserId,
    pub buyer: Buyer,
    pub sold_at: DateTime<Utc>,
}

/// A time-limited hold on one ticket number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub number: TicketNumber,
    pub seller_id: UserId,
    pub reserved_at: DateTime<Utc>,
    pub reserved_until: DateTime<Utc>,
}
