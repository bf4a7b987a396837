//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Integer ID types
// ============================================================================

/// Identifier for User entities (assigned by the database)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a UserId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid UserId: {e}")))
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier for AuditEvent entries (assigned by the database)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(i64);

impl AuditId {
    /// Create an AuditId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AuditId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AuditId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Ticket numbers
// ============================================================================

/// A raffle ticket number, always >= 1
///
/// The upper bound is configuration (`raffle.max_number`), so it is checked
/// by [`TicketNumber::new`] against the caller-supplied maximum. Values read
/// back from storage go through [`TicketNumber::from_stored`], which only
/// checks the lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// Create a ticket number, validating it is within `1..=max_number`
    ///
    /// # Errors
    /// Returns `DomainError::NumberOutOfRange` if the value is outside the range
    pub fn new(value: i64, max_number: u32) -> Result<Self, DomainError> {
        if value < 1 || value > i64::from(max_number) {
            return Err(DomainError::NumberOutOfRange {
                value,
                max: max_number,
            });
        }
        // In range of u32 because max_number is a u32
        Ok(Self(value as u32))
    }

    /// Rebuild a ticket number from a stored integer column
    ///
    /// # Errors
    /// Returns `DomainError::InvalidNumber` if the stored value is not positive
    pub fn from_stored(value: i64) -> Result<Self, DomainError> {
        u32::try_from(value)
            .ok()
            .filter(|v| *v >= 1)
            .map(Self)
            .ok_or_else(|| DomainError::InvalidNumber(value.to_string()))
    }

    /// Get the inner value
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Value as the integer type used for SQL binding
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        i64::from(self.0)
    }
}

impl Display for TicketNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-empty set of ticket numbers processed under all-or-nothing semantics
///
/// Numbers are deduplicated and iterate in ascending order, which gives every
/// allocation a deterministic evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBatch(BTreeSet<TicketNumber>);

impl TicketBatch {
    /// Build a batch from raw integers, validating each against `max_number`
    ///
    /// # Errors
    /// Returns `DomainError::EmptySelection` for an empty input and
    /// `DomainError::NumberOutOfRange` for the first value outside the range.
    pub fn new<I>(values: I, max_number: u32) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut numbers = BTreeSet::new();
        for value in values {
            numbers.insert(TicketNumber::new(value, max_number)?);
        }
        Self::from_numbers(numbers)
    }

    /// Build a batch from already-validated numbers
    ///
    /// # Errors
    /// Returns `DomainError::EmptySelection` if the set is empty
    pub fn from_numbers<I>(numbers: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = TicketNumber>,
    {
        let set: BTreeSet<TicketNumber> = numbers.into_iter().collect();
        if set.is_empty() {
            return Err(DomainError::EmptySelection);
        }
        Ok(Self(set))
    }

    /// Number of distinct tickets in the batch
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the numbers in ascending order
    pub fn iter(&self) -> impl Iterator<Item = TicketNumber> + '_ {
        self.0.iter().copied()
    }

    /// Whether the batch contains the given number
    #[must_use]
    pub fn contains(&self, number: TicketNumber) -> bool {
        self.0.contains(&number)
    }
}

impl<'a> IntoIterator for &'a TicketBatch {
    type Item = &'a TicketNumber;
    type IntoIter = std::collections::btree_set::Iter<'a, TicketNumber>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Username
// ============================================================================

/// A trimmed, non-empty login name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Create a username, trimming surrounding whitespace
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the trimmed value is empty
    pub fn new(value: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::ValidationFailed(
                "Username is required.".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the username as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}
