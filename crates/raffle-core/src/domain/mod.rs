//! Domain entities and business logic
//!
//! This module contains the core domain types for the raffle desk:
//! - Newtypes for identifiers and validated ticket numbers
//! - Sales and reservations
//! - Users, roles and the authenticated identity
//! - Audit events recorded for every state change
//! - Domain and allocation error types

pub mod audit;
pub mod errors;
pub mod newtypes;
pub mod ticket;
pub mod time;
pub mod user;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEvent, NewAuditEvent};
pub use errors::{AllocationError, DomainError};
pub use newtypes::*;
pub use ticket::{Buyer, Reservation, Sale};
pub use time::HOLD_DURATION_MINUTES;
pub use user::{Identity, Role, User};
