//! Raffle Audit - Transactional audit trail
//!
//! Provides:
//! - `AuditRecorder`: Appends one typed audit event per state change, inside
//!   the caller's unit of work
//! - `ReasonCode`: Structured reason codes for rejected operations

pub mod reason;
pub mod recorder;

pub use reason::ReasonCode;
pub use recorder::AuditRecorder;
