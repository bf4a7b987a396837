//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the use cases depend on,
//! but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRaffleRepository`] - Read queries and the entry point for writes
//! - [`IUnitOfWork`] - One open write transaction (mutations + audit append)
//! - [`IClock`] - Source of the current time

pub mod clock;
pub mod repository;

pub use clock::{IClock, ManualClock, SystemClock};
pub use repository::{
    AuditFilter, AuditRecord, Holdings, IRaffleRepository, IUnitOfWork, RangeSnapshot,
    ReservationView, SaleView, SellerOrder, SellerStats, StoreError,
};
