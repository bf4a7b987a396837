//! Raffle Core - Domain types and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Sale`, `Reservation`, `AuditEvent`, `User`, `Identity`
//! - **Validated values** - `TicketNumber`, `TicketBatch`, `Buyer`, `Username`
//! - **Port definitions** - `IRaffleRepository`, `IUnitOfWork` and `IClock`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure business types with no I/O. Ports define
//! the trait interfaces that the SQLite adapter (`raffle-store`) implements,
//! and the use cases in `raffle-engine` orchestrate domain types through them.

pub mod config;
pub mod domain;
pub mod ports;
