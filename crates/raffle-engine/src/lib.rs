//! Raffle Engine - Use cases of the raffle desk
//!
//! Provides:
//! - `AllocationEngine`: reserve, sell, edit, void and release
//! - `ExpirySweeper`: lazy expiry of lapsed reservations
//! - `AccountService`: login, superuser bootstrap and seller management
//! - `ReportingService`: dashboards, number lookup, audit search, CSV export
//!
//! Every use case takes the caller's [`Identity`] explicitly and talks to the
//! store only through the `IRaffleRepository` / `IUnitOfWork` ports.
//!
//! [`Identity`]: raffle_core::domain::Identity

pub mod accounts;
pub mod allocation;
pub mod export;
pub mod password;
pub mod reporting;
pub mod sweeper;

mod txn;

use std::sync::Arc;

use raffle_audit::AuditRecorder;
use raffle_core::config::RaffleConfig;
use raffle_core::ports::{IClock, IRaffleRepository};

pub use accounts::AccountService;
pub use allocation::{AllocationEngine, ReserveOutcome, SellOutcome};
pub use export::{CsvExport, CONTENT_DISPOSITION, EXPORT_FILENAME};
pub use password::{PasswordError, PasswordHasher};
pub use reporting::{
    AdminDashboard, AuditFilterOptions, AuditPage, NumberCell, NumberState, NumberStatus,
    ReportingService, SellerDashboard, Totals,
};
pub use sweeper::ExpirySweeper;

/// All use cases wired to one repository and one clock
#[derive(Clone)]
pub struct RaffleDesk {
    pub allocation: AllocationEngine,
    pub accounts: AccountService,
    pub reporting: ReportingService,
    pub sweeper: ExpirySweeper,
}

impl RaffleDesk {
    /// Wire the use cases with the default password hasher
    pub fn new(
        repository: Arc<dyn IRaffleRepository>,
        clock: Arc<dyn IClock>,
        config: &RaffleConfig,
    ) -> Self {
        Self::with_hasher(repository, clock, config, PasswordHasher::new())
    }

    /// Wire the use cases with an explicit password hasher
    pub fn with_hasher(
        repository: Arc<dyn IRaffleRepository>,
        clock: Arc<dyn IClock>,
        config: &RaffleConfig,
        hasher: PasswordHasher,
    ) -> Self {
        let recorder = AuditRecorder::new(Arc::clone(&clock));
        let sweeper = ExpirySweeper::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            recorder.clone(),
        );
        let allocation = AllocationEngine::new(
            Arc::clone(&repository),
            Arc::clone(&clock),
            recorder.clone(),
            sweeper.clone(),
            config.max_number,
        );
        let accounts = AccountService::new(
            Arc::clone(&repository),
            clock,
            recorder,
            sweeper.clone(),
            hasher,
        );
        let reporting = ReportingService::new(repository, sweeper.clone(), config.clone());

        Self {
            allocation,
            accounts,
            reporting,
            sweeper,
        }
    }
}
