//! Reservation expiry sweeper
//!
//! Reservations are never timed out by a background task. Their deadline is
//! data, and the sweeper removes lapsed holds whenever a request touches the
//! desk. Each removal leaves a `reservation_expired` audit event with the
//! reserving seller as actor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use raffle_audit::AuditRecorder;
use raffle_core::domain::AllocationError;
use raffle_core::ports::{IClock, IRaffleRepository, IUnitOfWork, StoreError};

use crate::txn::finish;

/// Deletes reservations whose `reserved_until` lies strictly in the past
#[derive(Clone)]
pub struct ExpirySweeper {
    repository: Arc<dyn IRaffleRepository>,
    clock: Arc<dyn IClock>,
    recorder: AuditRecorder,
}

impl ExpirySweeper {
    pub fn new(
        repository: Arc<dyn IRaffleRepository>,
        clock: Arc<dyn IClock>,
        recorder: AuditRecorder,
    ) -> Self {
        Self {
            repository,
            clock,
            recorder,
        }
    }

    /// Expire lapsed reservations in a transaction of their own.
    ///
    /// # Returns
    ///
    /// How many reservations were removed.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the write lock cannot be taken in time or the
    /// store fails; nothing is removed in that case.
    pub async fn sweep(&self) -> Result<usize, AllocationError> {
        self.sweep_at(self.clock.now()).await
    }

    /// Same as [`sweep`](Self::sweep) for a caller-supplied `now`.
    ///
    /// The write lock is only taken when a read finds lapsed rows, so an
    /// idle sweep never contends with writers. Whatever it removes stays
    /// removed even if the caller's own operation later fails.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, AllocationError> {
        if self.repository.count_expired_reservations(now).await? == 0 {
            return Ok(0);
        }

        let mut uow = self.repository.begin().await?;
        let result = self.sweep_in(uow.as_mut(), now).await.map_err(Into::into);
        finish("sweep", uow, result).await.map_err(|e| {
            tracing::error!(error = %e, "Reservation sweep failed");
            e
        })
    }

    /// Expire lapsed reservations inside an already-open unit of work.
    ///
    /// Allocation use cases call this after [`sweep_at`](Self::sweep_at) so
    /// their conflict checks see no hold that lapsed before `now`, even one
    /// that raced in between. Rows removed here share the caller's fate.
    pub async fn sweep_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let expired = uow.expired_reservations(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        for reservation in &expired {
            self.recorder.reservation_expired(uow, reservation).await?;
        }
        let ids: Vec<i64> = expired.iter().map(|r| r.id).collect();
        uow.delete_reservations(&ids).await?;

        tracing::info!(count = expired.len(), "Expired lapsed reservations");
        Ok(expired.len())
    }
}
