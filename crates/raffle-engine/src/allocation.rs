//! Allocation core: reserve, sell, edit, void and release
//!
//! Every public operation runs as exactly one `BEGIN IMMEDIATE` unit of work.
//! The write lock is held from the first read, so the conflict checks and the
//! writes that follow them cannot interleave with another writer. Any failure
//! mid-batch rolls back everything the call did, audit events included.
//! Lapsed holds are swept in a committed transaction of their own first, so
//! a rejected batch never resurrects them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use raffle_audit::AuditRecorder;
use raffle_core::domain::time::reservation_deadline;
use raffle_core::domain::{
    AllocationError, Buyer, Identity, Reservation, Sale, TicketBatch, TicketNumber, UserId,
};
use raffle_core::ports::{IClock, IRaffleRepository, IUnitOfWork};
use serde::Serialize;

use crate::sweeper::ExpirySweeper;
use crate::txn::{finish, log_rejection};

const EDIT_DENIED: &str = "You do not have permission to edit this sale.";
const VOID_DENIED: &str = "You do not have permission to void this sale.";
const RELEASE_DENIED: &str = "You do not have permission to release this reservation.";

/// Result of a successful [`AllocationEngine::reserve`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveOutcome {
    /// Numbers that got a new reservation
    pub created: Vec<TicketNumber>,
    /// Numbers the seller already held, with a moved deadline
    pub extended: Vec<TicketNumber>,
    /// Common deadline of every reservation touched by the call
    pub reserved_until: DateTime<Utc>,
    /// Lapsed reservations swept before the batch was evaluated
    pub expired: usize,
}

impl ReserveOutcome {
    /// Total numbers held by the seller after the call
    pub fn total(&self) -> usize {
        self.created.len() + self.extended.len()
    }
}

/// Result of a successful [`AllocationEngine::sell`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellOutcome {
    /// One sale per number, ascending
    pub sales: Vec<Sale>,
    /// Numbers that were converted from the seller's own reservation
    pub converted: Vec<TicketNumber>,
}

/// Performs every state change on ticket numbers
#[derive(Clone)]
pub struct AllocationEngine {
    repository: Arc<dyn IRaffleRepository>,
    clock: Arc<dyn IClock>,
    recorder: AuditRecorder,
    sweeper: ExpirySweeper,
    max_number: u32,
}

impl AllocationEngine {
    /// Creates a new AllocationEngine
    ///
    /// # Arguments
    ///
    /// * `repository` - Store that opens units of work
    /// * `clock` - Source of "now" for deadlines and sweeps
    /// * `recorder` - Audit recorder shared with the sweeper
    /// * `sweeper` - Expires lapsed holds before each batch is evaluated
    /// * `max_number` - Highest ticket number on sale
    pub fn new(
        repository: Arc<dyn IRaffleRepository>,
        clock: Arc<dyn IClock>,
        recorder: AuditRecorder,
        sweeper: ExpirySweeper,
        max_number: u32,
    ) -> Self {
        Self {
            repository,
            clock,
            recorder,
            sweeper,
            max_number,
        }
    }

    /// Highest ticket number accepted by this engine
    pub fn max_number(&self) -> u32 {
        self.max_number
    }

    /// Validate raw numbers into a batch for this raffle
    ///
    /// # Errors
    ///
    /// `Validation` for an empty selection or an out-of-range value
    pub fn batch<I>(&self, values: I) -> Result<TicketBatch, AllocationError>
    where
        I: IntoIterator<Item = i64>,
    {
        Ok(TicketBatch::new(values, self.max_number)?)
    }

    /// Validate a single raw number for this raffle
    ///
    /// # Errors
    ///
    /// `Validation` if the value is outside `1..=max_number`
    pub fn number(&self, value: i64) -> Result<TicketNumber, AllocationError> {
        Ok(TicketNumber::new(value, self.max_number)?)
    }

    /// Place or extend 15-minute holds on every number of `numbers`
    ///
    /// Numbers are evaluated in ascending order. A number the seller already
    /// holds is extended; a sold number or one held by another seller aborts
    /// the whole batch.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for superusers, `AlreadySold` or `AlreadyReserved`
    /// naming the first offending number, `ConstraintConflict` or
    /// `StoreUnavailable` on store failures.
    pub async fn reserve(
        &self,
        seller: &Identity,
        numbers: &TicketBatch,
    ) -> Result<ReserveOutcome, AllocationError> {
        let result = match seller.require_seller() {
            Ok(()) => {
                let now = self.clock.now();
                match self.sweeper.sweep_at(now).await {
                    Ok(swept) => match self.repository.begin().await {
                        Ok(mut uow) => {
                            let body = self
                                .reserve_in(uow.as_mut(), seller.user_id, numbers, now)
                                .await
                                .map(|mut outcome| {
                                    outcome.expired += swept;
                                    outcome
                                });
                            finish("reserve", uow, body).await
                        }
                        Err(e) => Err(e.into()),
                    },
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(outcome) => tracing::info!(
                seller_id = %seller.user_id,
                created = outcome.created.len(),
                extended = outcome.extended.len(),
                reserved_until = %outcome.reserved_until,
                "Reserved numbers"
            ),
            Err(e) => log_rejection("reserve", seller.user_id, e),
        }
        result
    }

    async fn reserve_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        seller_id: UserId,
        numbers: &TicketBatch,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, AllocationError> {
        let expired = self.sweeper.sweep_in(uow, now).await?;
        let reserved_until = reservation_deadline(now);
        let mut created = Vec::new();
        let mut extended = Vec::new();

        for number in numbers.iter() {
            if uow.sale(number).await?.is_some() {
                return Err(AllocationError::AlreadySold(number));
            }

            match uow.reservation(number).await? {
                Some(mut held) if held.seller_id == seller_id => {
                    uow.extend_reservation(number, reserved_until).await?;
                    held.reserved_until = reserved_until;
                    self.recorder.reservation_extended(uow, &held).await?;
                    extended.push(number);
                }
                Some(_) => return Err(AllocationError::AlreadyReserved(number)),
                None => {
                    let reservation = uow
                        .insert_reservation(number, seller_id, now, reserved_until)
                        .await?;
                    self.recorder.reservation_created(uow, &reservation).await?;
                    created.push(number);
                }
            }
        }

        Ok(ReserveOutcome {
            created,
            extended,
            reserved_until,
            expired,
        })
    }

    /// Sell every number of `numbers` to one buyer
    ///
    /// All numbers are checked before anything is written: a sold number or
    /// one held by another seller aborts the batch. The seller's own holds
    /// on the sold numbers are removed.
    ///
    /// # Errors
    ///
    /// `Validation` for blank buyer details, `PermissionDenied` for
    /// superusers, `AlreadySold` or `ReservedByOther` naming the first
    /// offending number, `ConstraintConflict` or `StoreUnavailable` on store
    /// failures.
    pub async fn sell(
        &self,
        seller: &Identity,
        numbers: &TicketBatch,
        buyer_name: &str,
        buyer_phone: &str,
    ) -> Result<SellOutcome, AllocationError> {
        let result = match (seller.require_seller(), Buyer::new(buyer_name, buyer_phone)) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e.into()),
            (Ok(()), Ok(buyer)) => {
                let now = self.clock.now();
                match self.sweeper.sweep_at(now).await {
                    Ok(_) => match self.repository.begin().await {
                        Ok(mut uow) => {
                            let body = self
                                .sell_in(uow.as_mut(), seller.user_id, numbers, &buyer, now)
                                .await;
                            finish("sell", uow, body).await
                        }
                        Err(e) => Err(e.into()),
                    },
                    Err(e) => Err(e),
                }
            }
        };

        match &result {
            Ok(outcome) => tracing::info!(
                seller_id = %seller.user_id,
                sold = outcome.sales.len(),
                converted = outcome.converted.len(),
                "Sold numbers"
            ),
            Err(e) => log_rejection("sell", seller.user_id, e),
        }
        result
    }

    async fn sell_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        seller_id: UserId,
        numbers: &TicketBatch,
        buyer: &Buyer,
        now: DateTime<Utc>,
    ) -> Result<SellOutcome, AllocationError> {
        self.sweeper.sweep_in(uow, now).await?;

        let mut converted = Vec::new();
        for number in numbers.iter() {
            if uow.sale(number).await?.is_some() {
                return Err(AllocationError::AlreadySold(number));
            }
            if let Some(held) = uow.reservation(number).await? {
                if held.seller_id != seller_id {
                    return Err(AllocationError::ReservedByOther(number));
                }
                converted.push(number);
            }
        }

        let mut sales = Vec::with_capacity(numbers.len());
        for number in numbers.iter() {
            let sale = uow.insert_sale(number, seller_id, buyer, now).await?;
            uow.delete_reservation(number).await?;
            self.recorder.sale_created(uow, &sale).await?;
            sales.push(sale);
        }

        Ok(SellOutcome { sales, converted })
    }

    /// Replace the buyer details of a sale
    ///
    /// # Errors
    ///
    /// `Validation` for blank buyer details, `NotFound` if the number is not
    /// sold, `PermissionDenied` unless the actor owns the sale or is a
    /// superuser.
    pub async fn edit_sale(
        &self,
        actor: &Identity,
        number: TicketNumber,
        buyer_name: &str,
        buyer_phone: &str,
    ) -> Result<Sale, AllocationError> {
        let result = match Buyer::new(buyer_name, buyer_phone) {
            Err(e) => Err(e.into()),
            Ok(buyer) => match self.repository.begin().await {
                Ok(mut uow) => {
                    let body = self.edit_sale_in(uow.as_mut(), actor, number, buyer).await;
                    finish("edit_sale", uow, body).await
                }
                Err(e) => Err(e.into()),
            },
        };

        match &result {
            Ok(sale) => tracing::info!(
                actor_id = %actor.user_id,
                seller_id = %sale.seller_id,
                number = number.get(),
                "Edited sale"
            ),
            Err(e) => log_rejection("edit_sale", actor.user_id, e),
        }
        result
    }

    async fn edit_sale_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor: &Identity,
        number: TicketNumber,
        buyer: Buyer,
    ) -> Result<Sale, AllocationError> {
        let before = uow
            .sale(number)
            .await?
            .ok_or_else(|| AllocationError::NotFound("Sale".to_string()))?;
        if !actor.can_manage(before.seller_id) {
            return Err(AllocationError::PermissionDenied(EDIT_DENIED.to_string()));
        }

        uow.update_sale_buyer(number, &buyer).await?;
        self.recorder
            .sale_edited(uow, actor.user_id, &before, &buyer)
            .await?;

        Ok(Sale { buyer, ..before })
    }

    /// Remove a sale, making its number available again
    ///
    /// # Returns
    ///
    /// The removed sale
    ///
    /// # Errors
    ///
    /// `NotFound` if the number is not sold, `PermissionDenied` unless the
    /// actor owns the sale or is a superuser.
    pub async fn void_sale(
        &self,
        actor: &Identity,
        number: TicketNumber,
    ) -> Result<Sale, AllocationError> {
        let result = match self.repository.begin().await {
            Ok(mut uow) => {
                let body = self.void_sale_in(uow.as_mut(), actor, number).await;
                finish("void_sale", uow, body).await
            }
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(sale) => tracing::info!(
                actor_id = %actor.user_id,
                seller_id = %sale.seller_id,
                number = number.get(),
                "Voided sale"
            ),
            Err(e) => log_rejection("void_sale", actor.user_id, e),
        }
        result
    }

    async fn void_sale_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor: &Identity,
        number: TicketNumber,
    ) -> Result<Sale, AllocationError> {
        let sale = uow
            .sale(number)
            .await?
            .ok_or_else(|| AllocationError::NotFound("Sale".to_string()))?;
        if !actor.can_manage(sale.seller_id) {
            return Err(AllocationError::PermissionDenied(VOID_DENIED.to_string()));
        }

        uow.delete_sale(number).await?;
        self.recorder.sale_voided(uow, actor.user_id, &sale).await?;
        Ok(sale)
    }

    /// Drop a hold before it expires
    ///
    /// The sweep runs first, so a hold that has already lapsed is reported
    /// as `NotFound` and audited as expired rather than released.
    ///
    /// # Errors
    ///
    /// `NotFound` if the number is not reserved, `PermissionDenied` unless
    /// the actor owns the hold or is a superuser.
    pub async fn release_reservation(
        &self,
        actor: &Identity,
        number: TicketNumber,
    ) -> Result<Reservation, AllocationError> {
        let now = self.clock.now();
        let result = match self.sweeper.sweep_at(now).await {
            Ok(_) => match self.repository.begin().await {
                Ok(mut uow) => {
                    let body = self.release_in(uow.as_mut(), actor, number, now).await;
                    finish("release_reservation", uow, body).await
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };

        match &result {
            Ok(reservation) => tracing::info!(
                actor_id = %actor.user_id,
                seller_id = %reservation.seller_id,
                number = number.get(),
                "Released reservation"
            ),
            Err(e) => log_rejection("release_reservation", actor.user_id, e),
        }
        result
    }

    async fn release_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor: &Identity,
        number: TicketNumber,
        now: DateTime<Utc>,
    ) -> Result<Reservation, AllocationError> {
        self.sweeper.sweep_in(uow, now).await?;

        let reservation = uow
            .reservation(number)
            .await?
            .ok_or_else(|| AllocationError::NotFound("Reservation".to_string()))?;
        if !actor.can_manage(reservation.seller_id) {
            return Err(AllocationError::PermissionDenied(RELEASE_DENIED.to_string()));
        }

        uow.delete_reservation(number).await?;
        self.recorder
            .reservation_released(uow, actor.user_id, &reservation)
            .await?;
        Ok(reservation)
    }
}
