//! AuditRecorder - transactional audit trail
//!
//! Wraps `IUnitOfWork::append_audit()` with one typed method per auditable
//! action, so callers cannot misspell action names or detail keys. Every
//! method writes into a unit of work the caller already opened and never
//! commits on its own. Errors are propagated: a failed append must abort the
//! surrounding operation, otherwise a state change could commit without its
//! audit event.

use std::sync::Arc;

use raffle_core::{
    domain::{
        newtypes::{AuditId, TicketNumber, UserId},
        time::format_timestamp,
        AuditAction, Buyer, NewAuditEvent, Reservation, Sale, User,
    },
    ports::{IClock, IUnitOfWork, StoreError},
};
use serde_json::{json, Value};

/// Records audit events inside an open unit of work.
///
/// `created_at` of every event comes from the injected clock.
#[derive(Clone)]
pub struct AuditRecorder {
    clock: Arc<dyn IClock>,
}

impl AuditRecorder {
    /// Creates a new `AuditRecorder` stamping events with `clock`.
    pub fn new(clock: Arc<dyn IClock>) -> Self {
        Self { clock }
    }

    /// Append one event with an arbitrary action and payload.
    ///
    /// Prefer the typed helpers below; this is the primitive they share.
    pub async fn record(
        &self,
        uow: &mut dyn IUnitOfWork,
        action: AuditAction,
        actor_id: UserId,
        number: Option<TicketNumber>,
        seller_id: Option<UserId>,
        details: Option<Value>,
    ) -> Result<AuditId, StoreError> {
        let mut event = NewAuditEvent::new(action, actor_id, self.clock.now());
        if let Some(number) = number {
            event = event.with_number(number);
        }
        if let Some(seller_id) = seller_id {
            event = event.with_seller(seller_id);
        }
        if let Some(details) = details {
            event = event.with_details(details);
        }

        let id = uow.append_audit(&event).await?;
        tracing::debug!(
            audit_id = %id,
            action = %action,
            actor_id = %actor_id,
            number = number.map(|n| n.get()),
            "Recorded audit event"
        );
        Ok(id)
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// A seller placed a new hold.
    pub async fn reservation_created(
        &self,
        uow: &mut dyn IUnitOfWork,
        reservation: &Reservation,
    ) -> Result<AuditId, StoreError> {
        self.reservation_event(uow, AuditAction::ReservationCreate, reservation.seller_id, reservation)
            .await
    }

    /// A seller re-reserved a number they already held.
    ///
    /// `reservation` must carry the new `reserved_until`.
    pub async fn reservation_extended(
        &self,
        uow: &mut dyn IUnitOfWork,
        reservation: &Reservation,
    ) -> Result<AuditId, StoreError> {
        self.reservation_event(uow, AuditAction::ReservationExtend, reservation.seller_id, reservation)
            .await
    }

    /// A hold was released by its owner or a superuser.
    pub async fn reservation_released(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor_id: UserId,
        reservation: &Reservation,
    ) -> Result<AuditId, StoreError> {
        self.reservation_event(uow, AuditAction::ReservationRelease, actor_id, reservation)
            .await
    }

    /// A lapsed hold was swept. The reserving seller is the actor.
    pub async fn reservation_expired(
        &self,
        uow: &mut dyn IUnitOfWork,
        reservation: &Reservation,
    ) -> Result<AuditId, StoreError> {
        self.reservation_event(uow, AuditAction::ReservationExpired, reservation.seller_id, reservation)
            .await
    }

    async fn reservation_event(
        &self,
        uow: &mut dyn IUnitOfWork,
        action: AuditAction,
        actor_id: UserId,
        reservation: &Reservation,
    ) -> Result<AuditId, StoreError> {
        self.record(
            uow,
            action,
            actor_id,
            Some(reservation.number),
            Some(reservation.seller_id),
            Some(json!({
                "reserved_until": format_timestamp(reservation.reserved_until),
            })),
        )
        .await
    }

    // ========================================================================
    // Sales
    // ========================================================================

    /// A number was sold. The selling seller is the actor.
    pub async fn sale_created(
        &self,
        uow: &mut dyn IUnitOfWork,
        sale: &Sale,
    ) -> Result<AuditId, StoreError> {
        self.record(
            uow,
            AuditAction::SaleCreate,
            sale.seller_id,
            Some(sale.number),
            Some(sale.seller_id),
            Some(sale_snapshot(sale)),
        )
        .await
    }

    /// Buyer details changed from `before` to `after`.
    pub async fn sale_edited(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor_id: UserId,
        before: &Sale,
        after: &Buyer,
    ) -> Result<AuditId, StoreError> {
        self.record(
            uow,
            AuditAction::SaleEdit,
            actor_id,
            Some(before.number),
            Some(before.seller_id),
            Some(json!({
                "before": buyer_json(&before.buyer),
                "after": buyer_json(after),
            })),
        )
        .await
    }

    /// A sale was voided; `sale` is the removed row.
    pub async fn sale_voided(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor_id: UserId,
        sale: &Sale,
    ) -> Result<AuditId, StoreError> {
        self.record(
            uow,
            AuditAction::SaleVoid,
            actor_id,
            Some(sale.number),
            Some(sale.seller_id),
            Some(sale_snapshot(sale)),
        )
        .await
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// A superuser created a seller account.
    pub async fn seller_created(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor_id: UserId,
        seller: &User,
    ) -> Result<AuditId, StoreError> {
        self.account_event(uow, AuditAction::SellerCreate, actor_id, seller)
            .await
    }

    /// A superuser deleted a seller account.
    pub async fn seller_deleted(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor_id: UserId,
        seller: &User,
    ) -> Result<AuditId, StoreError> {
        self.account_event(uow, AuditAction::SellerDelete, actor_id, seller)
            .await
    }

    /// The first superuser was created. It is its own actor.
    pub async fn superuser_bootstrapped(
        &self,
        uow: &mut dyn IUnitOfWork,
        superuser: &User,
    ) -> Result<AuditId, StoreError> {
        self.account_event(uow, AuditAction::SuperuserBootstrap, superuser.id, superuser)
            .await
    }

    async fn account_event(
        &self,
        uow: &mut dyn IUnitOfWork,
        action: AuditAction,
        actor_id: UserId,
        subject: &User,
    ) -> Result<AuditId, StoreError> {
        self.record(
            uow,
            action,
            actor_id,
            None,
            Some(subject.id),
            Some(json!({ "username": subject.username.as_str() })),
        )
        .await
    }
}

fn buyer_json(buyer: &Buyer) -> Value {
    json!({
        "buyer_name": buyer.name(),
        "buyer_phone": buyer.phone(),
    })
}

fn sale_snapshot(sale: &Sale) -> Value {
    json!({
        "buyer_name": sale.buyer.name(),
        "buyer_phone": sale.buyer.phone(),
        "sold_at": format_timestamp(sale.sold_at),
    })
}
