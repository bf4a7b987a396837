//! Integration tests for the allocation core and the expiry sweeper
//!
//! Each test builds a fresh in-memory database, a manual clock and a fully
//! wired `RaffleDesk`, then drives it through the public use cases only.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use raffle_core::config::RaffleConfig;
use raffle_core::domain::{AllocationError, AuditAction, DomainError, Identity, TicketNumber};
use raffle_core::ports::{AuditFilter, IRaffleRepository, ManualClock};
use raffle_engine::{PasswordHasher, RaffleDesk};
use raffle_store::{DatabasePool, SqliteRaffleRepository};
use serde_json::json;

// ============================================================================
// Test helpers
// ============================================================================

struct Harness {
    desk: RaffleDesk,
    repo: Arc<SqliteRaffleRepository>,
    clock: Arc<ManualClock>,
    admin: Identity,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()
}

fn n(value: i64) -> TicketNumber {
    TicketNumber::new(value, 100_000).unwrap()
}

async fn setup() -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteRaffleRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(t0()));
    let desk = RaffleDesk::with_hasher(
        repo.clone(),
        clock.clone(),
        &RaffleConfig::default(),
        PasswordHasher::with_costs(8, 1, 1).unwrap(),
    );
    let admin = desk
        .accounts
        .bootstrap_superuser("admin", "changeme")
        .await
        .unwrap()
        .expect("fresh database has no superuser")
        .identity();
    Harness {
        desk,
        repo,
        clock,
        admin,
    }
}

async fn seller(h: &Harness, name: &str) -> Identity {
    h.desk
        .accounts
        .create_seller(&h.admin, name, "secret1")
        .await
        .unwrap()
        .identity()
}

async fn count_events(h: &Harness, action: AuditAction) -> u64 {
    h.repo
        .count_audit(&AuditFilter::new().with_action(action))
        .await
        .unwrap()
}

// ============================================================================
// Reserve
// ============================================================================

#[tokio::test]
async fn test_reserve_creates_holds_with_deadline() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;

    let batch = h.desk.allocation.batch([3, 1, 2]).unwrap();
    let outcome = h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    assert_eq!(outcome.created, vec![n(1), n(2), n(3)]);
    assert!(outcome.extended.is_empty());
    assert_eq!(outcome.reserved_until, t0() + Duration::minutes(15));
    assert_eq!(outcome.total(), 3);

    let view = h.repo.reservation_view(n(2)).await.unwrap().unwrap();
    assert_eq!(view.reservation.seller_id, alice.user_id);
    assert_eq!(view.reservation.reserved_at, t0());
    assert_eq!(count_events(&h, AuditAction::ReservationCreate).await, 3);
}

#[tokio::test]
async fn test_reserve_by_other_seller_is_rejected() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let batch = h.desk.allocation.batch([5]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    let err = h.desk.allocation.reserve(&bob, &batch).await.unwrap_err();
    assert_eq!(err, AllocationError::AlreadyReserved(n(5)));
    assert!(err.is_conflict());

    let view = h.repo.reservation_view(n(5)).await.unwrap().unwrap();
    assert_eq!(view.reservation.seller_id, alice.user_id);
    assert_eq!(count_events(&h, AuditAction::ReservationCreate).await, 1);
}

#[tokio::test]
async fn test_reserve_twice_extends() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([5]).unwrap();

    h.desk.allocation.reserve(&alice, &batch).await.unwrap();
    h.clock.advance(Duration::minutes(10));
    let outcome = h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    assert!(outcome.created.is_empty());
    assert_eq!(outcome.extended, vec![n(5)]);
    assert_eq!(outcome.reserved_until, t0() + Duration::minutes(25));

    let reservations = h.repo.reservations_for_seller(alice.user_id).await.unwrap();
    assert_eq!(reservations.len(), 1, "no duplicate reservation row");
    assert_eq!(reservations[0].reserved_until, t0() + Duration::minutes(25));
    assert_eq!(reservations[0].reserved_at, t0());

    let extends = h
        .repo
        .search_audit(&AuditFilter::new().with_action(AuditAction::ReservationExtend), 10, 0)
        .await
        .unwrap();
    assert_eq!(extends.len(), 1);
    assert_eq!(extends[0].event.number, Some(n(5)));
    assert_eq!(
        extends[0].event.details.as_ref().unwrap()["reserved_until"],
        json!("2026-04-01T10:25:00.000000Z")
    );
}

#[tokio::test]
async fn test_reserve_batch_is_all_or_nothing() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let held = h.desk.allocation.batch([4]).unwrap();
    h.desk.allocation.reserve(&bob, &held).await.unwrap();

    let batch = h.desk.allocation.batch([2, 3, 4, 5]).unwrap();
    let err = h.desk.allocation.reserve(&alice, &batch).await.unwrap_err();
    assert_eq!(err, AllocationError::AlreadyReserved(n(4)));

    for number in [2, 3, 5] {
        assert!(h.repo.reservation_view(n(number)).await.unwrap().is_none());
    }
    assert_eq!(count_events(&h, AuditAction::ReservationCreate).await, 1);
}

#[tokio::test]
async fn test_reserve_sold_number_is_rejected() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([8]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &batch, "Bob", "555-1111")
        .await
        .unwrap();

    let err = h.desk.allocation.reserve(&alice, &batch).await.unwrap_err();
    assert_eq!(err, AllocationError::AlreadySold(n(8)));
}

#[tokio::test]
async fn test_superuser_cannot_reserve_or_sell() {
    let h = setup().await;
    let batch = h.desk.allocation.batch([1]).unwrap();

    let err = h.desk.allocation.reserve(&h.admin, &batch).await.unwrap_err();
    assert!(matches!(err, AllocationError::PermissionDenied(_)));
    let err = h
        .desk
        .allocation
        .sell(&h.admin, &batch, "Bob", "555")
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_batch_validation() {
    let h = setup().await;
    assert_eq!(
        h.desk.allocation.batch(Vec::<i64>::new()).unwrap_err(),
        AllocationError::Validation(DomainError::EmptySelection)
    );
    assert!(matches!(
        h.desk.allocation.batch([1, 100_001]).unwrap_err(),
        AllocationError::Validation(DomainError::NumberOutOfRange { value: 100_001, .. })
    ));
    assert!(h.desk.allocation.number(0).is_err());
}

// ============================================================================
// Sell
// ============================================================================

#[tokio::test]
async fn test_sell_records_sales_and_audit() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;

    let batch = h.desk.allocation.batch([10, 11]).unwrap();
    let outcome = h
        .desk
        .allocation
        .sell(&alice, &batch, "  Bob  ", " 555-1111 ")
        .await
        .unwrap();

    assert_eq!(outcome.sales.len(), 2);
    assert!(outcome.converted.is_empty());
    assert_eq!(outcome.sales[0].buyer.name(), "Bob");
    assert_eq!(outcome.sales[0].sold_at, t0());

    let events = h
        .repo
        .search_audit(&AuditFilter::new().with_action(AuditAction::SaleCreate), 10, 0)
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    let details = events[0].event.details.as_ref().unwrap();
    assert_eq!(details["buyer_name"], json!("Bob"));
    assert_eq!(details["buyer_phone"], json!("555-1111"));
    assert_eq!(events[0].event.seller_id, Some(alice.user_id));
}

#[tokio::test]
async fn test_sell_converts_own_reservation() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([20, 21]).unwrap();
    let held = h.desk.allocation.batch([20]).unwrap();

    h.desk.allocation.reserve(&alice, &held).await.unwrap();
    let outcome = h
        .desk
        .allocation
        .sell(&alice, &batch, "Bob", "555")
        .await
        .unwrap();

    assert_eq!(outcome.converted, vec![n(20)]);
    assert!(h.repo.reservation_view(n(20)).await.unwrap().is_none());
    assert!(h.repo.sale_view(n(20)).await.unwrap().is_some());
    assert_eq!(h.repo.count_reservations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sell_with_one_sold_number_aborts_batch() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;

    let six = h.desk.allocation.batch([6]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &six, "Carol", "555-2222")
        .await
        .unwrap();

    let batch = h.desk.allocation.batch([5, 6]).unwrap();
    let err = h
        .desk
        .allocation
        .sell(&alice, &batch, "Bob", "555-1111")
        .await
        .unwrap_err();
    assert_eq!(err, AllocationError::AlreadySold(n(6)));

    assert!(h.repo.sale_view(n(5)).await.unwrap().is_none());
    assert!(h.repo.reservation_view(n(5)).await.unwrap().is_none());
    assert_eq!(count_events(&h, AuditAction::SaleCreate).await, 1);
}

#[tokio::test]
async fn test_sell_reserved_by_other_is_rejected() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([30]).unwrap();

    h.desk.allocation.reserve(&alice, &batch).await.unwrap();
    let err = h
        .desk
        .allocation
        .sell(&bob, &batch, "Dan", "555")
        .await
        .unwrap_err();
    assert_eq!(err, AllocationError::ReservedByOther(n(30)));
    assert!(h.repo.sale_view(n(30)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sell_requires_buyer_details() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([1]).unwrap();

    let err = h
        .desk
        .allocation
        .sell(&alice, &batch, "Bob", "   ")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AllocationError::Validation(DomainError::MissingBuyerDetails)
    );
    assert_eq!(h.repo.count_sales().await.unwrap(), 0);
}

// ============================================================================
// Edit, void, release
// ============================================================================

#[tokio::test]
async fn test_edit_sale_by_owner_and_superuser() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([40]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &batch, "Bob", "555-1111")
        .await
        .unwrap();

    let edited = h
        .desk
        .allocation
        .edit_sale(&alice, n(40), "Robert", "555-9999")
        .await
        .unwrap();
    assert_eq!(edited.buyer.name(), "Robert");
    assert_eq!(edited.seller_id, alice.user_id);

    let err = h
        .desk
        .allocation
        .edit_sale(&bob, n(40), "Mallory", "555")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You do not have permission to edit this sale."
    );

    h.desk
        .allocation
        .edit_sale(&h.admin, n(40), "Roberta", "555-0000")
        .await
        .unwrap();
    let view = h.repo.sale_view(n(40)).await.unwrap().unwrap();
    assert_eq!(view.sale.buyer.name(), "Roberta");

    let edits = h
        .repo
        .search_audit(&AuditFilter::new().with_action(AuditAction::SaleEdit), 10, 0)
        .await
        .unwrap();
    assert_eq!(edits.len(), 2);
    let first = edits
        .iter()
        .find(|r| r.event.actor_id == alice.user_id)
        .unwrap();
    assert_eq!(
        first.event.details.as_ref().unwrap(),
        &json!({
            "before": {"buyer_name": "Bob", "buyer_phone": "555-1111"},
            "after": {"buyer_name": "Robert", "buyer_phone": "555-9999"},
        })
    );
    let by_admin = edits
        .iter()
        .find(|r| r.event.actor_id == h.admin.user_id)
        .unwrap();
    assert_eq!(by_admin.event.seller_id, Some(alice.user_id));
}

#[tokio::test]
async fn test_edit_missing_sale_is_not_found() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let err = h
        .desk
        .allocation
        .edit_sale(&alice, n(1), "Bob", "555")
        .await
        .unwrap_err();
    assert_eq!(err, AllocationError::NotFound("Sale".to_string()));
    assert_eq!(err.to_string(), "Sale not found.");
}

#[tokio::test]
async fn test_void_sale_frees_number() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([50]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &batch, "Bob", "555-1111")
        .await
        .unwrap();

    let voided = h.desk.allocation.void_sale(&alice, n(50)).await.unwrap();
    assert_eq!(voided.number, n(50));
    assert!(h.repo.sale_view(n(50)).await.unwrap().is_none());

    let voids = h
        .repo
        .search_audit(&AuditFilter::new().with_action(AuditAction::SaleVoid), 10, 0)
        .await
        .unwrap();
    assert_eq!(voids.len(), 1);
    let details = voids[0].event.details.as_ref().unwrap();
    assert_eq!(details["buyer_name"], json!("Bob"));
    assert_eq!(details["buyer_phone"], json!("555-1111"));
    assert_eq!(details["sold_at"], json!("2026-04-01T10:00:00.000000Z"));

    // The number can be sold again
    h.desk
        .allocation
        .sell(&alice, &batch, "Carol", "555")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_void_by_other_seller_is_denied() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([51]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &batch, "Bob", "555")
        .await
        .unwrap();

    let err = h.desk.allocation.void_sale(&bob, n(51)).await.unwrap_err();
    assert!(matches!(err, AllocationError::PermissionDenied(_)));
    assert!(h.repo.sale_view(n(51)).await.unwrap().is_some());
    assert_eq!(count_events(&h, AuditAction::SaleVoid).await, 0);

    h.desk.allocation.void_sale(&h.admin, n(51)).await.unwrap();
    assert_eq!(
        h.desk.allocation.void_sale(&h.admin, n(51)).await.unwrap_err(),
        AllocationError::NotFound("Sale".to_string())
    );
}

#[tokio::test]
async fn test_release_reservation() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([60, 61]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    let err = h
        .desk
        .allocation
        .release_reservation(&bob, n(60))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "You do not have permission to release this reservation."
    );

    let released = h
        .desk
        .allocation
        .release_reservation(&alice, n(60))
        .await
        .unwrap();
    assert_eq!(released.seller_id, alice.user_id);
    h.desk
        .allocation
        .release_reservation(&h.admin, n(61))
        .await
        .unwrap();

    assert_eq!(h.repo.count_reservations().await.unwrap(), 0);
    assert_eq!(count_events(&h, AuditAction::ReservationRelease).await, 2);
    assert_eq!(
        h.desk
            .allocation
            .release_reservation(&alice, n(60))
            .await
            .unwrap_err(),
        AllocationError::NotFound("Reservation".to_string())
    );
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn test_sweep_expires_lapsed_reservation() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([10]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    // Exactly at the deadline the hold is still live
    h.clock.advance(Duration::minutes(15));
    assert_eq!(h.desk.sweeper.sweep().await.unwrap(), 0);

    h.clock.advance(Duration::seconds(1));
    assert_eq!(h.desk.sweeper.sweep().await.unwrap(), 1);
    assert!(h.repo.reservation_view(n(10)).await.unwrap().is_none());

    let expired = h
        .repo
        .search_audit(
            &AuditFilter::new().with_action(AuditAction::ReservationExpired),
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].event.actor_id, alice.user_id);
    assert_eq!(expired[0].event.seller_id, Some(alice.user_id));

    let outcome = h.desk.allocation.reserve(&bob, &batch).await.unwrap();
    assert_eq!(outcome.created, vec![n(10)]);
}

#[tokio::test]
async fn test_allocation_sweeps_before_checking_conflicts() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([12]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    h.clock.advance(Duration::minutes(20));
    let outcome = h
        .desk
        .allocation
        .sell(&bob, &batch, "Eve", "555")
        .await
        .unwrap();
    assert_eq!(outcome.sales[0].seller_id, bob.user_id);
    assert!(outcome.converted.is_empty());
    assert_eq!(count_events(&h, AuditAction::ReservationExpired).await, 1);
}

#[tokio::test]
async fn test_release_of_lapsed_hold_is_not_found() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([70]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    h.clock.advance(Duration::minutes(30));
    let err = h
        .desk
        .allocation
        .release_reservation(&alice, n(70))
        .await
        .unwrap_err();
    assert_eq!(err, AllocationError::NotFound("Reservation".to_string()));
    assert_eq!(count_events(&h, AuditAction::ReservationExpired).await, 1);
    assert_eq!(count_events(&h, AuditAction::ReservationRelease).await, 0);
}

#[tokio::test]
async fn test_rejected_sale_keeps_expiry_of_lapsed_hold() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let held = h.desk.allocation.batch([70]).unwrap();
    h.desk.allocation.reserve(&alice, &held).await.unwrap();
    let sold = h.desk.allocation.batch([71]).unwrap();
    h.desk
        .allocation
        .sell(&bob, &sold, "Ana", "555")
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(30));
    let both = h.desk.allocation.batch([70, 71]).unwrap();
    let err = h
        .desk
        .allocation
        .sell(&bob, &both, "Ana", "555")
        .await
        .unwrap_err();

    assert_eq!(err, AllocationError::AlreadySold(n(71)));
    assert_eq!(h.repo.count_reservations().await.unwrap(), 0);
    assert_eq!(count_events(&h, AuditAction::ReservationExpired).await, 1);
    assert_eq!(count_events(&h, AuditAction::SaleCreate).await, 1);
}

#[tokio::test]
async fn test_rejected_reserve_keeps_expiry_of_lapsed_hold() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    h.desk
        .allocation
        .reserve(&alice, &h.desk.allocation.batch([80]).unwrap())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));
    h.desk
        .allocation
        .reserve(&bob, &h.desk.allocation.batch([81]).unwrap())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(10));
    let err = h
        .desk
        .allocation
        .reserve(&alice, &h.desk.allocation.batch([80, 81]).unwrap())
        .await
        .unwrap_err();

    assert_eq!(err, AllocationError::AlreadyReserved(n(81)));
    assert!(h.repo.reservation_view(n(80)).await.unwrap().is_none());
    assert_eq!(h.repo.count_reservations().await.unwrap(), 1);
    assert_eq!(count_events(&h, AuditAction::ReservationExpired).await, 1);
}

#[tokio::test]
async fn test_sweep_without_lapsed_holds_is_noop() {
    let h = setup().await;
    let before = h.repo.count_audit(&AuditFilter::new()).await.unwrap();
    assert_eq!(h.desk.sweeper.sweep().await.unwrap(), 0);
    assert_eq!(h.repo.count_audit(&AuditFilter::new()).await.unwrap(), before);
}

// ============================================================================
// Invariant: never both sold and reserved
// ============================================================================

#[tokio::test]
async fn test_number_never_both_sold_and_reserved() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let a = h.desk.allocation.batch(1..=10).unwrap();
    let b = h.desk.allocation.batch(5..=15).unwrap();
    h.desk.allocation.reserve(&alice, &a).await.unwrap();
    let _ = h.desk.allocation.sell(&bob, &b, "Zed", "555").await;
    let c = h.desk.allocation.batch(11..=15).unwrap();
    h.desk.allocation.sell(&bob, &c, "Zed", "555").await.unwrap();
    let _ = h.desk.allocation.reserve(&alice, &b).await;
    let d = h.desk.allocation.batch(1..=4).unwrap();
    h.desk.allocation.sell(&alice, &d, "Yan", "555").await.unwrap();

    let snapshot = h.repo.range_snapshot(n(1), n(20)).await.unwrap();
    for (sold, _) in &snapshot.sold {
        assert!(
            !snapshot.reserved.iter().any(|(r, _)| r == sold),
            "number {sold} is both sold and reserved"
        );
    }
    assert_eq!(snapshot.sold.len(), 9);
    assert_eq!(snapshot.reserved.len(), 6);
}
