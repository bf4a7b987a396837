//! Integration tests for dashboards, number lookup, audit search and export

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use raffle_core::config::{ConfigBuilder, RaffleConfig};
use raffle_core::domain::{AllocationError, AuditAction, Identity, TicketNumber};
use raffle_core::ports::{AuditFilter, IRaffleRepository, ManualClock};
use raffle_engine::reporting::audit_date_range;
use raffle_engine::{NumberState, NumberStatus, PasswordHasher, RaffleDesk};
use raffle_store::{DatabasePool, SqliteRaffleRepository};

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

async fn setup_with(limits: RaffleConfig) -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteRaffleRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(t0()));
    let desk = RaffleDesk::with_hasher(
        repo.clone(),
        clock.clone(),
        &limits,
        PasswordHasher::with_costs(8, 1, 1).unwrap(),
    );
    let admin = desk
        .accounts
        .bootstrap_superuser("admin", "changeme")
        .await
        .unwrap()
        .unwrap()
        .identity();
    Harness {
        desk,
        repo,
        clock,
        admin,
    }
}

async fn setup() -> Harness {
    setup_with(RaffleConfig::default()).await
}

async fn seller(h: &Harness, name: &str) -> Identity {
    h.desk
        .accounts
        .create_seller(&h.admin, name, "secret1")
        .await
        .unwrap()
        .identity()
}

// ============================================================================
// Totals and admin dashboard
// ============================================================================

#[tokio::test]
async fn test_admin_dashboard() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let sold = h.desk.allocation.batch([1, 2, 3]).unwrap();
    h.desk.allocation.sell(&bob, &sold, "Zed", "555").await.unwrap();
    let held = h.desk.allocation.batch([4, 5]).unwrap();
    h.desk.allocation.reserve(&alice, &held).await.unwrap();

    let dashboard = h.desk.reporting.admin_dashboard(&h.admin).await.unwrap();
    assert_eq!(dashboard.totals.sold, 3);
    assert_eq!(dashboard.totals.reserved, 2);
    assert_eq!(dashboard.totals.remaining, 100_000 - 5);

    let ranking: Vec<&str> = dashboard
        .sellers
        .iter()
        .map(|s| s.username.as_str())
        .collect();
    assert_eq!(ranking, vec!["bob", "alice"]);
    assert_eq!(dashboard.sellers[1].reserved_count, 2);

    assert_eq!(dashboard.recent_sales.len(), 3);
    assert_eq!(dashboard.recent_sales[0].seller_username.as_str(), "bob");
    assert!(!dashboard.recent_audit.is_empty());
    assert!(dashboard.recent_audit.len() <= 20);

    let err = h.desk.reporting.admin_dashboard(&alice).await.unwrap_err();
    assert!(matches!(err, AllocationError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_totals_exclude_lapsed_holds() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let held = h.desk.allocation.batch([7]).unwrap();
    h.desk.allocation.reserve(&alice, &held).await.unwrap();
    assert_eq!(h.desk.reporting.totals().await.unwrap().reserved, 1);

    h.clock.advance(Duration::minutes(16));
    let totals = h.desk.reporting.totals().await.unwrap();
    assert_eq!(totals.reserved, 0);
    assert_eq!(totals.remaining, 100_000);
}

// ============================================================================
// Seller dashboard
// ============================================================================

#[tokio::test]
async fn test_seller_dashboard_marks_numbers() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let mine = h.desk.allocation.batch([2]).unwrap();
    h.desk.allocation.reserve(&alice, &mine).await.unwrap();
    let theirs = h.desk.allocation.batch([3]).unwrap();
    h.desk.allocation.reserve(&bob, &theirs).await.unwrap();
    let sold = h.desk.allocation.batch([4]).unwrap();
    h.desk.allocation.sell(&bob, &sold, "Zed", "555").await.unwrap();

    let dashboard = h.desk.reporting.seller_dashboard(&alice, 1).await.unwrap();
    assert_eq!(dashboard.page, 1);
    assert_eq!(dashboard.page_count, 200);
    assert_eq!(dashboard.start, n(1));
    assert_eq!(dashboard.end, n(500));
    assert_eq!(dashboard.numbers.len(), 500);
    assert_eq!(dashboard.numbers[0].state, NumberState::Available);
    assert_eq!(dashboard.numbers[1].state, NumberState::ReservedByMe);
    assert_eq!(dashboard.numbers[2].state, NumberState::ReservedByOther);
    assert_eq!(dashboard.numbers[3].state, NumberState::Sold);
    assert_eq!(dashboard.holdings.reserved, 1);
    assert_eq!(dashboard.holdings.sold, 0);
    assert_eq!(dashboard.reservations.len(), 1);
    assert_eq!(dashboard.reservations[0].number, n(2));
}

#[tokio::test]
async fn test_seller_dashboard_clamps_page() {
    let limits = ConfigBuilder::new()
        .max_number(1_050)
        .page_size(500)
        .build()
        .raffle;
    let h = setup_with(limits).await;
    let alice = seller(&h, "alice").await;

    let last = h.desk.reporting.seller_dashboard(&alice, 99).await.unwrap();
    assert_eq!(last.page, 3);
    assert_eq!(last.page_count, 3);
    assert_eq!(last.start.get(), 1_001);
    assert_eq!(last.end.get(), 1_050);
    assert_eq!(last.numbers.len(), 50);

    let first = h.desk.reporting.seller_dashboard(&alice, 0).await.unwrap();
    assert_eq!(first.page, 1);
}

#[tokio::test]
async fn test_seller_dashboard_orders_own_reservations_by_deadline() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;

    let later = h.desk.allocation.batch([9]).unwrap();
    let sooner = h.desk.allocation.batch([8]).unwrap();
    h.desk.allocation.reserve(&alice, &sooner).await.unwrap();
    h.clock.advance(Duration::minutes(2));
    h.desk.allocation.reserve(&alice, &later).await.unwrap();

    let dashboard = h.desk.reporting.seller_dashboard(&alice, 1).await.unwrap();
    let order: Vec<u32> = dashboard.reservations.iter().map(|r| r.number.get()).collect();
    assert_eq!(order, vec![8, 9]);

    assert!(h.desk.reporting.seller_dashboard(&h.admin, 1).await.is_err());
}

// ============================================================================
// Number status
// ============================================================================

#[tokio::test]
async fn test_number_status_visibility() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let sold = h.desk.allocation.batch([11]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &sold, "Bob", "555-1111")
        .await
        .unwrap();
    let held = h.desk.allocation.batch([12]).unwrap();
    h.desk.allocation.reserve(&alice, &held).await.unwrap();

    match h.desk.reporting.number_status(&alice, 11).await.unwrap() {
        NumberStatus::Sold {
            buyer_name,
            can_edit,
            seller_username,
            ..
        } => {
            assert_eq!(buyer_name, "Bob");
            assert!(can_edit);
            assert!(seller_username.is_none());
        }
        other => panic!("expected sold, got {other:?}"),
    }

    match h.desk.reporting.number_status(&bob, 11).await.unwrap() {
        NumberStatus::Sold { can_edit, .. } => assert!(!can_edit),
        other => panic!("expected sold, got {other:?}"),
    }

    match h.desk.reporting.number_status(&h.admin, 12).await.unwrap() {
        NumberStatus::Reserved {
            reserved_by_me,
            seller_username,
            reserved_until,
            ..
        } => {
            assert!(!reserved_by_me);
            assert_eq!(seller_username.unwrap().as_str(), "alice");
            assert_eq!(reserved_until, t0() + Duration::minutes(15));
        }
        other => panic!("expected reserved, got {other:?}"),
    }

    match h.desk.reporting.number_status(&alice, 12).await.unwrap() {
        NumberStatus::Reserved { reserved_by_me, .. } => assert!(reserved_by_me),
        other => panic!("expected reserved, got {other:?}"),
    }

    let free = h.desk.reporting.number_status(&bob, 13).await.unwrap();
    assert_eq!(free, NumberStatus::Available { number: n(13) });

    let err = h.desk.reporting.number_status(&bob, 0).await.unwrap_err();
    assert!(matches!(err, AllocationError::Validation(_)));
}

// ============================================================================
// Audit log
// ============================================================================

#[tokio::test]
async fn test_audit_log_paging_and_filters() {
    let limits = ConfigBuilder::new().audit_page_size(5).build().raffle;
    let h = setup_with(limits).await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;

    let batch = h.desk.allocation.batch(1..=8).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();
    h.clock.advance(Duration::minutes(1));
    let other = h.desk.allocation.batch([20]).unwrap();
    h.desk.allocation.sell(&bob, &other, "Zed", "555").await.unwrap();

    // 1 bootstrap + 2 seller_create + 8 reservation_create + 1 sale_create
    let all = h
        .desk
        .reporting
        .audit_log(&h.admin, &AuditFilter::new(), 1)
        .await
        .unwrap();
    assert_eq!(all.total, 12);
    assert_eq!(all.page_count, 3);
    assert_eq!(all.records.len(), 5);
    assert_eq!(all.records[0].event.action, AuditAction::SaleCreate);

    let last = h
        .desk
        .reporting
        .audit_log(&h.admin, &AuditFilter::new(), 42)
        .await
        .unwrap();
    assert_eq!(last.page, 3);
    assert_eq!(last.records.len(), 2);

    let by_bob = h
        .desk
        .reporting
        .audit_log(&h.admin, &AuditFilter::new().with_actor("bob"), 1)
        .await
        .unwrap();
    assert_eq!(by_bob.total, 1);

    let for_number = h
        .desk
        .reporting
        .audit_log(&h.admin, &AuditFilter::new().with_number(n(3)), 1)
        .await
        .unwrap();
    assert_eq!(for_number.total, 1);
    assert_eq!(for_number.records[0].seller_username.as_ref().unwrap().as_str(), "alice");

    let (from, to) = audit_date_range(Some("2026-04-02"), None).unwrap();
    let mut tomorrow = AuditFilter::new();
    tomorrow.from = from;
    tomorrow.to = to;
    let none = h
        .desk
        .reporting
        .audit_log(&h.admin, &tomorrow, 7)
        .await
        .unwrap();
    assert_eq!(none.total, 0);
    assert_eq!((none.page, none.page_count), (1, 1));

    let err = h
        .desk
        .reporting
        .audit_log(&alice, &AuditFilter::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_audit_filter_options() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let batch = h.desk.allocation.batch([1]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    let options = h.desk.reporting.audit_filter_options(&h.admin).await.unwrap();
    assert_eq!(
        options.actions,
        vec![
            AuditAction::ReservationCreate,
            AuditAction::SellerCreate,
            AuditAction::SuperuserBootstrap,
        ]
    );
    let names: Vec<&str> = options.usernames.iter().map(|u| u.as_str()).collect();
    assert_eq!(names, vec!["admin", "alice"]);
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn test_export_sales_csv() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let first = h.desk.allocation.batch([30]).unwrap();
    h.desk
        .allocation
        .sell(&alice, &first, "Smith, John", "555")
        .await
        .unwrap();
    let second = h.desk.allocation.batch([4]).unwrap();
    h.desk.allocation.sell(&alice, &second, "Ana", "555").await.unwrap();

    let export = h.desk.reporting.export_sales(&h.admin).await.unwrap();
    assert_eq!(export.filename, "sales_export.csv");
    assert_eq!(
        export.content_disposition,
        "attachment; filename=sales_export.csv"
    );
    assert_eq!(
        export.body,
        "number,buyer_name\r\n4,Ana\r\n30,\"Smith, John\"\r\n"
    );
    assert_eq!(export.rows, 2);

    assert!(h.desk.reporting.export_sales(&alice).await.is_err());
}

#[tokio::test]
async fn test_reservations_of() {
    let h = setup().await;
    let alice = seller(&h, "alice").await;
    let bob = seller(&h, "bob").await;
    let batch = h.desk.allocation.batch([5, 6]).unwrap();
    h.desk.allocation.reserve(&alice, &batch).await.unwrap();

    let mine = h
        .desk
        .reporting
        .reservations_of(&alice, alice.user_id)
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(h
        .desk
        .reporting
        .reservations_of(&bob, alice.user_id)
        .await
        .is_err());
    assert_eq!(
        h.desk
            .reporting
            .reservations_of(&h.admin, alice.user_id)
            .await
            .unwrap()
            .len(),
        2
    );
    assert!(h.repo.holdings(bob.user_id).await.unwrap().is_empty());
}
