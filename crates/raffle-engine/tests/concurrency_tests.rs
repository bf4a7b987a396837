//! Concurrency tests against a file-backed SQLite database
//!
//! Concurrent callers share one pool with several connections, so their
//! `BEGIN IMMEDIATE` transactions really race for the write lock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{TimeZone, Utc};
use raffle_core::config::RaffleConfig;
use raffle_core::domain::{AllocationError, AuditAction, Identity, TicketNumber};
use raffle_core::ports::{AuditFilter, IRaffleRepository, ManualClock};
use raffle_engine::{PasswordHasher, RaffleDesk};
use raffle_store::{DatabasePool, PoolSettings, SqliteRaffleRepository};
use tempfile::TempDir;

struct Harness {
    desk: RaffleDesk,
    repo: Arc<SqliteRaffleRepository>,
    admin: Identity,
    _dir: TempDir,
}

fn n(value: i64) -> TicketNumber {
    TicketNumber::new(value, 100_000).unwrap()
}

async fn setup() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = PoolSettings {
        max_connections: 8,
        busy_timeout: StdDuration::from_secs(10),
    };
    let pool = DatabasePool::new(&dir.path().join("raffle.db"), settings)
        .await
        .expect("Failed to create file database");
    let repo = Arc::new(SqliteRaffleRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap(),
    ));
    let desk = RaffleDesk::with_hasher(
        repo.clone(),
        clock,
        &RaffleConfig::default(),
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
        admin,
        _dir: dir,
    }
}

async fn sellers(h: &Harness, count: usize) -> Vec<Identity> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let user = h
            .desk
            .accounts
            .create_seller(&h.admin, &format!("seller{i}"), "secret1")
            .await
            .unwrap();
        out.push(user.identity());
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reserve_and_sell_race_has_one_winner() {
    let h = setup().await;
    let people = sellers(&h, 2).await;
    let (a, b) = (people[0].clone(), people[1].clone());

    for value in 7..17 {
        let batch = h.desk.allocation.batch([value]).unwrap();

        let reserve = {
            let desk = h.desk.clone();
            let (a, batch) = (a.clone(), batch.clone());
            tokio::spawn(async move { desk.allocation.reserve(&a, &batch).await })
        };
        let sell = {
            let desk = h.desk.clone();
            let (b, batch) = (b.clone(), batch.clone());
            tokio::spawn(async move { desk.allocation.sell(&b, &batch, "Bob", "555-1111").await })
        };
        let reserved = reserve.await.unwrap();
        let sold = sell.await.unwrap();

        let sale = h.repo.sale_view(n(value)).await.unwrap();
        let hold = h.repo.reservation_view(n(value)).await.unwrap();
        match (&reserved, &sold) {
            (Ok(_), Err(e)) => {
                assert_eq!(e, &AllocationError::ReservedByOther(n(value)));
                assert!(sale.is_none());
                assert_eq!(hold.unwrap().reservation.seller_id, a.user_id);
            }
            (Err(e), Ok(_)) => {
                assert_eq!(e, &AllocationError::AlreadySold(n(value)));
                assert!(hold.is_none());
                assert_eq!(sale.unwrap().sale.seller_id, b.user_id);
            }
            other => panic!("expected exactly one winner for {value}, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_reservations_serialize() {
    let h = setup().await;
    let people = sellers(&h, 8).await;
    let batch = h.desk.allocation.batch([100]).unwrap();

    let mut handles = Vec::new();
    for person in people {
        let desk = h.desk.clone();
        let batch = batch.clone();
        handles.push(tokio::spawn(async move {
            desk.allocation.reserve(&person, &batch).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e, AllocationError::AlreadyReserved(n(100))),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.repo.count_reservations().await.unwrap(), 1);
    assert_eq!(
        h.repo
            .count_audit(&AuditFilter::new().with_action(AuditAction::ReservationCreate))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_batches_all_succeed() {
    let h = setup().await;
    let people = sellers(&h, 6).await;

    let mut handles = Vec::new();
    for (i, person) in people.into_iter().enumerate() {
        let desk = h.desk.clone();
        let first = (i as i64) * 10 + 1;
        let batch = desk.allocation.batch(first..first + 10).unwrap();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                desk.allocation.reserve(&person, &batch).await.map(|o| o.total())
            } else {
                desk.allocation
                    .sell(&person, &batch, "Buyer", "555")
                    .await
                    .map(|o| o.sales.len())
            }
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 10);
    }
    assert_eq!(h.repo.count_reservations().await.unwrap(), 30);
    assert_eq!(h.repo.count_sales().await.unwrap(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_sweep_does_not_wait_for_writer() {
    let dir = tempfile::tempdir().unwrap();
    let settings = PoolSettings {
        max_connections: 2,
        busy_timeout: StdDuration::from_millis(100),
    };
    let pool = DatabasePool::new(&dir.path().join("raffle.db"), settings)
        .await
        .unwrap();
    let repo = Arc::new(SqliteRaffleRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap(),
    ));
    let desk = RaffleDesk::with_hasher(
        repo.clone(),
        clock,
        &RaffleConfig::default(),
        PasswordHasher::with_costs(8, 1, 1).unwrap(),
    );

    let writer = repo.begin().await.unwrap();

    assert_eq!(desk.sweeper.sweep().await.unwrap(), 0);
    let totals = desk.reporting.totals().await.unwrap();
    assert_eq!(totals.sold, 0);

    writer.rollback().await.unwrap();
}
