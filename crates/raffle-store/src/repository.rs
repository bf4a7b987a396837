//! SQLite implementation of IRaffleRepository and IUnitOfWork
//!
//! This module provides the concrete SQLite-based implementation of the
//! raffle ports defined in raffle-core. It handles domain type
//! serialization/deserialization, SQL query construction and the mapping of
//! SQLite failures onto [`StoreError`].
//!
//! ## Type Mapping
//!
//! | Domain Type       | SQL Type | Strategy                                    |
//! |-------------------|----------|---------------------------------------------|
//! | UserId, AuditId   | INTEGER  | `as_i64()` / `From<i64>`                    |
//! | TicketNumber      | INTEGER  | `as_i64()` / `TicketNumber::from_stored()`  |
//! | Username          | TEXT     | `as_str()` / `Username::new()`              |
//! | Role, AuditAction | TEXT     | `as_str()` / `FromStr`                      |
//! | DateTime<Utc>     | TEXT     | `format_timestamp()` / `parse_timestamp()`  |
//! | details           | TEXT     | serde_json serialization                    |
//!
//! ## Locking
//!
//! [`SqliteRaffleRepository::begin`] opens the transaction with
//! `BEGIN IMMEDIATE`, so the write lock is held from the first statement of
//! a unit of work. A second writer waits up to the pool's busy timeout and
//! then fails with [`StoreError::Busy`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use raffle_core::domain::{
    newtypes::{AuditId, TicketNumber, UserId, Username},
    time::{format_timestamp, parse_timestamp},
    AuditAction, AuditEvent, Buyer, NewAuditEvent, Reservation, Role, Sale, User,
};
use raffle_core::ports::{
    AuditFilter, AuditRecord, Holdings, IRaffleRepository, IUnitOfWork, RangeSnapshot,
    ReservationView, SaleView, SellerOrder, SellerStats, StoreError,
};

// ============================================================================
// Error mapping
// ============================================================================

/// SQLite primary result codes that mean "could not get the lock in time"
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Map an SQLx error onto the port-level error taxonomy
fn store_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if is_busy_code(db.code().as_deref()) => {
            StoreError::Busy(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Busy(e.to_string()),
        _ => StoreError::Unavailable(e.to_string()),
    }
}

/// Extended result codes carry the primary code in their low byte
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

fn serialization(what: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(format!("{what}: {e}"))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    parse_timestamp(s).map_err(|e| serialization("timestamp", e))
}

fn parse_number(value: i64) -> Result<TicketNumber, StoreError> {
    TicketNumber::from_stored(value).map_err(|e| serialization("number", e))
}

fn parse_username(value: String) -> Result<Username, StoreError> {
    Username::new(value).map_err(|e| serialization("username", e))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ============================================================================
// Row mapping functions
// ============================================================================

const SALE_COLUMNS: &str = "s.id, s.number, s.seller_id, s.buyer_name, s.buyer_phone, s.sold_at";
const RESERVATION_COLUMNS: &str =
    "r.id, r.number, r.seller_id, r.reserved_at, r.reserved_until";
const AUDIT_SELECT: &str = "SELECT a.id, a.action, a.actor_id, a.number, a.seller_id, a.details, \
     a.created_at, actor.username AS actor_username, seller.username AS seller_username \
     FROM audit_log a \
     LEFT JOIN users actor ON actor.id = a.actor_id \
     LEFT JOIN users seller ON seller.id = a.seller_id";

fn sale_from_row(row: &SqliteRow) -> Result<Sale, StoreError> {
    let buyer_name: String = row.get("buyer_name");
    let buyer_phone: String = row.get("buyer_phone");
    let sold_at: String = row.get("sold_at");

    Ok(Sale {
        id: row.get("id"),
        number: parse_number(row.get("number"))?,
        seller_id: UserId::new(row.get("seller_id")),
        buyer: Buyer::new(&buyer_name, &buyer_phone).map_err(|e| serialization("buyer", e))?,
        sold_at: parse_datetime(&sold_at)?,
    })
}

fn reservation_from_row(row: &SqliteRow) -> Result<Reservation, StoreError> {
    let reserved_at: String = row.get("reserved_at");
    let reserved_until: String = row.get("reserved_until");

    Ok(Reservation {
        id: row.get("id"),
        number: parse_number(row.get("number"))?,
        seller_id: UserId::new(row.get("seller_id")),
        reserved_at: parse_datetime(&reserved_at)?,
        reserved_until: parse_datetime(&reserved_until)?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    Ok(User {
        id: UserId::new(row.get("id")),
        username: parse_username(row.get("username"))?,
        password_hash: row.get("password_hash"),
        role: Role::from_str(&role).map_err(|e| serialization("role", e))?,
        created_at: parse_datetime(&created_at)?,
    })
}

fn audit_record_from_row(row: &SqliteRow) -> Result<AuditRecord, StoreError> {
    let action: String = row.get("action");
    let number: Option<i64> = row.get("number");
    let seller_id: Option<i64> = row.get("seller_id");
    let details: Option<String> = row.get("details");
    let created_at: String = row.get("created_at");
    let actor_username: Option<String> = row.get("actor_username");
    let seller_username: Option<String> = row.get("seller_username");

    let details = match details {
        Some(ref s) if !s.is_empty() => {
            Some(serde_json::from_str(s).map_err(|e| serialization("audit details", e))?)
        }
        _ => None,
    };

    let event = AuditEvent {
        id: AuditId::new(row.get("id")),
        action: AuditAction::from_str(&action).map_err(|e| serialization("audit action", e))?,
        actor_id: UserId::new(row.get("actor_id")),
        number: number.map(parse_number).transpose()?,
        seller_id: seller_id.map(UserId::new),
        details,
        created_at: parse_datetime(&created_at)?,
    };

    Ok(AuditRecord {
        event,
        actor_username: actor_username.map(parse_username).transpose()?,
        seller_username: seller_username.map(parse_username).transpose()?,
    })
}

fn sale_view_from_row(row: &SqliteRow) -> Result<SaleView, StoreError> {
    Ok(SaleView {
        sale: sale_from_row(row)?,
        seller_username: parse_username(row.get("seller_username"))?,
    })
}

// ============================================================================
// Queries shared by the pool and the unit of work
// ============================================================================

async fn fetch_user<'e, E>(executor: E, id: UserId) -> Result<Option<User>, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, username, password_hash, role, created_at FROM users WHERE id = ?",
    )
    .bind(id.as_i64())
    .fetch_optional(executor)
    .await
    .map_err(store_err)?;

    row.as_ref().map(user_from_row).transpose()
}

async fn fetch_holdings<'e, E>(executor: E, seller_id: UserId) -> Result<Holdings, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT (SELECT COUNT(*) FROM sales WHERE seller_id = ?) AS sold, \
         (SELECT COUNT(*) FROM reservations WHERE seller_id = ?) AS reserved",
    )
    .bind(seller_id.as_i64())
    .bind(seller_id.as_i64())
    .fetch_one(executor)
    .await
    .map_err(store_err)?;

    Ok(Holdings {
        sold: count(row.get("sold")),
        reserved: count(row.get("reserved")),
    })
}

/// A value bound into a dynamically built query
enum Bind {
    Text(String),
    Int(i64),
}

/// WHERE clause and bind values for an audit search
fn audit_where(filter: &AuditFilter) -> (String, Vec<Bind>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds = Vec::new();

    if let Some(action) = filter.action {
        clauses.push("a.action = ?");
        binds.push(Bind::Text(action.as_str().to_string()));
    }
    if let Some(number) = filter.number {
        clauses.push("a.number = ?");
        binds.push(Bind::Int(number.as_i64()));
    }
    if let Some(ref actor) = filter.actor {
        clauses.push("actor.username = ?");
        binds.push(Bind::Text(actor.clone()));
    }
    if let Some(ref seller) = filter.seller {
        clauses.push("seller.username = ?");
        binds.push(Bind::Text(seller.clone()));
    }
    if let Some(from) = filter.from {
        clauses.push("a.created_at >= ?");
        binds.push(Bind::Text(format_timestamp(from)));
    }
    if let Some(to) = filter.to {
        clauses.push("a.created_at <= ?");
        binds.push(Bind::Text(format_timestamp(to)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

// ============================================================================
// SqliteRaffleRepository
// ============================================================================

/// SQLite-based implementation of the raffle repository port
///
/// Read queries go straight to the pool. Writes go through a
/// [`SqliteUnitOfWork`] obtained from [`IRaffleRepository::begin`].
#[derive(Debug, Clone)]
pub struct SqliteRaffleRepository {
    pool: SqlitePool,
}

impl SqliteRaffleRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn scalar_count(&self, sql: &str) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count(n))
    }
}

#[async_trait::async_trait]
impl IRaffleRepository for SqliteRaffleRepository {
    async fn begin(&self) -> Result<Box<dyn IUnitOfWork>, StoreError> {
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(store_err)?;
        tracing::trace!("Opened write transaction");
        Ok(Box::new(SqliteUnitOfWork { tx }))
    }

    // --- Users ---

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        fetch_user(&self.pool, id).await
    }

    async fn count_superusers(&self) -> Result<u64, StoreError> {
        self.scalar_count("SELECT COUNT(*) FROM users WHERE role = 'superuser'")
            .await
    }

    async fn usernames(&self) -> Result<Vec<Username>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        names.into_iter().map(parse_username).collect()
    }

    async fn seller_stats(&self, order: SellerOrder) -> Result<Vec<SellerStats>, StoreError> {
        let order_sql = match order {
            SellerOrder::MostSold => "ORDER BY sold_count DESC, u.username",
            SellerOrder::Username => "ORDER BY u.username",
        };
        let sql = format!(
            "SELECT u.id, u.username, u.created_at, \
             (SELECT COUNT(*) FROM sales s WHERE s.seller_id = u.id) AS sold_count, \
             (SELECT COUNT(*) FROM reservations r WHERE r.seller_id = u.id) AS reserved_count \
             FROM users u WHERE u.role = 'seller' {order_sql}"
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in &rows {
            let created_at: String = row.get("created_at");
            stats.push(SellerStats {
                id: UserId::new(row.get("id")),
                username: parse_username(row.get("username"))?,
                created_at: parse_datetime(&created_at)?,
                sold_count: count(row.get("sold_count")),
                reserved_count: count(row.get("reserved_count")),
            });
        }
        Ok(stats)
    }

    // --- Counts ---

    async fn count_sales(&self) -> Result<u64, StoreError> {
        self.scalar_count("SELECT COUNT(*) FROM sales").await
    }

    async fn count_reservations(&self) -> Result<u64, StoreError> {
        self.scalar_count("SELECT COUNT(*) FROM reservations").await
    }

    async fn count_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE reserved_until < ?")
            .bind(format_timestamp(now))
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count(n))
    }

    async fn holdings(&self, seller_id: UserId) -> Result<Holdings, StoreError> {
        fetch_holdings(&self.pool, seller_id).await
    }

    // --- Tickets ---

    async fn range_snapshot(
        &self,
        start: TicketNumber,
        end: TicketNumber,
    ) -> Result<RangeSnapshot, StoreError> {
        let mut snapshot = RangeSnapshot::default();

        for (table, target) in [
            ("sales", &mut snapshot.sold),
            ("reservations", &mut snapshot.reserved),
        ] {
            let sql = format!(
                "SELECT number, seller_id FROM {table} WHERE number BETWEEN ? AND ? ORDER BY number"
            );
            let rows = sqlx::query(&sql)
                .bind(start.as_i64())
                .bind(end.as_i64())
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
            for row in &rows {
                target.push((
                    parse_number(row.get("number"))?,
                    UserId::new(row.get("seller_id")),
                ));
            }
        }

        Ok(snapshot)
    }

    async fn sale_view(&self, number: TicketNumber) -> Result<Option<SaleView>, StoreError> {
        let sql = format!(
            "SELECT {SALE_COLUMNS}, u.username AS seller_username \
             FROM sales s JOIN users u ON u.id = s.seller_id WHERE s.number = ?"
        );
        let row = sqlx::query(&sql)
            .bind(number.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.as_ref().map(sale_view_from_row).transpose()
    }

    async fn reservation_view(
        &self,
        number: TicketNumber,
    ) -> Result<Option<ReservationView>, StoreError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS}, u.username AS seller_username \
             FROM reservations r JOIN users u ON u.id = r.seller_id WHERE r.number = ?"
        );
        let row = sqlx::query(&sql)
            .bind(number.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(ref row) => Ok(Some(ReservationView {
                reservation: reservation_from_row(row)?,
                seller_username: parse_username(row.get("seller_username"))?,
            })),
            None => Ok(None),
        }
    }

    async fn reservations_for_seller(
        &self,
        seller_id: UserId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations r \
             WHERE r.seller_id = ? ORDER BY r.reserved_until, r.number"
        );
        let rows = sqlx::query(&sql)
            .bind(seller_id.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn recent_sales(&self, limit: u32) -> Result<Vec<SaleView>, StoreError> {
        let sql = format!(
            "SELECT {SALE_COLUMNS}, u.username AS seller_username \
             FROM sales s JOIN users u ON u.id = s.seller_id \
             ORDER BY s.sold_at DESC, s.id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(sale_view_from_row).collect()
    }

    async fn all_sales(&self) -> Result<Vec<Sale>, StoreError> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales s ORDER BY s.number");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(sale_from_row).collect()
    }

    // --- Audit ---

    async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditRecord>, StoreError> {
        self.search_audit(&AuditFilter::new(), limit, 0).await
    }

    async fn count_audit(&self, filter: &AuditFilter) -> Result<u64, StoreError> {
        let (where_sql, binds) = audit_where(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM audit_log a \
             LEFT JOIN users actor ON actor.id = a.actor_id \
             LEFT JOIN users seller ON seller.id = a.seller_id{where_sql}"
        );

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            query = match bind {
                Bind::Text(s) => query.bind(s.as_str()),
                Bind::Int(i) => query.bind(*i),
            };
        }

        let n = query.fetch_one(&self.pool).await.map_err(store_err)?;
        Ok(count(n))
    }

    async fn search_audit(
        &self,
        filter: &AuditFilter,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let (where_sql, binds) = audit_where(filter);
        let sql = format!("{AUDIT_SELECT}{where_sql} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = match bind {
                Bind::Text(s) => query.bind(s.as_str()),
                Bind::Int(i) => query.bind(*i),
            };
        }
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = query
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter().map(audit_record_from_row).collect()
    }

    async fn audit_actions(&self) -> Result<Vec<AuditAction>, StoreError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT action FROM audit_log ORDER BY action")
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;

        names
            .iter()
            .map(|s| AuditAction::from_str(s).map_err(|e| serialization("audit action", e)))
            .collect()
    }
}

// ============================================================================
// SqliteUnitOfWork
// ============================================================================

/// One `BEGIN IMMEDIATE` transaction
///
/// Dropping it without calling `commit` rolls the transaction back.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl std::fmt::Debug for SqliteUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUnitOfWork").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl IUnitOfWork for SqliteUnitOfWork {
    // --- Tickets ---

    async fn sale(&mut self, number: TicketNumber) -> Result<Option<Sale>, StoreError> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales s WHERE s.number = ?");
        let row = sqlx::query(&sql)
            .bind(number.as_i64())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_err)?;

        row.as_ref().map(sale_from_row).transpose()
    }

    async fn reservation(
        &mut self,
        number: TicketNumber,
    ) -> Result<Option<Reservation>, StoreError> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.number = ?");
        let row = sqlx::query(&sql)
            .bind(number.as_i64())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_err)?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn insert_sale(
        &mut self,
        number: TicketNumber,
        seller_id: UserId,
        buyer: &Buyer,
        sold_at: DateTime<Utc>,
    ) -> Result<Sale, StoreError> {
        let result = sqlx::query(
            "INSERT INTO sales (number, seller_id, buyer_name, buyer_phone, sold_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(number.as_i64())
        .bind(seller_id.as_i64())
        .bind(buyer.name())
        .bind(buyer.phone())
        .bind(format_timestamp(sold_at))
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        tracing::trace!(number = %number, seller_id = %seller_id, "Inserted sale");
        Ok(Sale {
            id: result.last_insert_rowid(),
            number,
            seller_id,
            buyer: buyer.clone(),
            sold_at,
        })
    }

    async fn update_sale_buyer(
        &mut self,
        number: TicketNumber,
        buyer: &Buyer,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sales SET buyer_name = ?, buyer_phone = ? WHERE number = ?")
            .bind(buyer.name())
            .bind(buyer.phone())
            .bind(number.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        tracing::trace!(number = %number, "Updated sale buyer");
        Ok(())
    }

    async fn delete_sale(&mut self, number: TicketNumber) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sales WHERE number = ?")
            .bind(number.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        tracing::trace!(number = %number, "Deleted sale");
        Ok(())
    }

    async fn insert_reservation(
        &mut self,
        number: TicketNumber,
        seller_id: UserId,
        reserved_at: DateTime<Utc>,
        reserved_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        let result = sqlx::query(
            "INSERT INTO reservations (number, seller_id, reserved_at, reserved_until) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(number.as_i64())
        .bind(seller_id.as_i64())
        .bind(format_timestamp(reserved_at))
        .bind(format_timestamp(reserved_until))
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        tracing::trace!(number = %number, seller_id = %seller_id, "Inserted reservation");
        Ok(Reservation {
            id: result.last_insert_rowid(),
            number,
            seller_id,
            reserved_at,
            reserved_until,
        })
    }

    async fn extend_reservation(
        &mut self,
        number: TicketNumber,
        reserved_until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE reservations SET reserved_until = ? WHERE number = ?")
            .bind(format_timestamp(reserved_until))
            .bind(number.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        tracing::trace!(number = %number, "Extended reservation");
        Ok(())
    }

    async fn delete_reservation(&mut self, number: TicketNumber) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM reservations WHERE number = ?")
            .bind(number.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        tracing::trace!(number = %number, "Deleted reservation");
        Ok(())
    }

    async fn expired_reservations(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations r \
             WHERE r.reserved_until < ? ORDER BY r.number"
        );
        let rows = sqlx::query(&sql)
            .bind(format_timestamp(now))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(store_err)?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn delete_reservations(&mut self, ids: &[i64]) -> Result<(), StoreError> {
        for id in ids {
            sqlx::query("DELETE FROM reservations WHERE id = ?")
                .bind(*id)
                .execute(&mut *self.tx)
                .await
                .map_err(store_err)?;
        }

        tracing::trace!(count = ids.len(), "Deleted reservations");
        Ok(())
    }

    // --- Users ---

    async fn user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        fetch_user(&mut *self.tx, id).await
    }

    async fn count_superusers(&mut self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'superuser'")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(store_err)?;
        Ok(count(n))
    }

    async fn insert_user(
        &mut self,
        username: &Username,
        password_hash: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username.as_str())
        .bind(password_hash)
        .bind(role.as_str())
        .bind(format_timestamp(created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        let id = UserId::new(result.last_insert_rowid());
        tracing::trace!(user_id = %id, role = %role, "Inserted user");
        Ok(User {
            id,
            username: username.clone(),
            password_hash: password_hash.to_string(),
            role,
            created_at,
        })
    }

    async fn delete_user(&mut self, id: UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await
            .map_err(store_err)?;

        tracing::trace!(user_id = %id, "Deleted user");
        Ok(())
    }

    async fn holdings(&mut self, seller_id: UserId) -> Result<Holdings, StoreError> {
        fetch_holdings(&mut *self.tx, seller_id).await
    }

    // --- Audit ---

    async fn append_audit(&mut self, event: &NewAuditEvent) -> Result<AuditId, StoreError> {
        let details = event
            .details()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| serialization("audit details", e))?;

        let result = sqlx::query(
            "INSERT INTO audit_log (action, actor_id, number, seller_id, details, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.action().as_str())
        .bind(event.actor_id().as_i64())
        .bind(event.number().map(|n| n.as_i64()))
        .bind(event.seller_id().map(|s| s.as_i64()))
        .bind(details)
        .bind(format_timestamp(event.created_at()))
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;

        tracing::trace!(action = %event.action(), "Appended audit event");
        Ok(AuditId::new(result.last_insert_rowid()))
    }

    // --- Completion ---

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_err)?;
        tracing::trace!("Committed write transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_err)?;
        tracing::trace!("Rolled back write transaction");
        Ok(())
    }
}
