//! Postgres backend.
//!
//! Seat-mutating operations run in one transaction that first takes a
//! transaction-scoped advisory lock per (event_id, seat_id), in sorted order,
//! with `pg_try_advisory_xact_lock`. A contended seat is rejected immediately
//! rather than waited on. Unique indexes on purchases, reservations and active
//! listings stay as the last line of defence and surface as conflicts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::availability::{blocked_seats, resolve, SeatSnapshot, SeatStatus};
use super::{
    CatalogStore, GroupCommit, GroupStore, InventoryStats, InventoryStore, PurchaseBatch,
};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    round_cents, Event, GroupDetails, GroupMember, GroupPurchase, GroupStatus, MarketplaceListing,
    MemberStatus, Purchase, Reservation, SavedPaymentMethod, Seat, Venue,
};

const PURCHASE_COLUMNS: &str = "id, user_id, event_id, seat_id, price, purchase_date";
const RESERVATION_COLUMNS: &str = "seat_id, event_id, user_id, expires_at, created_at";
const LISTING_COLUMNS: &str =
    "id, seller_id, event_id, seat_id, purchase_id, list_price, status, buyer_id, created_at, sold_at";
const GROUP_COLUMNS: &str = "id, event_id, leader_id, group_name, max_members, target_seats, status, \
     total_prepaid, estimated_price_per_seat, actual_total_cost, leader_seat_id, leader_price, \
     created_at, updated_at, completed_at";
const MEMBER_COLUMNS: &str =
    "group_id, user_id, status, invited_at, joined_at, prepaid_amount, seat_assigned_id, final_price";
const PAYMENT_METHOD_COLUMNS: &str = "id, user_id, cardholder_name, last_four_digits, expiration_month, \
     expiration_year, billing_address, billing_city, billing_state, billing_zip, created_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// SQLSTATE 55P03: FOR UPDATE NOWAIT hit a row someone else holds
fn is_lock_not_available(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("55P03"))
}

#[derive(FromRow)]
struct SnapshotRow {
    seat_id: Uuid,
    owner_id: Option<Uuid>,
    listed: bool,
    holder_id: Option<Uuid>,
    hold_expires_at: Option<DateTime<Utc>>,
}

/// Tries to lock every seat; returns the ones another transaction holds.
async fn try_lock_seats(
    conn: &mut PgConnection,
    event_id: Uuid,
    seat_ids: &[Uuid],
) -> Result<Vec<Uuid>, sqlx::Error> {
    let mut ordered = seat_ids.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut contended = Vec::new();
    for seat_id in ordered {
        let locked: bool = sqlx::query_scalar(
            "SELECT pg_try_advisory_xact_lock(hashtextextended($1::text || ':' || $2::text, 0))",
        )
        .bind(event_id)
        .bind(seat_id)
        .fetch_one(&mut *conn)
        .await?;
        if !locked {
            contended.push(seat_id);
        }
    }
    Ok(contended)
}

async fn load_snapshots(
    conn: &mut PgConnection,
    event_id: Uuid,
    seat_ids: &[Uuid],
) -> Result<Vec<(Uuid, SeatSnapshot)>, sqlx::Error> {
    let rows: Vec<SnapshotRow> = sqlx::query_as(
        r#"
        SELECT s.seat_id,
               p.user_id AS owner_id,
               EXISTS (
                   SELECT 1 FROM marketplace_listings l
                   WHERE l.event_id = $1 AND l.seat_id = s.seat_id AND l.status = 'active'
               ) AS listed,
               r.user_id AS holder_id,
               r.expires_at AS hold_expires_at
        FROM UNNEST($2::uuid[]) AS s(seat_id)
        LEFT JOIN purchases p ON p.event_id = $1 AND p.seat_id = s.seat_id
        LEFT JOIN reservations r ON r.event_id = $1 AND r.seat_id = s.seat_id
        "#,
    )
    .bind(event_id)
    .bind(seat_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_seat: HashMap<Uuid, SeatSnapshot> = rows
        .into_iter()
        .map(|row| {
            (
                row.seat_id,
                SeatSnapshot {
                    owner_id: row.owner_id,
                    listed: row.listed,
                    holder_id: row.holder_id,
                    hold_expires_at: row.hold_expires_at,
                },
            )
        })
        .collect();

    Ok(seat_ids
        .iter()
        .map(|seat_id| (*seat_id, by_seat.remove(seat_id).unwrap_or_default()))
        .collect())
}

/// Drops expired holds on seats the caller already has advisory locks for.
async fn sweep_seats(
    conn: &mut PgConnection,
    event_id: Uuid,
    seat_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM reservations WHERE event_id = $1 AND seat_id = ANY($2) AND expires_at <= $3",
    )
    .bind(event_id)
    .bind(seat_ids)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn clear_holds(conn: &mut PgConnection, user_id: Uuid, event_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reservations WHERE user_id = $1 AND event_id = $2")
        .bind(user_id)
        .bind(event_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn save_payment_method(conn: &mut PgConnection, method: &SavedPaymentMethod) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO payment_methods ({PAYMENT_METHOD_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    ))
    .bind(method.id)
    .bind(method.user_id)
    .bind(&method.cardholder_name)
    .bind(&method.last_four_digits)
    .bind(method.expiration_month)
    .bind(method.expiration_year)
    .bind(&method.billing_address)
    .bind(&method.billing_city)
    .bind(&method.billing_state)
    .bind(&method.billing_zip)
    .bind(method.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_purchase_row(
    conn: &mut PgConnection,
    user_id: Uuid,
    event_id: Uuid,
    seat_id: Uuid,
    price: f64,
    now: DateTime<Utc>,
) -> InventoryResult<Purchase> {
    sqlx::query_as::<_, Purchase>(&format!(
        "INSERT INTO purchases ({PURCHASE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {PURCHASE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(event_id)
    .bind(seat_id)
    .bind(price)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            InventoryError::SeatUnavailable(vec![seat_id])
        } else {
            InventoryError::Database(e)
        }
    })
}

/// Purchase body shared by single-user and group purchases. Runs inside the
/// caller's transaction; any error leaves the transaction to roll back on drop.
async fn apply_purchase(tx: &mut Transaction<'_, Postgres>, batch: &PurchaseBatch) -> InventoryResult<Vec<Purchase>> {
    let seat_ids = batch.seat_ids();
    let distinct: HashSet<Uuid> = seat_ids.iter().copied().collect();
    if distinct.len() != seat_ids.len() {
        return Err(InventoryError::Validation("duplicate seat in purchase".to_string()));
    }

    let contended = try_lock_seats(tx, batch.event_id, &seat_ids).await?;
    if !contended.is_empty() {
        debug!("purchase lost seat locks for event {}: {:?}", batch.event_id, contended);
        return Err(InventoryError::SeatUnavailable(contended));
    }

    sweep_seats(tx, batch.event_id, &seat_ids, batch.now).await?;
    let snapshots = load_snapshots(tx, batch.event_id, &seat_ids).await?;
    let blocked = blocked_seats(&snapshots, batch.user_id, batch.now);
    if !blocked.is_empty() {
        return Err(InventoryError::SeatUnavailable(blocked));
    }

    let mut purchases = Vec::with_capacity(batch.seats.len());
    for seat in &batch.seats {
        purchases.push(
            insert_purchase_row(tx, batch.user_id, batch.event_id, seat.seat_id, seat.price, batch.now).await?,
        );
    }
    if let Some(method) = &batch.payment_method {
        save_payment_method(tx, method).await?;
    }
    clear_holds(tx, batch.user_id, batch.event_id).await?;
    Ok(purchases)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupLock {
    Read,
    /// Membership writes queue behind each other.
    Wait,
    /// The purchase commit refuses to queue behind another writer.
    NoWait,
}

impl GroupLock {
    fn clause(self) -> &'static str {
        match self {
            GroupLock::Read => "",
            GroupLock::Wait => " FOR UPDATE",
            GroupLock::NoWait => " FOR UPDATE NOWAIT",
        }
    }
}

async fn load_group_details(conn: &mut PgConnection, group_id: Uuid, lock: GroupLock) -> InventoryResult<Option<GroupDetails>> {
    let lock = lock.clause();
    let group = sqlx::query_as::<_, GroupPurchase>(&format!(
        "SELECT {GROUP_COLUMNS} FROM group_purchases WHERE id = $1{lock}"
    ))
    .bind(group_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        if is_lock_not_available(&e) {
            InventoryError::Conflict("group is being modified; retry".to_string())
        } else {
            InventoryError::Database(e)
        }
    })?;

    let Some(group) = group else {
        return Ok(None);
    };
    let members = sqlx::query_as::<_, GroupMember>(&format!(
        "SELECT {MEMBER_COLUMNS} FROM group_members WHERE group_id = $1 ORDER BY invited_at, user_id"
    ))
    .bind(group_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(GroupDetails { group, members }))
}

/// Inventory and group state in Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn seat_status(
        &self,
        event_id: Uuid,
        seat_ids: &[Uuid],
        requester: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> InventoryResult<HashMap<Uuid, SeatStatus>> {
        let mut conn = self.pool.acquire().await?;
        let snapshots = load_snapshots(&mut conn, event_id, seat_ids).await?;
        Ok(snapshots
            .into_iter()
            .map(|(seat_id, snapshot)| (seat_id, resolve(&snapshot, requester, now)))
            .collect())
    }

    async fn insert_purchase(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<Purchase> {
        let mut conn = self.pool.acquire().await?;
        insert_purchase_row(&mut conn, user_id, event_id, seat_id, price, now).await
    }

    async fn transfer_purchase(&self, purchase_id: Uuid, new_buyer_id: Uuid) -> InventoryResult<Purchase> {
        sqlx::query_as::<_, Purchase>(&format!(
            "UPDATE purchases SET user_id = $2 WHERE id = $1 RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(purchase_id)
        .bind(new_buyer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| InventoryError::NotFound("purchase".to_string()))
    }

    async fn upsert_reservation(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Reservation> {
        // The conditional DO UPDATE makes check and write one statement.
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO reservations ({RESERVATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (seat_id, event_id) DO UPDATE
               SET user_id = EXCLUDED.user_id,
                   expires_at = EXCLUDED.expires_at,
                   created_at = EXCLUDED.created_at
             WHERE reservations.user_id = EXCLUDED.user_id
                OR reservations.expires_at <= $5
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(seat_id)
        .bind(event_id)
        .bind(user_id)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(InventoryError::SeatUnavailable(vec![seat_id]))
    }

    async fn delete_reservations_for(&self, user_id: Uuid, event_id: Uuid) -> InventoryResult<u64> {
        let mut conn = self.pool.acquire().await?;
        Ok(clear_holds(&mut conn, user_id, event_id).await?)
    }

    async fn sweep_expired_reservations(&self, now: DateTime<Utc>) -> InventoryResult<u64> {
        let result = sqlx::query("DELETE FROM reservations WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_selection(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;
        let contended = try_lock_seats(&mut tx, event_id, seat_ids).await?;
        clear_holds(&mut tx, user_id, event_id).await?;

        let mut blocked = if contended.is_empty() {
            sweep_seats(&mut tx, event_id, seat_ids, now).await?;
            let snapshots = load_snapshots(&mut tx, event_id, seat_ids).await?;
            blocked_seats(&snapshots, user_id, now)
        } else {
            contended
        };

        let mut reservations = Vec::with_capacity(seat_ids.len());
        if blocked.is_empty() {
            for seat_id in seat_ids {
                let inserted = sqlx::query_as::<_, Reservation>(&format!(
                    "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (seat_id, event_id) DO NOTHING RETURNING {RESERVATION_COLUMNS}"
                ))
                .bind(seat_id)
                .bind(event_id)
                .bind(user_id)
                .bind(expires_at)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?;
                match inserted {
                    Some(reservation) => reservations.push(reservation),
                    None => {
                        blocked.push(*seat_id);
                        break;
                    }
                }
            }
        }

        if !blocked.is_empty() {
            // partial inserts go; the clear of the previous selection stands
            if !reservations.is_empty() {
                clear_holds(&mut tx, user_id, event_id).await?;
            }
            tx.commit().await?;
            return Err(InventoryError::SeatUnavailable(blocked));
        }
        tx.commit().await?;
        Ok(reservations)
    }

    async fn reservations_for(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>> {
        Ok(sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE user_id = $1 AND event_id = $2 AND expires_at > $3 ORDER BY seat_id"
        ))
        .bind(user_id)
        .bind(event_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn commit_purchase(&self, batch: PurchaseBatch) -> InventoryResult<Vec<Purchase>> {
        let mut tx = self.pool.begin().await?;
        let purchases = apply_purchase(&mut tx, &batch).await?;
        tx.commit().await?;
        Ok(purchases)
    }

    async fn purchase_for_seat(&self, event_id: Uuid, seat_id: Uuid) -> InventoryResult<Option<Purchase>> {
        Ok(sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE event_id = $1 AND seat_id = $2"
        ))
        .bind(event_id)
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<Purchase>> {
        Ok(sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE user_id = $1 ORDER BY purchase_date DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn payment_methods_for(&self, user_id: Uuid) -> InventoryResult<Vec<SavedPaymentMethod>> {
        Ok(sqlx::query_as::<_, SavedPaymentMethod>(&format!(
            "SELECT {PAYMENT_METHOD_COLUMNS} FROM payment_methods WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_listing(
        &self,
        seller_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        list_price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<MarketplaceListing> {
        let mut tx = self.pool.begin().await?;
        let contended = try_lock_seats(&mut tx, event_id, &[seat_id]).await?;
        if !contended.is_empty() {
            return Err(InventoryError::Conflict("seat is being modified; retry".to_string()));
        }

        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE event_id = $1 AND seat_id = $2 FOR UPDATE"
        ))
        .bind(event_id)
        .bind(seat_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| InventoryError::NotFound("purchase for seat".to_string()))?;
        if purchase.user_id != seller_id {
            return Err(InventoryError::Forbidden("seat is not owned by seller".to_string()));
        }

        let listing = sqlx::query_as::<_, MarketplaceListing>(&format!(
            "INSERT INTO marketplace_listings ({LISTING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, 'active', NULL, $7, NULL) \
             RETURNING {LISTING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(seller_id)
        .bind(event_id)
        .bind(seat_id)
        .bind(purchase.id)
        .bind(list_price)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                InventoryError::Conflict("seat already has an active listing".to_string())
            } else {
                InventoryError::Database(e)
            }
        })?;

        tx.commit().await?;
        Ok(listing)
    }

    async fn sell_listing(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        payment_method: Option<SavedPaymentMethod>,
        now: DateTime<Utc>,
    ) -> InventoryResult<(MarketplaceListing, Purchase)> {
        let mut tx = self.pool.begin().await?;
        let listing = sqlx::query_as::<_, MarketplaceListing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = $1 FOR UPDATE NOWAIT"
        ))
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_lock_not_available(&e) {
                InventoryError::Conflict("listing is being purchased by someone else".to_string())
            } else {
                InventoryError::Database(e)
            }
        })?
        .ok_or_else(|| InventoryError::NotFound("listing".to_string()))?;

        if !listing.is_active() {
            return Err(InventoryError::Conflict("listing is no longer active".to_string()));
        }
        if listing.seller_id == buyer_id {
            return Err(InventoryError::Forbidden("cannot buy your own listing".to_string()));
        }

        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            "UPDATE purchases SET user_id = $2 WHERE id = $1 AND user_id = $3 RETURNING {PURCHASE_COLUMNS}"
        ))
        .bind(listing.purchase_id)
        .bind(buyer_id)
        .bind(listing.seller_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| InventoryError::Conflict("seller no longer owns the seat".to_string()))?;

        let sold = sqlx::query_as::<_, MarketplaceListing>(&format!(
            "UPDATE marketplace_listings SET status = 'sold', buyer_id = $2, sold_at = $3 \
             WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        ))
        .bind(listing_id)
        .bind(buyer_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(method) = &payment_method {
            save_payment_method(&mut tx, method).await?;
        }
        tx.commit().await?;
        Ok((sold, purchase))
    }

    async fn remove_listing(&self, listing_id: Uuid, seller_id: Uuid) -> InventoryResult<MarketplaceListing> {
        let mut tx = self.pool.begin().await?;
        let listing = sqlx::query_as::<_, MarketplaceListing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = $1 FOR UPDATE NOWAIT"
        ))
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_lock_not_available(&e) {
                InventoryError::Conflict("listing is being purchased by someone else".to_string())
            } else {
                InventoryError::Database(e)
            }
        })?
        .ok_or_else(|| InventoryError::NotFound("listing".to_string()))?;

        if listing.seller_id != seller_id {
            return Err(InventoryError::Forbidden("only the seller can remove a listing".to_string()));
        }
        if !listing.is_active() {
            return Err(InventoryError::Conflict("listing is no longer active".to_string()));
        }

        let removed = sqlx::query_as::<_, MarketplaceListing>(&format!(
            "UPDATE marketplace_listings SET status = 'removed' WHERE id = $1 RETURNING {LISTING_COLUMNS}"
        ))
        .bind(listing_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn listing(&self, listing_id: Uuid) -> InventoryResult<Option<MarketplaceListing>> {
        Ok(sqlx::query_as::<_, MarketplaceListing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings WHERE id = $1"
        ))
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn active_listings(&self, event_id: Option<Uuid>) -> InventoryResult<Vec<MarketplaceListing>> {
        Ok(sqlx::query_as::<_, MarketplaceListing>(&format!(
            "SELECT {LISTING_COLUMNS} FROM marketplace_listings \
             WHERE status = 'active' AND ($1::uuid IS NULL OR event_id = $1) \
             ORDER BY created_at DESC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn stats(&self, now: DateTime<Utc>) -> InventoryResult<InventoryStats> {
        Ok(sqlx::query_as::<_, InventoryStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM reservations WHERE expires_at > $1) AS live_reservations,
                (SELECT COUNT(*) FROM reservations WHERE expires_at <= $1) AS expired_reservations,
                (SELECT COUNT(*) FROM purchases) AS purchases,
                (SELECT COUNT(*) FROM marketplace_listings WHERE status = 'active') AS active_listings
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn create_group(&self, group: GroupPurchase) -> InventoryResult<GroupPurchase> {
        Ok(sqlx::query_as::<_, GroupPurchase>(&format!(
            "INSERT INTO group_purchases ({GROUP_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {GROUP_COLUMNS}"
        ))
        .bind(group.id)
        .bind(group.event_id)
        .bind(group.leader_id)
        .bind(&group.group_name)
        .bind(group.max_members)
        .bind(group.target_seats)
        .bind(group.status.as_str())
        .bind(group.total_prepaid)
        .bind(group.estimated_price_per_seat)
        .bind(group.actual_total_cost)
        .bind(group.leader_seat_id)
        .bind(group.leader_price)
        .bind(group.created_at)
        .bind(group.updated_at)
        .bind(group.completed_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn group(&self, group_id: Uuid) -> InventoryResult<Option<GroupDetails>> {
        let mut conn = self.pool.acquire().await?;
        load_group_details(&mut conn, group_id, GroupLock::Read).await
    }

    async fn groups_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<GroupPurchase>> {
        Ok(sqlx::query_as::<_, GroupPurchase>(&format!(
            "SELECT {GROUP_COLUMNS} FROM group_purchases g \
             WHERE g.leader_id = $1 \
                OR EXISTS (SELECT 1 FROM group_members m WHERE m.group_id = g.id AND m.user_id = $1) \
             ORDER BY g.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn invite_members(
        &self,
        group_id: Uuid,
        leader_id: Uuid,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails> {
        let mut tx = self.pool.begin().await?;
        let details = load_group_details(&mut tx, group_id, GroupLock::Wait)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        if details.group.leader_id != leader_id {
            return Err(InventoryError::Forbidden("only the group leader can invite".to_string()));
        }
        if details.group.status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group is no longer forming".to_string()));
        }

        let mut fresh: Vec<Uuid> = Vec::new();
        for user_id in user_ids {
            if *user_id != leader_id && !details.is_participant(*user_id) && !fresh.contains(user_id) {
                fresh.push(*user_id);
            }
        }
        if details.headcount() + fresh.len() > details.group.max_members as usize {
            return Err(InventoryError::Conflict(format!(
                "group is full ({} of {} places taken)",
                details.headcount(),
                details.group.max_members
            )));
        }

        for user_id in &fresh {
            sqlx::query(
                "INSERT INTO group_members (group_id, user_id, status, invited_at, prepaid_amount) \
                 VALUES ($1, $2, $3, $4, 0) ON CONFLICT (group_id, user_id) DO NOTHING",
            )
            .bind(group_id)
            .bind(user_id)
            .bind(MemberStatus::Invited.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE group_purchases SET updated_at = $2 WHERE id = $1")
            .bind(group_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let details = load_group_details(&mut tx, group_id, GroupLock::Read)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        tx.commit().await?;
        Ok(details)
    }

    async fn join_group(&self, group_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> InventoryResult<GroupMember> {
        let mut tx = self.pool.begin().await?;
        let details = load_group_details(&mut tx, group_id, GroupLock::Wait)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        if details.group.status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group is no longer forming".to_string()));
        }

        let member = sqlx::query_as::<_, GroupMember>(&format!(
            "UPDATE group_members SET status = $3, joined_at = COALESCE(joined_at, $4) \
             WHERE group_id = $1 AND user_id = $2 RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(MemberStatus::Joined.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| InventoryError::Forbidden("not invited to this group".to_string()))?;

        tx.commit().await?;
        Ok(member)
    }

    async fn record_prepayment(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        amount: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails> {
        let mut tx = self.pool.begin().await?;
        let details = load_group_details(&mut tx, group_id, GroupLock::Wait)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        let member = details
            .members
            .iter()
            .find(|m| m.user_id == user_id && m.status == MemberStatus::Joined)
            .ok_or_else(|| InventoryError::Forbidden("only joined members can prepay".to_string()))?;

        sqlx::query("UPDATE group_members SET prepaid_amount = $3 WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .bind(round_cents(member.prepaid_amount + amount))
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE group_purchases SET total_prepaid = $2, updated_at = $3 WHERE id = $1")
            .bind(group_id)
            .bind(round_cents(details.group.total_prepaid + amount))
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let details = load_group_details(&mut tx, group_id, GroupLock::Read)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        tx.commit().await?;
        Ok(details)
    }

    async fn commit_group_purchase(&self, commit: GroupCommit) -> InventoryResult<(GroupDetails, Vec<Purchase>)> {
        let mut tx = self.pool.begin().await?;
        let details = load_group_details(&mut tx, commit.group_id, GroupLock::NoWait)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        if details.group.status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group is no longer forming".to_string()));
        }
        let joined: HashSet<Uuid> = details.joined_members().iter().map(|m| m.user_id).collect();
        let members_match = commit
            .assignments
            .iter()
            .filter(|a| !a.is_leader)
            .all(|a| joined.contains(&a.user_id));
        if joined.len() != commit.expected_joined || !members_match {
            warn!("group {} membership changed during purchase", commit.group_id);
            return Err(InventoryError::Conflict(
                "group membership changed; resubmit the purchase".to_string(),
            ));
        }

        let purchases = apply_purchase(&mut tx, &commit.batch).await?;

        for assignment in commit.assignments.iter().filter(|a| !a.is_leader) {
            sqlx::query(
                "UPDATE group_members SET seat_assigned_id = $3, final_price = $4 \
                 WHERE group_id = $1 AND user_id = $2",
            )
            .bind(commit.group_id)
            .bind(assignment.user_id)
            .bind(assignment.seat_id)
            .bind(assignment.price)
            .execute(&mut *tx)
            .await?;
        }
        let leader = commit.assignments.iter().find(|a| a.is_leader);
        sqlx::query(
            "UPDATE group_purchases \
             SET status = $2, actual_total_cost = $3, leader_seat_id = $4, leader_price = $5, \
                 completed_at = $6, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(commit.group_id)
        .bind(GroupStatus::Completed.as_str())
        .bind(commit.batch.total())
        .bind(leader.map(|a| a.seat_id))
        .bind(leader.map(|a| a.price))
        .bind(commit.batch.now)
        .execute(&mut *tx)
        .await?;

        let details = load_group_details(&mut tx, commit.group_id, GroupLock::Read)
            .await?
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        tx.commit().await?;
        Ok((details, purchases))
    }
}

/// Catalog tables in Postgres.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SEAT_COLUMNS: &str = "id, venue_id, section, row, number, base_price, multiplier, x, y";

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn get_event(&self, event_id: Uuid) -> InventoryResult<Option<Event>> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT id, venue_id, title, description, date, on_sale_date FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn upcoming_events(&self, now: DateTime<Utc>) -> InventoryResult<Vec<Event>> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT id, venue_id, title, description, date, on_sale_date FROM events \
             WHERE date > $1 ORDER BY date",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_venue(&self, venue_id: Uuid) -> InventoryResult<Option<Venue>> {
        Ok(sqlx::query_as::<_, Venue>("SELECT id, name, address, capacity FROM venues WHERE id = $1")
            .bind(venue_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_seat(&self, seat_id: Uuid) -> InventoryResult<Option<Seat>> {
        Ok(sqlx::query_as::<_, Seat>(&format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = $1"))
            .bind(seat_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_seats_for_venue(&self, venue_id: Uuid) -> InventoryResult<Vec<Seat>> {
        Ok(sqlx::query_as::<_, Seat>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE venue_id = $1 ORDER BY section, row, number"
        ))
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_seats(&self, seat_ids: &[Uuid]) -> InventoryResult<Vec<Option<Seat>>> {
        let rows = sqlx::query_as::<_, Seat>(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats WHERE id = ANY($1)"
        ))
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_id: HashMap<Uuid, Seat> = rows.into_iter().map(|s| (s.id, s)).collect();
        Ok(seat_ids.iter().map(|id| by_id.remove(id)).collect())
    }
}
