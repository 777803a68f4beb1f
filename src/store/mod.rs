//! Durable state behind the seat inventory.
//!
//! Components receive these traits as injected capabilities. Every method that
//! gates a write on availability re-evaluates it inside the same transaction (or
//! lock scope) as the write, so two concurrent callers cannot both pass the check.

pub mod availability;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::InventoryResult;
use crate::models::{
    Event, GroupDetails, GroupMember, GroupPurchase, MarketplaceListing, Purchase, Reservation,
    SavedPaymentMethod, Seat, Venue,
};

pub use availability::{resolve, SeatSnapshot, SeatStatus};
pub use memory::{MemoryCatalog, MemoryStore};
pub use postgres::{PgCatalog, PgStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedSeat {
    pub seat_id: Uuid,
    pub price: f64,
}

/// A validated, priced multi-seat purchase ready to commit.
#[derive(Debug, Clone)]
pub struct PurchaseBatch {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub seats: Vec<PricedSeat>,
    pub payment_method: Option<SavedPaymentMethod>,
    pub now: DateTime<Utc>,
}

impl PurchaseBatch {
    pub fn seat_ids(&self) -> Vec<Uuid> {
        self.seats.iter().map(|s| s.seat_id).collect()
    }

    pub fn total(&self) -> f64 {
        crate::models::round_cents(self.seats.iter().map(|s| s.price).sum())
    }
}

/// One seat handed to one participant of a group purchase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeatAssignment {
    pub user_id: Uuid,
    pub seat_id: Uuid,
    pub price: f64,
    pub is_leader: bool,
}

#[derive(Debug, Clone)]
pub struct GroupCommit {
    pub group_id: Uuid,
    /// Joined-member count the assignments were computed against.
    pub expected_joined: usize,
    pub batch: PurchaseBatch,
    pub assignments: Vec<SeatAssignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub live_reservations: i64,
    pub expired_reservations: i64,
    pub purchases: i64,
    pub active_listings: i64,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Resolved status for each requested seat; expiry is applied at read time.
    async fn seat_status(
        &self,
        event_id: Uuid,
        seat_ids: &[Uuid],
        requester: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> InventoryResult<HashMap<Uuid, SeatStatus>>;

    /// Fails with `SeatUnavailable` when a purchase already exists for (event, seat).
    async fn insert_purchase(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<Purchase>;

    async fn transfer_purchase(&self, purchase_id: Uuid, new_buyer_id: Uuid) -> InventoryResult<Purchase>;

    /// Fails with `SeatUnavailable` when a live hold by a different user exists.
    async fn upsert_reservation(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Reservation>;

    async fn delete_reservations_for(&self, user_id: Uuid, event_id: Uuid) -> InventoryResult<u64>;

    async fn sweep_expired_reservations(&self, now: DateTime<Utc>) -> InventoryResult<u64>;

    /// Clears the user's holds for the event, then holds every seat or none.
    /// The clear stays committed even when the batch is rejected.
    async fn replace_selection(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>>;

    async fn reservations_for(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>>;

    /// All-or-nothing: re-checks availability, writes one purchase per seat, saves
    /// the payment method if given, and drops the buyer's holds for the event.
    async fn commit_purchase(&self, batch: PurchaseBatch) -> InventoryResult<Vec<Purchase>>;

    async fn purchase_for_seat(&self, event_id: Uuid, seat_id: Uuid) -> InventoryResult<Option<Purchase>>;

    async fn purchases_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<Purchase>>;

    async fn payment_methods_for(&self, user_id: Uuid) -> InventoryResult<Vec<SavedPaymentMethod>>;

    async fn create_listing(
        &self,
        seller_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        list_price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<MarketplaceListing>;

    /// Transfers the underlying purchase and marks the listing sold in one step.
    async fn sell_listing(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        payment_method: Option<SavedPaymentMethod>,
        now: DateTime<Utc>,
    ) -> InventoryResult<(MarketplaceListing, Purchase)>;

    async fn remove_listing(&self, listing_id: Uuid, seller_id: Uuid) -> InventoryResult<MarketplaceListing>;

    async fn listing(&self, listing_id: Uuid) -> InventoryResult<Option<MarketplaceListing>>;

    async fn active_listings(&self, event_id: Option<Uuid>) -> InventoryResult<Vec<MarketplaceListing>>;

    async fn stats(&self, now: DateTime<Utc>) -> InventoryResult<InventoryStats>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create_group(&self, group: GroupPurchase) -> InventoryResult<GroupPurchase>;

    async fn group(&self, group_id: Uuid) -> InventoryResult<Option<GroupDetails>>;

    /// Groups the user leads or has a member row in.
    async fn groups_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<GroupPurchase>>;

    /// Leader-only; skips users already in the group and enforces `max_members`.
    async fn invite_members(
        &self,
        group_id: Uuid,
        leader_id: Uuid,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails>;

    async fn join_group(&self, group_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> InventoryResult<GroupMember>;

    async fn record_prepayment(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        amount: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails>;

    /// Purchases every seat under the leader, writes the assignments and completes
    /// the group, or changes nothing at all.
    async fn commit_group_purchase(&self, commit: GroupCommit) -> InventoryResult<(GroupDetails, Vec<Purchase>)>;
}

/// Read-mostly reference data: events, venues and seat layouts.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_event(&self, event_id: Uuid) -> InventoryResult<Option<Event>>;

    /// Events that have not happened yet, soonest first.
    async fn upcoming_events(&self, now: DateTime<Utc>) -> InventoryResult<Vec<Event>>;

    async fn get_venue(&self, venue_id: Uuid) -> InventoryResult<Option<Venue>>;

    async fn get_seat(&self, seat_id: Uuid) -> InventoryResult<Option<Seat>>;

    async fn list_seats_for_venue(&self, venue_id: Uuid) -> InventoryResult<Vec<Seat>>;

    async fn get_seats(&self, seat_ids: &[Uuid]) -> InventoryResult<Vec<Option<Seat>>> {
        let mut seats = Vec::with_capacity(seat_ids.len());
        for seat_id in seat_ids {
            seats.push(self.get_seat(*seat_id).await?);
        }
        Ok(seats)
    }
}
