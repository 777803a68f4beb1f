//! In-process backend. One mutex guards all tables, so every trait method is a
//! serializable transaction: checks and writes happen under the same guard and
//! all checks run before the first write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::availability::{blocked_seats, resolve, SeatSnapshot, SeatStatus};
use super::{
    CatalogStore, GroupCommit, GroupStore, InventoryStats, InventoryStore, PurchaseBatch,
};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    round_cents, Event, GroupDetails, GroupMember, GroupPurchase, GroupStatus, ListingStatus,
    MarketplaceListing, MemberStatus, Purchase, Reservation, SavedPaymentMethod, Seat,
    Venue,
};

#[derive(Default)]
struct Tables {
    purchases: HashMap<Uuid, Purchase>,
    /// (event_id, seat_id) -> purchase id; the uniqueness constraint.
    purchase_by_seat: HashMap<(Uuid, Uuid), Uuid>,
    /// Keyed by (seat_id, event_id).
    reservations: HashMap<(Uuid, Uuid), Reservation>,
    listings: HashMap<Uuid, MarketplaceListing>,
    payment_methods: Vec<SavedPaymentMethod>,
    groups: HashMap<Uuid, GroupPurchase>,
    members: HashMap<Uuid, Vec<GroupMember>>,
}

impl Tables {
    fn snapshot(&self, event_id: Uuid, seat_id: Uuid) -> SeatSnapshot {
        let owner = self
            .purchase_by_seat
            .get(&(event_id, seat_id))
            .and_then(|id| self.purchases.get(id));
        let listed = self
            .listings
            .values()
            .any(|l| l.event_id == event_id && l.seat_id == seat_id && l.is_active());
        let hold = self.reservations.get(&(seat_id, event_id));

        SeatSnapshot {
            owner_id: owner.map(|p| p.user_id),
            listed,
            holder_id: hold.map(|r| r.user_id),
            hold_expires_at: hold.map(|r| r.expires_at),
        }
    }

    fn snapshots(&self, event_id: Uuid, seat_ids: &[Uuid]) -> Vec<(Uuid, SeatSnapshot)> {
        seat_ids
            .iter()
            .map(|seat_id| (*seat_id, self.snapshot(event_id, *seat_id)))
            .collect()
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> u64 {
        let before = self.reservations.len();
        self.reservations.retain(|_, r| r.is_live(now));
        (before - self.reservations.len()) as u64
    }

    fn clear_holds(&mut self, user_id: Uuid, event_id: Uuid) -> u64 {
        let before = self.reservations.len();
        self.reservations
            .retain(|_, r| !(r.user_id == user_id && r.event_id == event_id));
        (before - self.reservations.len()) as u64
    }

    fn insert_purchase_row(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<Purchase> {
        if self.purchase_by_seat.contains_key(&(event_id, seat_id)) {
            return Err(InventoryError::SeatUnavailable(vec![seat_id]));
        }
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            seat_id,
            price,
            purchase_date: now,
        };
        self.purchase_by_seat.insert((event_id, seat_id), purchase.id);
        self.purchases.insert(purchase.id, purchase.clone());
        Ok(purchase)
    }

    /// Checks the whole batch first; writes only when every seat passes.
    fn apply_purchase(&mut self, batch: &PurchaseBatch) -> InventoryResult<Vec<Purchase>> {
        let seat_ids = batch.seat_ids();
        let distinct: HashSet<Uuid> = seat_ids.iter().copied().collect();
        if distinct.len() != seat_ids.len() {
            return Err(InventoryError::Validation("duplicate seat in purchase".to_string()));
        }

        self.sweep(batch.now);
        let snapshots = self.snapshots(batch.event_id, &seat_ids);
        let blocked = blocked_seats(&snapshots, batch.user_id, batch.now);
        if !blocked.is_empty() {
            return Err(InventoryError::SeatUnavailable(blocked));
        }

        let mut purchases = Vec::with_capacity(batch.seats.len());
        for seat in &batch.seats {
            purchases.push(self.insert_purchase_row(
                batch.user_id,
                batch.event_id,
                seat.seat_id,
                seat.price,
                batch.now,
            )?);
        }
        if let Some(method) = &batch.payment_method {
            self.payment_methods.push(method.clone());
        }
        self.clear_holds(batch.user_id, batch.event_id);
        Ok(purchases)
    }

    fn group_details(&self, group_id: Uuid) -> Option<GroupDetails> {
        let group = self.groups.get(&group_id)?.clone();
        let mut members = self.members.get(&group_id).cloned().unwrap_or_default();
        members.sort_by(|a, b| a.invited_at.cmp(&b.invited_at).then(a.user_id.cmp(&b.user_id)));
        Some(GroupDetails { group, members })
    }
}

/// Inventory and group state held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn seat_status(
        &self,
        event_id: Uuid,
        seat_ids: &[Uuid],
        requester: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> InventoryResult<HashMap<Uuid, SeatStatus>> {
        let tables = self.tables.lock().await;
        Ok(seat_ids
            .iter()
            .map(|seat_id| {
                let snapshot = tables.snapshot(event_id, *seat_id);
                (*seat_id, resolve(&snapshot, requester, now))
            })
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
        let mut tables = self.tables.lock().await;
        tables.insert_purchase_row(user_id, event_id, seat_id, price, now)
    }

    async fn transfer_purchase(&self, purchase_id: Uuid, new_buyer_id: Uuid) -> InventoryResult<Purchase> {
        let mut tables = self.tables.lock().await;
        let purchase = tables
            .purchases
            .get_mut(&purchase_id)
            .ok_or_else(|| InventoryError::NotFound("purchase".to_string()))?;
        purchase.user_id = new_buyer_id;
        Ok(purchase.clone())
    }

    async fn upsert_reservation(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Reservation> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.reservations.get(&(seat_id, event_id)) {
            if existing.user_id != user_id && existing.is_live(now) {
                return Err(InventoryError::SeatUnavailable(vec![seat_id]));
            }
        }
        let reservation = Reservation {
            seat_id,
            event_id,
            user_id,
            expires_at,
            created_at: now,
        };
        tables
            .reservations
            .insert((seat_id, event_id), reservation.clone());
        Ok(reservation)
    }

    async fn delete_reservations_for(&self, user_id: Uuid, event_id: Uuid) -> InventoryResult<u64> {
        let mut tables = self.tables.lock().await;
        Ok(tables.clear_holds(user_id, event_id))
    }

    async fn sweep_expired_reservations(&self, now: DateTime<Utc>) -> InventoryResult<u64> {
        let mut tables = self.tables.lock().await;
        Ok(tables.sweep(now))
    }

    async fn replace_selection(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>> {
        let mut tables = self.tables.lock().await;
        tables.sweep(now);
        tables.clear_holds(user_id, event_id);

        let snapshots = tables.snapshots(event_id, seat_ids);
        let blocked = blocked_seats(&snapshots, user_id, now);
        if !blocked.is_empty() {
            return Err(InventoryError::SeatUnavailable(blocked));
        }

        let reservations: Vec<Reservation> = seat_ids
            .iter()
            .map(|seat_id| Reservation {
                seat_id: *seat_id,
                event_id,
                user_id,
                expires_at,
                created_at: now,
            })
            .collect();
        for reservation in &reservations {
            tables
                .reservations
                .insert((reservation.seat_id, event_id), reservation.clone());
        }
        Ok(reservations)
    }

    async fn reservations_for(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> InventoryResult<Vec<Reservation>> {
        let tables = self.tables.lock().await;
        let mut held: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && r.event_id == event_id && r.is_live(now))
            .cloned()
            .collect();
        held.sort_by_key(|r| r.seat_id);
        Ok(held)
    }

    async fn commit_purchase(&self, batch: PurchaseBatch) -> InventoryResult<Vec<Purchase>> {
        let mut tables = self.tables.lock().await;
        tables.apply_purchase(&batch)
    }

    async fn purchase_for_seat(&self, event_id: Uuid, seat_id: Uuid) -> InventoryResult<Option<Purchase>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .purchase_by_seat
            .get(&(event_id, seat_id))
            .and_then(|id| tables.purchases.get(id))
            .cloned())
    }

    async fn purchases_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<Purchase>> {
        let tables = self.tables.lock().await;
        let mut purchases: Vec<Purchase> = tables
            .purchases
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.purchase_date.cmp(&a.purchase_date));
        Ok(purchases)
    }

    async fn payment_methods_for(&self, user_id: Uuid) -> InventoryResult<Vec<SavedPaymentMethod>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payment_methods
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_listing(
        &self,
        seller_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        list_price: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<MarketplaceListing> {
        let mut tables = self.tables.lock().await;
        let purchase = tables
            .purchase_by_seat
            .get(&(event_id, seat_id))
            .and_then(|id| tables.purchases.get(id))
            .ok_or_else(|| InventoryError::NotFound("purchase for seat".to_string()))?;
        if purchase.user_id != seller_id {
            return Err(InventoryError::Forbidden("seat is not owned by seller".to_string()));
        }
        let purchase_id = purchase.id;
        if tables
            .listings
            .values()
            .any(|l| l.event_id == event_id && l.seat_id == seat_id && l.is_active())
        {
            return Err(InventoryError::Conflict("seat already has an active listing".to_string()));
        }

        let listing = MarketplaceListing {
            id: Uuid::new_v4(),
            seller_id,
            event_id,
            seat_id,
            purchase_id,
            list_price,
            status: ListingStatus::Active,
            buyer_id: None,
            created_at: now,
            sold_at: None,
        };
        tables.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn sell_listing(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        payment_method: Option<SavedPaymentMethod>,
        now: DateTime<Utc>,
    ) -> InventoryResult<(MarketplaceListing, Purchase)> {
        let mut tables = self.tables.lock().await;
        let listing = tables
            .listings
            .get(&listing_id)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound("listing".to_string()))?;
        if !listing.is_active() {
            return Err(InventoryError::Conflict("listing is no longer active".to_string()));
        }
        if listing.seller_id == buyer_id {
            return Err(InventoryError::Forbidden("cannot buy your own listing".to_string()));
        }
        match tables.purchases.get(&listing.purchase_id) {
            None => return Err(InventoryError::NotFound("purchase".to_string())),
            Some(p) if p.user_id != listing.seller_id => {
                return Err(InventoryError::Conflict("seller no longer owns the seat".to_string()))
            }
            Some(_) => {}
        }

        let mut purchase = tables.purchases[&listing.purchase_id].clone();
        purchase.user_id = buyer_id;
        tables.purchases.insert(purchase.id, purchase.clone());

        let mut sold = listing;
        sold.status = ListingStatus::Sold;
        sold.buyer_id = Some(buyer_id);
        sold.sold_at = Some(now);
        tables.listings.insert(sold.id, sold.clone());

        if let Some(method) = payment_method {
            tables.payment_methods.push(method);
        }
        Ok((sold, purchase))
    }

    async fn remove_listing(&self, listing_id: Uuid, seller_id: Uuid) -> InventoryResult<MarketplaceListing> {
        let mut tables = self.tables.lock().await;
        let listing = tables
            .listings
            .get_mut(&listing_id)
            .ok_or_else(|| InventoryError::NotFound("listing".to_string()))?;
        if listing.seller_id != seller_id {
            return Err(InventoryError::Forbidden("only the seller can remove a listing".to_string()));
        }
        if !listing.is_active() {
            return Err(InventoryError::Conflict("listing is no longer active".to_string()));
        }
        listing.status = ListingStatus::Removed;
        Ok(listing.clone())
    }

    async fn listing(&self, listing_id: Uuid) -> InventoryResult<Option<MarketplaceListing>> {
        let tables = self.tables.lock().await;
        Ok(tables.listings.get(&listing_id).cloned())
    }

    async fn active_listings(&self, event_id: Option<Uuid>) -> InventoryResult<Vec<MarketplaceListing>> {
        let tables = self.tables.lock().await;
        let mut listings: Vec<MarketplaceListing> = tables
            .listings
            .values()
            .filter(|l| l.is_active() && event_id.map_or(true, |e| l.event_id == e))
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    async fn stats(&self, now: DateTime<Utc>) -> InventoryResult<InventoryStats> {
        let tables = self.tables.lock().await;
        let live = tables.reservations.values().filter(|r| r.is_live(now)).count();
        Ok(InventoryStats {
            live_reservations: live as i64,
            expired_reservations: (tables.reservations.len() - live) as i64,
            purchases: tables.purchases.len() as i64,
            active_listings: tables.listings.values().filter(|l| l.is_active()).count() as i64,
        })
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(&self, group: GroupPurchase) -> InventoryResult<GroupPurchase> {
        let mut tables = self.tables.lock().await;
        tables.members.insert(group.id, Vec::new());
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn group(&self, group_id: Uuid) -> InventoryResult<Option<GroupDetails>> {
        let tables = self.tables.lock().await;
        Ok(tables.group_details(group_id))
    }

    async fn groups_for_user(&self, user_id: Uuid) -> InventoryResult<Vec<GroupPurchase>> {
        let tables = self.tables.lock().await;
        let mut groups: Vec<GroupPurchase> = tables
            .groups
            .values()
            .filter(|g| {
                g.leader_id == user_id
                    || tables
                        .members
                        .get(&g.id)
                        .is_some_and(|members| members.iter().any(|m| m.user_id == user_id))
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(groups)
    }

    async fn invite_members(
        &self,
        group_id: Uuid,
        leader_id: Uuid,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails> {
        let mut tables = self.tables.lock().await;
        let details = tables
            .group_details(group_id)
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        if details.group.leader_id != leader_id {
            return Err(InventoryError::Forbidden("only the group leader can invite".to_string()));
        }
        if details.group.status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group is no longer forming".to_string()));
        }

        let mut fresh: Vec<Uuid> = Vec::new();
        for user_id in user_ids {
            if *user_id != leader_id
                && !details.is_participant(*user_id)
                && !fresh.contains(user_id)
            {
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

        let members = tables.members.entry(group_id).or_default();
        for user_id in fresh {
            members.push(GroupMember {
                group_id,
                user_id,
                status: MemberStatus::Invited,
                invited_at: now,
                joined_at: None,
                prepaid_amount: 0.0,
                seat_assigned_id: None,
                final_price: None,
            });
        }
        if let Some(group) = tables.groups.get_mut(&group_id) {
            group.updated_at = now;
        }
        tables
            .group_details(group_id)
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))
    }

    async fn join_group(&self, group_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> InventoryResult<GroupMember> {
        let mut tables = self.tables.lock().await;
        let status = tables
            .groups
            .get(&group_id)
            .map(|g| g.status)
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        if status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group is no longer forming".to_string()));
        }
        let member = tables
            .members
            .get_mut(&group_id)
            .and_then(|members| members.iter_mut().find(|m| m.user_id == user_id))
            .ok_or_else(|| InventoryError::Forbidden("not invited to this group".to_string()))?;
        if member.status == MemberStatus::Invited {
            member.status = MemberStatus::Joined;
            member.joined_at = Some(now);
        }
        Ok(member.clone())
    }

    async fn record_prepayment(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        amount: f64,
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupDetails> {
        let mut tables = self.tables.lock().await;
        if !tables.groups.contains_key(&group_id) {
            return Err(InventoryError::NotFound("group".to_string()));
        }
        let member = tables
            .members
            .get_mut(&group_id)
            .and_then(|members| {
                members
                    .iter_mut()
                    .find(|m| m.user_id == user_id && m.status == MemberStatus::Joined)
            })
            .ok_or_else(|| InventoryError::Forbidden("only joined members can prepay".to_string()))?;
        member.prepaid_amount = round_cents(member.prepaid_amount + amount);

        if let Some(group) = tables.groups.get_mut(&group_id) {
            group.total_prepaid = round_cents(group.total_prepaid + amount);
            group.updated_at = now;
        }
        tables
            .group_details(group_id)
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))
    }

    async fn commit_group_purchase(&self, commit: GroupCommit) -> InventoryResult<(GroupDetails, Vec<Purchase>)> {
        let mut tables = self.tables.lock().await;
        let details = tables
            .group_details(commit.group_id)
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
            return Err(InventoryError::Conflict(
                "group membership changed; resubmit the purchase".to_string(),
            ));
        }

        let purchases = tables.apply_purchase(&commit.batch)?;

        let now = commit.batch.now;
        if let Some(members) = tables.members.get_mut(&commit.group_id) {
            for assignment in commit.assignments.iter().filter(|a| !a.is_leader) {
                if let Some(member) = members.iter_mut().find(|m| m.user_id == assignment.user_id) {
                    member.seat_assigned_id = Some(assignment.seat_id);
                    member.final_price = Some(assignment.price);
                }
            }
        }
        if let Some(group) = tables.groups.get_mut(&commit.group_id) {
            if let Some(leader) = commit.assignments.iter().find(|a| a.is_leader) {
                group.leader_seat_id = Some(leader.seat_id);
                group.leader_price = Some(leader.price);
            }
            group.status = GroupStatus::Completed;
            group.actual_total_cost = Some(commit.batch.total());
            group.completed_at = Some(now);
            group.updated_at = now;
        }

        let details = tables
            .group_details(commit.group_id)
            .ok_or_else(|| InventoryError::NotFound("group".to_string()))?;
        Ok((details, purchases))
    }
}

/// Catalog held in process memory; seeded by tests and local demos.
#[derive(Default)]
pub struct MemoryCatalog {
    venues: RwLock<HashMap<Uuid, Venue>>,
    events: RwLock<HashMap<Uuid, Event>>,
    seats: RwLock<HashMap<Uuid, Seat>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_venue(&self, venue: Venue) {
        self.venues.write().await.insert(venue.id, venue);
    }

    pub async fn insert_event(&self, event: Event) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn insert_seats(&self, seats: impl IntoIterator<Item = Seat>) {
        let mut table = self.seats.write().await;
        for seat in seats {
            table.insert(seat.id, seat);
        }
    }

    /// Reprices a seat in place. Existing purchases keep the price they captured.
    pub async fn set_seat_pricing(&self, seat_id: Uuid, base_price: f64, multiplier: f64) -> bool {
        match self.seats.write().await.get_mut(&seat_id) {
            Some(seat) => {
                seat.base_price = base_price;
                seat.multiplier = multiplier;
                true
            }
            None => false,
        }
    }

    pub async fn set_on_sale_date(&self, event_id: Uuid, on_sale_date: Option<DateTime<Utc>>) -> bool {
        match self.events.write().await.get_mut(&event_id) {
            Some(event) => {
                event.on_sale_date = on_sale_date;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_event(&self, event_id: Uuid) -> InventoryResult<Option<Event>> {
        Ok(self.events.read().await.get(&event_id).cloned())
    }

    async fn upcoming_events(&self, now: DateTime<Utc>) -> InventoryResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| e.date > now)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.date);
        Ok(events)
    }

    async fn get_venue(&self, venue_id: Uuid) -> InventoryResult<Option<Venue>> {
        Ok(self.venues.read().await.get(&venue_id).cloned())
    }

    async fn get_seat(&self, seat_id: Uuid) -> InventoryResult<Option<Seat>> {
        Ok(self.seats.read().await.get(&seat_id).cloned())
    }

    async fn list_seats_for_venue(&self, venue_id: Uuid) -> InventoryResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self
            .seats
            .read()
            .await
            .values()
            .filter(|s| s.venue_id == venue_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| {
            a.section
                .cmp(&b.section)
                .then_with(|| a.row.cmp(&b.row))
                .then(a.number.cmp(&b.number))
        });
        Ok(seats)
    }
}
