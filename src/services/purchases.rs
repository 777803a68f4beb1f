use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::{check_selection, load_event, load_venue_seats};
use crate::error::{InventoryError, InventoryResult};
use crate::models::{
    round_cents, Event, MarketplaceListing, PaymentInfo, Purchase, SavedPaymentMethod, Venue,
};
use crate::store::{CatalogStore, InventoryStore, PricedSeat, PurchaseBatch};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchases: Vec<Purchase>,
    pub total_price: f64,
}

impl PurchaseReceipt {
    fn new(purchases: Vec<Purchase>) -> Self {
        let total_price = round_cents(purchases.iter().map(|p| p.price).sum());
        Self { purchases, total_price }
    }
}

/// Event and seat details shown next to a purchase or listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatContext {
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub venue_name: Option<String>,
    pub section: String,
    pub row: String,
    pub seat_number: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseView {
    #[serde(flatten)]
    pub purchase: Purchase,
    #[serde(flatten)]
    pub context: Option<SeatContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    #[serde(flatten)]
    pub listing: MarketplaceListing,
    #[serde(flatten)]
    pub context: Option<SeatContext>,
}

/// Primary sales and marketplace resale.
#[derive(Clone)]
pub struct PurchaseEngine {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl PurchaseEngine {
    pub fn new(inventory: Arc<dyn InventoryStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { inventory, catalog }
    }

    pub(crate) fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    pub async fn purchase(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        payment: &PaymentInfo,
    ) -> InventoryResult<PurchaseReceipt> {
        self.purchase_at(user_id, event_id, seat_ids, payment, Utc::now()).await
    }

    pub async fn purchase_at(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        payment: &PaymentInfo,
        now: DateTime<Utc>,
    ) -> InventoryResult<PurchaseReceipt> {
        let batch = self.prepare_batch(user_id, event_id, seat_ids, payment, now).await?;
        let count = batch.seats.len();

        match self.inventory.commit_purchase(batch).await {
            Ok(purchases) => {
                let receipt = PurchaseReceipt::new(purchases);
                info!(
                    "user {} bought {} seat(s) for event {}, total {:.2}",
                    user_id, count, event_id, receipt.total_price
                );
                Ok(receipt)
            }
            Err(InventoryError::SeatUnavailable(seats)) => {
                warn!(
                    "purchase by user {} for event {} rejected: {} seat(s) unavailable",
                    user_id,
                    event_id,
                    seats.len()
                );
                Err(InventoryError::SeatUnavailable(seats))
            }
            Err(e) => Err(e),
        }
    }

    /// Validates payment, the on-sale gate and the seat selection, then prices
    /// each seat in request order. Nothing is written.
    pub(crate) async fn prepare_batch(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        payment: &PaymentInfo,
        now: DateTime<Utc>,
    ) -> InventoryResult<PurchaseBatch> {
        payment.validate()?;
        check_selection(seat_ids)?;

        let event = load_event(self.catalog.as_ref(), event_id).await?;
        if let Some(on_sale) = event.on_sale_date.filter(|_| !event.is_on_sale(now)) {
            return Err(InventoryError::NotOnSaleYet(on_sale));
        }

        let seats = load_venue_seats(self.catalog.as_ref(), &event, seat_ids).await?;
        let payment_method = payment
            .save_payment_info
            .then(|| SavedPaymentMethod::from_payment(user_id, payment, now));

        Ok(PurchaseBatch {
            user_id,
            event_id,
            seats: seats
                .iter()
                .map(|seat| PricedSeat {
                    seat_id: seat.id,
                    price: seat.price(),
                })
                .collect(),
            payment_method,
            now,
        })
    }

    /// The caller's purchases, newest first, with event and seat details.
    pub async fn history(&self, user_id: Uuid) -> InventoryResult<Vec<PurchaseView>> {
        let purchases = self.inventory.purchases_for_user(user_id).await?;
        let keys: Vec<(Uuid, Uuid)> = purchases.iter().map(|p| (p.event_id, p.seat_id)).collect();
        let contexts = self.seat_contexts(&keys).await?;
        Ok(purchases
            .into_iter()
            .zip(contexts)
            .map(|(purchase, context)| PurchaseView { purchase, context })
            .collect())
    }

    pub async fn payment_methods(&self, user_id: Uuid) -> InventoryResult<Vec<SavedPaymentMethod>> {
        self.inventory.payment_methods_for(user_id).await
    }

    pub async fn list_for_sale(
        &self,
        seller_id: Uuid,
        event_id: Uuid,
        seat_id: Uuid,
        list_price: f64,
    ) -> InventoryResult<MarketplaceListing> {
        if !list_price.is_finite() || list_price <= 0.0 {
            return Err(InventoryError::Validation("list price must be positive".to_string()));
        }
        load_event(self.catalog.as_ref(), event_id).await?;

        let listing = self
            .inventory
            .create_listing(seller_id, event_id, seat_id, round_cents(list_price), Utc::now())
            .await?;
        info!(
            "user {} listed seat {} for event {} at {:.2}",
            seller_id, seat_id, event_id, listing.list_price
        );
        Ok(listing)
    }

    /// Ownership moves to the buyer and the listing closes in one atomic step.
    pub async fn purchase_listing(
        &self,
        buyer_id: Uuid,
        listing_id: Uuid,
        payment: &PaymentInfo,
    ) -> InventoryResult<(MarketplaceListing, Purchase)> {
        payment.validate()?;
        let now = Utc::now();
        let payment_method = payment
            .save_payment_info
            .then(|| SavedPaymentMethod::from_payment(buyer_id, payment, now));

        match self
            .inventory
            .sell_listing(listing_id, buyer_id, payment_method, now)
            .await
        {
            Ok((listing, purchase)) => {
                info!(
                    "listing {} sold to user {}, seat {} transferred",
                    listing_id, buyer_id, purchase.seat_id
                );
                Ok((listing, purchase))
            }
            Err(e @ InventoryError::Conflict(_)) => {
                warn!("marketplace purchase of listing {} by user {} rejected: {}", listing_id, buyer_id, e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn remove_listing(&self, seller_id: Uuid, listing_id: Uuid) -> InventoryResult<MarketplaceListing> {
        let listing = self.inventory.remove_listing(listing_id, seller_id).await?;
        info!("user {} removed listing {}", seller_id, listing_id);
        Ok(listing)
    }

    pub async fn active_listings(&self, event_id: Option<Uuid>) -> InventoryResult<Vec<ListingView>> {
        let listings = self.inventory.active_listings(event_id).await?;
        let keys: Vec<(Uuid, Uuid)> = listings.iter().map(|l| (l.event_id, l.seat_id)).collect();
        let contexts = self.seat_contexts(&keys).await?;
        Ok(listings
            .into_iter()
            .zip(contexts)
            .map(|(listing, context)| ListingView { listing, context })
            .collect())
    }

    // Catalog rows missing for a key leave its context empty.
    async fn seat_contexts(&self, keys: &[(Uuid, Uuid)]) -> InventoryResult<Vec<Option<SeatContext>>> {
        let mut events: HashMap<Uuid, Option<Event>> = HashMap::new();
        let mut venues: HashMap<Uuid, Option<Venue>> = HashMap::new();
        for (event_id, _) in keys {
            if events.contains_key(event_id) {
                continue;
            }
            let event = self.catalog.get_event(*event_id).await?;
            if let Some(event) = &event {
                if !venues.contains_key(&event.venue_id) {
                    let venue = self.catalog.get_venue(event.venue_id).await?;
                    venues.insert(event.venue_id, venue);
                }
            }
            events.insert(*event_id, event);
        }

        let seat_ids: Vec<Uuid> = keys.iter().map(|(_, seat_id)| *seat_id).collect();
        let seats = self.catalog.get_seats(&seat_ids).await?;
        Ok(keys
            .iter()
            .zip(seats)
            .map(|((event_id, _), seat)| {
                let event = events.get(event_id)?.as_ref()?;
                let seat = seat?;
                Some(SeatContext {
                    event_title: event.title.clone(),
                    event_date: event.date,
                    venue_name: venues
                        .get(&event.venue_id)
                        .and_then(|venue| venue.as_ref())
                        .map(|venue| venue.name.clone()),
                    section: seat.section,
                    row: seat.row,
                    seat_number: seat.number,
                })
            })
            .collect())
    }
}
