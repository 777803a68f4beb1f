pub mod availability;
pub mod groups;
pub mod identity;
pub mod purchases;
pub mod reservations;
pub mod sweeper;

pub use availability::{AvailabilityResolver, SeatMap, SeatView};
pub use groups::{assign_seats, GroupPurchaseEngine, GroupPurchaseReceipt, NewGroup};
pub use identity::{Claims, Identity, IdentityProvider, JwtIdentity};
pub use purchases::{ListingView, PurchaseEngine, PurchaseReceipt, PurchaseView, SeatContext};
pub use reservations::{ReservationManager, ReservationReceipt};
pub use sweeper::ReservationSweeper;

use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::models::{Event, Seat};
use crate::store::CatalogStore;

/// A seat selection must name at least one seat and no seat twice.
pub(crate) fn check_selection(seat_ids: &[Uuid]) -> InventoryResult<()> {
    if seat_ids.is_empty() {
        return Err(InventoryError::Validation("select at least one seat".to_string()));
    }
    let mut seen = HashSet::with_capacity(seat_ids.len());
    if let Some(dup) = seat_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(InventoryError::Validation(format!("seat {dup} selected more than once")));
    }
    Ok(())
}

pub(crate) async fn load_event(catalog: &dyn CatalogStore, event_id: Uuid) -> InventoryResult<Event> {
    catalog
        .get_event(event_id)
        .await?
        .ok_or_else(|| InventoryError::NotFound(format!("event {event_id}")))
}

/// Loads the selected seats in request order; every one must belong to the event's venue.
pub(crate) async fn load_venue_seats(
    catalog: &dyn CatalogStore,
    event: &Event,
    seat_ids: &[Uuid],
) -> InventoryResult<Vec<Seat>> {
    let found = catalog.get_seats(seat_ids).await?;
    let mut seats = Vec::with_capacity(seat_ids.len());
    let mut missing = Vec::new();
    for (seat_id, seat) in seat_ids.iter().zip(found) {
        match seat {
            Some(seat) if seat.venue_id == event.venue_id => seats.push(seat),
            _ => missing.push(seat_id.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(InventoryError::NotFound(format!(
            "seat(s) {} in this venue",
            missing.join(", ")
        )));
    }
    Ok(seats)
}
