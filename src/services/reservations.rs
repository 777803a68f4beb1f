use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{check_selection, load_event, load_venue_seats};
use crate::error::{InventoryError, InventoryResult};
use crate::models::Reservation;
use crate::store::{CatalogStore, InventoryStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReceipt {
    pub event_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
}

/// Time-boxed holds. One selection per (user, event): a new selection replaces
/// the previous one instead of adding to it.
#[derive(Clone)]
pub struct ReservationManager {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn CatalogStore>,
    ttl: Duration,
}

impl ReservationManager {
    pub fn new(inventory: Arc<dyn InventoryStore>, catalog: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self { inventory, catalog, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn reserve(&self, user_id: Uuid, event_id: Uuid, seat_ids: &[Uuid]) -> InventoryResult<ReservationReceipt> {
        self.reserve_at(user_id, event_id, seat_ids, Utc::now()).await
    }

    /// On rejection the user is left holding nothing for this event.
    pub async fn reserve_at(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> InventoryResult<ReservationReceipt> {
        check_selection(seat_ids)?;
        let event = load_event(self.catalog.as_ref(), event_id).await?;
        load_venue_seats(self.catalog.as_ref(), &event, seat_ids).await?;

        let expires_at = now + self.ttl;
        match self
            .inventory
            .replace_selection(user_id, event_id, seat_ids, expires_at, now)
            .await
        {
            Ok(held) => {
                info!(
                    "user {} holds {} seat(s) for event {} until {}",
                    user_id,
                    held.len(),
                    event_id,
                    expires_at
                );
                Ok(ReservationReceipt {
                    event_id,
                    seat_ids: held.into_iter().map(|r| r.seat_id).collect(),
                    expires_at,
                })
            }
            Err(InventoryError::SeatUnavailable(seats)) => {
                warn!(
                    "reservation by user {} for event {} rejected: {} of {} seat(s) unavailable",
                    user_id,
                    event_id,
                    seats.len(),
                    seat_ids.len()
                );
                Err(InventoryError::SeatUnavailable(seats))
            }
            Err(e) => Err(e),
        }
    }

    /// Idempotent; returns how many holds were dropped.
    pub async fn release(&self, user_id: Uuid, event_id: Uuid) -> InventoryResult<u64> {
        let released = self.inventory.delete_reservations_for(user_id, event_id).await?;
        if released > 0 {
            info!("user {} released {} hold(s) for event {}", user_id, released, event_id);
        }
        Ok(released)
    }

    pub async fn held(&self, user_id: Uuid, event_id: Uuid) -> InventoryResult<Vec<Reservation>> {
        self.inventory.reservations_for(user_id, event_id, Utc::now()).await
    }
}
