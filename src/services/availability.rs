use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::load_event;
use crate::error::InventoryResult;
use crate::models::Seat;
use crate::store::{CatalogStore, InventoryStore, SeatStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    #[serde(flatten)]
    pub seat: Seat,
    pub price: f64,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    pub event_id: Uuid,
    pub seats: Vec<SeatView>,
}

/// Single source of seat status for every caller: seat maps and pre-checks alike.
#[derive(Clone)]
pub struct AvailabilityResolver {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl AvailabilityResolver {
    pub fn new(inventory: Arc<dyn InventoryStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { inventory, catalog }
    }

    pub async fn seat_map(&self, event_id: Uuid, requester: Option<Uuid>) -> InventoryResult<SeatMap> {
        self.seat_map_at(event_id, requester, Utc::now()).await
    }

    pub async fn seat_map_at(
        &self,
        event_id: Uuid,
        requester: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> InventoryResult<SeatMap> {
        let event = load_event(self.catalog.as_ref(), event_id).await?;
        let layout = self.catalog.list_seats_for_venue(event.venue_id).await?;

        let swept = self.inventory.sweep_expired_reservations(now).await?;
        if swept > 0 {
            debug!("swept {} expired reservation(s) before seat map", swept);
        }

        let seat_ids: Vec<Uuid> = layout.iter().map(|s| s.id).collect();
        let statuses = self
            .inventory
            .seat_status(event_id, &seat_ids, requester, now)
            .await?;

        let seats = layout
            .into_iter()
            .map(|seat| {
                let status = statuses.get(&seat.id).copied().unwrap_or(SeatStatus::Free);
                SeatView {
                    price: seat.price(),
                    seat,
                    status,
                }
            })
            .collect();
        Ok(SeatMap { event_id, seats })
    }
}
