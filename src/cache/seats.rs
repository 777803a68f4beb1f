use uuid::Uuid;

use crate::cache::CachedCatalog;
use crate::error::InventoryResult;
use crate::models::Seat;

impl CachedCatalog {
    // Layouts never change after venue setup, so the TTL is long.
    pub(crate) async fn venue_seats(&self, venue_id: Uuid) -> InventoryResult<Vec<Seat>> {
        let key = self.redis.key(&["venue", &venue_id.to_string(), "seats"]);
        if let Some(seats) = self.read_json::<Vec<Seat>>(&key).await {
            return Ok(seats);
        }

        let seats = self.inner.list_seats_for_venue(venue_id).await?;
        if !seats.is_empty() {
            self.write_json(&key, &seats, self.seats_ttl).await;
        }
        Ok(seats)
    }
}
