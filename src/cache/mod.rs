//! Read-through Redis cache in front of the catalog.
//!
//! Only reference data lives here: seat layouts (immutable once a venue is
//! set up, long TTL) and events (short TTL so on-sale dates stay fresh).
//! Purchases, holds and listings are never cached. Any Redis failure falls
//! back to the wrapped catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::error::InventoryResult;
use crate::models::{Event, Seat, Venue};
use crate::redis_client::RedisClient;
use crate::store::CatalogStore;

pub mod events;
pub mod seats;

#[derive(Clone)]
pub struct CachedCatalog {
    inner: Arc<dyn CatalogStore>,
    redis: RedisClient,
    seats_ttl: u64,
    event_ttl: u64,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn CatalogStore>, redis: RedisClient, config: &RedisConfig) -> Self {
        Self {
            inner,
            redis,
            seats_ttl: config.seats_ttl_seconds,
            event_ttl: config.event_ttl_seconds,
        }
    }

    /// Loads upcoming events and their venue layouts into Redis. Returns how
    /// many venue layouts were loaded.
    pub async fn warmup(&self) -> usize {
        info!("Starting catalog cache warmup...");
        let events = match self.inner.upcoming_events(Utc::now()).await {
            Ok(events) => events,
            Err(e) => {
                warn!("cache warmup skipped, catalog unavailable: {}", e);
                return 0;
            }
        };

        let mut venues = HashSet::new();
        let mut loaded = 0;
        for event in &events {
            self.store_event(event).await;
            if venues.insert(event.venue_id) {
                match self.venue_seats(event.venue_id).await {
                    Ok(_) => loaded += 1,
                    Err(e) => warn!("cache warmup could not load venue {}: {}", event.venue_id, e),
                }
            }
        }
        info!("Catalog cache warm: {} event(s), {} of {} venue(s)", events.len(), loaded, venues.len());
        loaded
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.redis.conn.clone();
        let raw = match conn.get::<_, Option<String>>(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cache read {} failed: {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw?) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("cache entry {} is corrupt, ignoring: {}", key, e);
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T, ttl: u64) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!("cache entry {} not serializable: {}", key, e);
                return;
            }
        };
        let mut conn = self.redis.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, data, ttl).await {
            warn!("cache write {} failed: {}", key, e);
        } else {
            debug!("cached {} for {}s", key, ttl);
        }
    }
}

#[async_trait]
impl CatalogStore for CachedCatalog {
    async fn get_event(&self, event_id: Uuid) -> InventoryResult<Option<Event>> {
        self.event(event_id).await
    }

    async fn upcoming_events(&self, now: DateTime<Utc>) -> InventoryResult<Vec<Event>> {
        self.inner.upcoming_events(now).await
    }

    async fn get_venue(&self, venue_id: Uuid) -> InventoryResult<Option<Venue>> {
        self.inner.get_venue(venue_id).await
    }

    async fn get_seat(&self, seat_id: Uuid) -> InventoryResult<Option<Seat>> {
        self.inner.get_seat(seat_id).await
    }

    async fn list_seats_for_venue(&self, venue_id: Uuid) -> InventoryResult<Vec<Seat>> {
        self.venue_seats(venue_id).await
    }

    async fn get_seats(&self, seat_ids: &[Uuid]) -> InventoryResult<Vec<Option<Seat>>> {
        self.inner.get_seats(seat_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryError;
    use crate::store::MemoryCatalog;
    use chrono::Duration;

    // Venue layouts are unavailable; events still come through.
    struct NoLayouts(MemoryCatalog);

    #[async_trait]
    impl CatalogStore for NoLayouts {
        async fn get_event(&self, event_id: Uuid) -> InventoryResult<Option<Event>> {
            self.0.get_event(event_id).await
        }

        async fn upcoming_events(&self, now: DateTime<Utc>) -> InventoryResult<Vec<Event>> {
            self.0.upcoming_events(now).await
        }

        async fn get_venue(&self, venue_id: Uuid) -> InventoryResult<Option<Venue>> {
            self.0.get_venue(venue_id).await
        }

        async fn get_seat(&self, seat_id: Uuid) -> InventoryResult<Option<Seat>> {
            self.0.get_seat(seat_id).await
        }

        async fn list_seats_for_venue(&self, _venue_id: Uuid) -> InventoryResult<Vec<Seat>> {
            Err(InventoryError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn warmup_survives_a_failing_layout_lookup() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };
        let redis = RedisClient::new(&url).await.unwrap();
        let inner = MemoryCatalog::new();
        let event = Event {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            title: "Harbour Lights".to_string(),
            description: None,
            date: Utc::now() + Duration::days(3),
            on_sale_date: None,
        };
        inner.insert_event(event.clone()).await;

        let config = RedisConfig {
            url: Some(url),
            seats_ttl_seconds: 60,
            event_ttl_seconds: 60,
        };
        let cached = CachedCatalog::new(Arc::new(NoLayouts(inner)), redis, &config);

        assert_eq!(cached.warmup().await, 0);
        let stored = cached.read_json::<Event>(&cached.event_key(event.id)).await;
        assert_eq!(stored.map(|e| e.title), Some("Harbour Lights".to_string()));
    }
}
