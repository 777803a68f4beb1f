use uuid::Uuid;

use crate::cache::CachedCatalog;
use crate::error::InventoryResult;
use crate::models::Event;

impl CachedCatalog {
    pub(crate) async fn event(&self, event_id: Uuid) -> InventoryResult<Option<Event>> {
        let key = self.event_key(event_id);
        if let Some(event) = self.read_json::<Event>(&key).await {
            return Ok(Some(event));
        }

        let event = self.inner.get_event(event_id).await?;
        if let Some(event) = &event {
            self.write_json(&key, event, self.event_ttl).await;
        }
        Ok(event)
    }

    pub(crate) async fn store_event(&self, event: &Event) {
        let key = self.event_key(event.id);
        self.write_json(&key, event, self.event_ttl).await;
    }

    pub(crate) fn event_key(&self, event_id: Uuid) -> String {
        self.redis.key(&["event", &event_id.to_string()])
    }
}
