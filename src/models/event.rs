use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub on_sale_date: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        self.on_sale_date.map_or(true, |on_sale| on_sale <= now)
    }
}
