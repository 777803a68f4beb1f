#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use ticket_inventory::config::Config;
use ticket_inventory::models::{Event, PaymentInfo, Seat, Venue};
use ticket_inventory::services::JwtIdentity;
use ticket_inventory::store::MemoryCatalog;
use ticket_inventory::AppState;

pub const JWT_SECRET: &str = "integration-secret";

pub struct Fixture {
    pub state: Arc<AppState>,
    pub catalog: Arc<MemoryCatalog>,
    pub venue_id: Uuid,
    /// On sale now.
    pub event_id: Uuid,
    /// Goes on sale tomorrow.
    pub presale_event_id: Uuid,
    /// Row A then row B, eight seats each, in layout order.
    pub seats: Vec<Seat>,
}

impl Fixture {
    pub async fn new() -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let venue_id = Uuid::new_v4();
        let now = Utc::now();
        catalog
            .insert_venue(Venue {
                id: venue_id,
                name: "Riverside Hall".to_string(),
                address: "1 Quay Street".to_string(),
                capacity: 16,
            })
            .await;

        let event_id = Uuid::new_v4();
        catalog
            .insert_event(Event {
                id: event_id,
                venue_id,
                title: "Symphony No. 9".to_string(),
                description: Some("Opening night".to_string()),
                date: now + Duration::days(30),
                on_sale_date: Some(now - Duration::days(1)),
            })
            .await;

        let presale_event_id = Uuid::new_v4();
        catalog
            .insert_event(Event {
                id: presale_event_id,
                venue_id,
                title: "Festival Preview".to_string(),
                description: None,
                date: now + Duration::days(60),
                on_sale_date: Some(now + Duration::days(1)),
            })
            .await;

        let mut seats = Vec::new();
        for (y, row) in ["A", "B"].iter().enumerate() {
            for number in 1..=8 {
                seats.push(Seat {
                    id: Uuid::new_v4(),
                    venue_id,
                    section: "Orchestra".to_string(),
                    row: row.to_string(),
                    number,
                    base_price: 50.0,
                    multiplier: if *row == "A" { 1.5 } else { 1.0 },
                    x: number * 10,
                    y: y as i32 * 10,
                });
            }
        }
        catalog.insert_seats(seats.clone()).await;

        let state = AppState::in_memory(Config::for_memory(JWT_SECRET), catalog.clone());
        Fixture {
            state,
            catalog,
            venue_id,
            event_id,
            presale_event_id,
            seats,
        }
    }

    pub fn seat_ids(&self, indexes: &[usize]) -> Vec<Uuid> {
        indexes.iter().map(|i| self.seats[*i].id).collect()
    }
}

pub fn token(user_id: Uuid) -> String {
    JwtIdentity::new(JWT_SECRET, 1)
        .issue(user_id, &format!("{user_id}@example.com"))
        .expect("token")
}

pub fn payment() -> PaymentInfo {
    PaymentInfo {
        cardholder_name: "Grace Hopper".to_string(),
        card_number: "4111 1111 1111 4242".to_string(),
        expiration_month: 11,
        expiration_year: 2031,
        cvv: "321".to_string(),
        billing_address: "12 Navy Yard".to_string(),
        billing_city: "Arlington".to_string(),
        billing_state: "VA".to_string(),
        billing_zip: "22202".to_string(),
        save_payment_info: false,
    }
}
