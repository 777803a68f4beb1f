use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable reference record created at venue setup.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub section: String,
    pub row: String,
    pub number: i32,
    pub base_price: f64,
    pub multiplier: f64,
    pub x: i32,
    pub y: i32,
}

impl Seat {
    /// Price captured on a purchase: base price times multiplier, in cents precision.
    pub fn price(&self) -> f64 {
        round_cents(self.base_price * self.multiplier)
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(base_price: f64, multiplier: f64) -> Seat {
        Seat {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            section: "VIP Front".to_string(),
            row: "A".to_string(),
            number: 1,
            base_price,
            multiplier,
            x: 0,
            y: 0,
        }
    }

    #[test]
    fn price_is_base_times_multiplier() {
        assert_eq!(seat(250.0, 2.0).price(), 500.0);
        assert_eq!(seat(150.0, 1.5).price(), 225.0);
    }

    #[test]
    fn price_rounds_to_cents() {
        assert_eq!(seat(10.0, 1.333).price(), 13.33);
        assert_eq!(seat(0.1, 3.0).price(), 0.3);
    }
}
