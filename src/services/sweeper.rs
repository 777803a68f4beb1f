use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::InventoryResult;
use crate::store::InventoryStore;

/// Periodic removal of expired holds. Storage hygiene only: availability
/// checks already ignore expired rows.
pub struct ReservationSweeper {
    inventory: Arc<dyn InventoryStore>,
    interval: Duration,
}

impl ReservationSweeper {
    pub fn new(inventory: Arc<dyn InventoryStore>, interval: Duration) -> Self {
        Self { inventory, interval }
    }

    pub async fn run_once(&self) -> InventoryResult<u64> {
        self.inventory.sweep_expired_reservations(Utc::now()).await
    }

    pub fn spawn(self) -> JoinHandle<()> {
        info!("reservation sweeper running every {:?}", self.interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(0) => debug!("sweeper: nothing expired"),
                    Ok(n) => info!("sweeper removed {} expired reservation(s)", n),
                    Err(e) => error!("sweeper failed: {}", e),
                }
            }
        })
    }
}
