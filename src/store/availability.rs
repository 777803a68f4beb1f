//! Seat status resolution shared by every store backend.
//!
//! Backends load a [`SeatSnapshot`] per seat (inside their transaction when the
//! result gates a write) and hand it to [`resolve`], so the precedence rules live
//! in exactly one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Free,
    ReservedBySelf,
    ReservedByOther,
    Purchased,
    MarketplaceActive,
}

impl SeatStatus {
    /// Whether the seat rules out a hold or a primary purchase by the requester.
    pub fn blocks_requester(&self) -> bool {
        matches!(
            self,
            SeatStatus::ReservedByOther | SeatStatus::Purchased | SeatStatus::MarketplaceActive
        )
    }
}

/// Raw per-seat facts as stored, before expiry and identity are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeatSnapshot {
    pub owner_id: Option<Uuid>,
    pub listed: bool,
    pub holder_id: Option<Uuid>,
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl SeatSnapshot {
    fn live_holder(&self, now: DateTime<Utc>) -> Option<Uuid> {
        match (self.holder_id, self.hold_expires_at) {
            (Some(holder), Some(expires_at)) if expires_at > now => Some(holder),
            _ => None,
        }
    }
}

/// Purchase wins; a purchase with an active listing reports as marketplace;
/// otherwise a live hold is split by identity; everything else is free.
pub fn resolve(snapshot: &SeatSnapshot, requester: Option<Uuid>, now: DateTime<Utc>) -> SeatStatus {
    if snapshot.owner_id.is_some() {
        return if snapshot.listed {
            SeatStatus::MarketplaceActive
        } else {
            SeatStatus::Purchased
        };
    }
    match snapshot.live_holder(now) {
        Some(holder) if Some(holder) == requester => SeatStatus::ReservedBySelf,
        Some(_) => SeatStatus::ReservedByOther,
        None => SeatStatus::Free,
    }
}

/// Seats that block `requester`, in the order given.
pub fn blocked_seats(snapshots: &[(Uuid, SeatSnapshot)], requester: Uuid, now: DateTime<Utc>) -> Vec<Uuid> {
    snapshots
        .iter()
        .filter(|(_, snapshot)| resolve(snapshot, Some(requester), now).blocks_requester())
        .map(|(seat_id, _)| *seat_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn held_by(holder: Uuid, expires_at: DateTime<Utc>) -> SeatSnapshot {
        SeatSnapshot {
            holder_id: Some(holder),
            hold_expires_at: Some(expires_at),
            ..SeatSnapshot::default()
        }
    }

    #[test]
    fn empty_snapshot_is_free() {
        assert_eq!(resolve(&SeatSnapshot::default(), None, Utc::now()), SeatStatus::Free);
    }

    #[test]
    fn hold_is_split_by_identity() {
        let now = Utc::now();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let snapshot = held_by(alice, now + Duration::minutes(5));

        assert_eq!(resolve(&snapshot, Some(alice), now), SeatStatus::ReservedBySelf);
        assert_eq!(resolve(&snapshot, Some(bob), now), SeatStatus::ReservedByOther);
        assert_eq!(resolve(&snapshot, None, now), SeatStatus::ReservedByOther);
    }

    #[test]
    fn expired_hold_reads_as_free() {
        let now = Utc::now();
        let snapshot = held_by(Uuid::new_v4(), now - Duration::seconds(1));
        assert_eq!(resolve(&snapshot, Some(Uuid::new_v4()), now), SeatStatus::Free);
    }

    #[test]
    fn listing_reports_marketplace() {
        let snapshot = SeatSnapshot {
            owner_id: Some(Uuid::new_v4()),
            listed: true,
            ..SeatSnapshot::default()
        };
        assert_eq!(resolve(&snapshot, None, Utc::now()), SeatStatus::MarketplaceActive);
    }

    #[test]
    fn blocked_seats_keeps_request_order() {
        let now = Utc::now();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let seats: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let snapshots = vec![
            (seats[0], SeatSnapshot { owner_id: Some(other), ..SeatSnapshot::default() }),
            (seats[1], held_by(me, now + Duration::minutes(1))),
            (seats[2], held_by(other, now + Duration::minutes(1))),
            (seats[3], SeatSnapshot::default()),
        ];

        let blocked = blocked_seats(&snapshots, me, now);
        assert_eq!(blocked, vec![seats[0], seats[2]]);
    }

    proptest! {
        #[test]
        fn purchase_always_wins(listed in any::<bool>(), hold_offset in -600i64..600, self_hold in any::<bool>()) {
            let now = Utc::now();
            let requester = Uuid::new_v4();
            let holder = if self_hold { requester } else { Uuid::new_v4() };
            let snapshot = SeatSnapshot {
                owner_id: Some(Uuid::new_v4()),
                listed,
                holder_id: Some(holder),
                hold_expires_at: Some(now + Duration::seconds(hold_offset)),
            };
            let status = resolve(&snapshot, Some(requester), now);
            prop_assert!(matches!(status, SeatStatus::Purchased | SeatStatus::MarketplaceActive));
            prop_assert!(status.blocks_requester());
        }

        #[test]
        fn own_hold_never_blocks(hold_offset in -600i64..600) {
            let now = Utc::now();
            let me = Uuid::new_v4();
            let snapshot = held_by(me, now + Duration::seconds(hold_offset));
            prop_assert!(!resolve(&snapshot, Some(me), now).blocks_requester());
        }
    }
}
