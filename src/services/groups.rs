//! Leader-driven group purchases.
//!
//! The leader buys every seat in one atomic purchase under their own identity;
//! seats are then handed out leader first, joined members in join order. The
//! store commits purchases, assignments and the status change together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::load_event;
use super::purchases::PurchaseEngine;
use crate::error::{InventoryError, InventoryResult};
use crate::models::{round_cents, GroupDetails, GroupMember, GroupPurchase, GroupStatus, PaymentInfo, Purchase};
use crate::store::{GroupCommit, GroupStore, PricedSeat, SeatAssignment};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub event_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "group name must be 1-100 characters"))]
    pub group_name: String,
    /// Includes the leader.
    #[validate(range(min = 2, max = 50, message = "max members must be 2-50"))]
    pub max_members: i32,
    #[validate(range(min = 1, max = 50, message = "target seats must be 1-50"))]
    pub target_seats: i32,
    #[validate(range(min = 0.0, message = "estimated price cannot be negative"))]
    pub estimated_price_per_seat: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPurchaseReceipt {
    pub group: GroupDetails,
    pub purchases: Vec<Purchase>,
    pub total_price: f64,
}

/// Pairs seats with participants: the leader takes the first seat, then each
/// joined member in order. Seats and participants must be the same length.
pub fn assign_seats(leader_id: Uuid, members: &[Uuid], seats: &[PricedSeat]) -> Vec<SeatAssignment> {
    std::iter::once((leader_id, true))
        .chain(members.iter().map(|m| (*m, false)))
        .zip(seats)
        .map(|((user_id, is_leader), seat)| SeatAssignment {
            user_id,
            seat_id: seat.seat_id,
            price: seat.price,
            is_leader,
        })
        .collect()
}

#[derive(Clone)]
pub struct GroupPurchaseEngine {
    groups: Arc<dyn GroupStore>,
    purchases: PurchaseEngine,
}

impl GroupPurchaseEngine {
    pub fn new(groups: Arc<dyn GroupStore>, purchases: PurchaseEngine) -> Self {
        Self { groups, purchases }
    }

    pub async fn create(&self, leader_id: Uuid, new_group: NewGroup) -> InventoryResult<GroupPurchase> {
        new_group.validate()?;
        load_event(self.purchases.catalog(), new_group.event_id).await?;

        let now = Utc::now();
        let group = self
            .groups
            .create_group(GroupPurchase {
                id: Uuid::new_v4(),
                event_id: new_group.event_id,
                leader_id,
                group_name: new_group.group_name.trim().to_string(),
                max_members: new_group.max_members,
                target_seats: new_group.target_seats,
                status: GroupStatus::Forming,
                total_prepaid: 0.0,
                estimated_price_per_seat: new_group.estimated_price_per_seat.map(round_cents),
                actual_total_cost: None,
                leader_seat_id: None,
                leader_price: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
            })
            .await?;
        info!("user {} created group {} for event {}", leader_id, group.id, group.event_id);
        Ok(group)
    }

    /// Visible to the leader and to invited or joined members.
    pub async fn details(&self, group_id: Uuid, user_id: Uuid) -> InventoryResult<GroupDetails> {
        let details = self.load(group_id).await?;
        if !details.is_participant(user_id) {
            return Err(InventoryError::Forbidden("not a member of this group".to_string()));
        }
        Ok(details)
    }

    pub async fn groups_for(&self, user_id: Uuid) -> InventoryResult<Vec<GroupPurchase>> {
        self.groups.groups_for_user(user_id).await
    }

    pub async fn invite(&self, group_id: Uuid, leader_id: Uuid, user_ids: &[Uuid]) -> InventoryResult<GroupDetails> {
        if user_ids.is_empty() {
            return Err(InventoryError::Validation("invite at least one user".to_string()));
        }
        let details = self
            .groups
            .invite_members(group_id, leader_id, user_ids, Utc::now())
            .await?;
        info!(
            "group {} now has {} member row(s) after invite by {}",
            group_id,
            details.members.len(),
            leader_id
        );
        Ok(details)
    }

    pub async fn join(&self, group_id: Uuid, user_id: Uuid) -> InventoryResult<GroupMember> {
        let member = self.groups.join_group(group_id, user_id, Utc::now()).await?;
        info!("user {} joined group {}", user_id, group_id);
        Ok(member)
    }

    /// Advisory accounting only; nothing is charged and nothing depends on it.
    pub async fn prepay(&self, group_id: Uuid, user_id: Uuid, amount: f64) -> InventoryResult<GroupDetails> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(InventoryError::Validation("prepayment must be positive".to_string()));
        }
        let details = self
            .groups
            .record_prepayment(group_id, user_id, round_cents(amount), Utc::now())
            .await?;
        info!(
            "user {} prepaid {:.2} into group {} (total {:.2})",
            user_id, amount, group_id, details.group.total_prepaid
        );
        Ok(details)
    }

    pub async fn purchase_for_group(
        &self,
        group_id: Uuid,
        leader_id: Uuid,
        seat_ids: &[Uuid],
        payment: &PaymentInfo,
    ) -> InventoryResult<GroupPurchaseReceipt> {
        self.purchase_for_group_at(group_id, leader_id, seat_ids, payment, Utc::now())
            .await
    }

    pub async fn purchase_for_group_at(
        &self,
        group_id: Uuid,
        leader_id: Uuid,
        seat_ids: &[Uuid],
        payment: &PaymentInfo,
        now: DateTime<Utc>,
    ) -> InventoryResult<GroupPurchaseReceipt> {
        let details = self.load(group_id).await?;
        if details.group.leader_id != leader_id {
            return Err(InventoryError::Forbidden(
                "only the group leader can purchase for the group".to_string(),
            ));
        }
        if details.group.status != GroupStatus::Forming {
            return Err(InventoryError::Conflict("group purchase already completed".to_string()));
        }

        let members: Vec<Uuid> = details.joined_members().iter().map(|m| m.user_id).collect();
        let expected = members.len() + 1;
        if seat_ids.len() != expected {
            return Err(InventoryError::SeatCountMismatch {
                expected,
                actual: seat_ids.len(),
            });
        }

        let batch = self
            .purchases
            .prepare_batch(leader_id, details.group.event_id, seat_ids, payment, now)
            .await?;
        let assignments = assign_seats(leader_id, &members, &batch.seats);

        let commit = GroupCommit {
            group_id,
            expected_joined: members.len(),
            batch,
            assignments,
        };
        match self.groups.commit_group_purchase(commit).await {
            Ok((group, purchases)) => {
                let total_price = group.group.actual_total_cost.unwrap_or_default();
                info!(
                    "group {} completed: {} seat(s) for event {}, total {:.2}",
                    group_id,
                    purchases.len(),
                    group.group.event_id,
                    total_price
                );
                Ok(GroupPurchaseReceipt {
                    group,
                    purchases,
                    total_price,
                })
            }
            Err(e) => {
                warn!("group {} purchase aborted: {}", group_id, e);
                Err(e)
            }
        }
    }

    async fn load(&self, group_id: Uuid) -> InventoryResult<GroupDetails> {
        self.groups
            .group(group_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("group {group_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seats(n: usize) -> Vec<PricedSeat> {
        (0..n)
            .map(|i| PricedSeat {
                seat_id: Uuid::new_v4(),
                price: 10.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn leader_takes_the_first_seat() {
        let leader = Uuid::new_v4();
        let members = [Uuid::new_v4(), Uuid::new_v4()];
        let seats = seats(3);

        let assigned = assign_seats(leader, &members, &seats);
        assert_eq!(assigned.len(), 3);
        assert!(assigned[0].is_leader);
        assert_eq!(assigned[0].user_id, leader);
        assert_eq!(assigned[0].seat_id, seats[0].seat_id);
        assert_eq!(assigned[1].user_id, members[0]);
        assert_eq!(assigned[2].user_id, members[1]);
        assert_eq!(assigned[2].price, seats[2].price);
    }

    proptest! {
        #[test]
        fn assignment_is_a_bijection(member_count in 0usize..12) {
            let leader = Uuid::new_v4();
            let members: Vec<Uuid> = (0..member_count).map(|_| Uuid::new_v4()).collect();
            let seats = seats(member_count + 1);

            let assigned = assign_seats(leader, &members, &seats);
            prop_assert_eq!(assigned.len(), member_count + 1);
            prop_assert_eq!(assigned.iter().filter(|a| a.is_leader).count(), 1);
            for (i, a) in assigned.iter().enumerate() {
                prop_assert_eq!(a.seat_id, seats[i].seat_id);
            }
            let again = assign_seats(leader, &members, &seats);
            prop_assert_eq!(assigned, again);
        }
    }
}
