mod common;

use uuid::Uuid;

use common::{payment, Fixture};
use ticket_inventory::error::InventoryError;
use ticket_inventory::models::{GroupStatus, MemberStatus};
use ticket_inventory::services::NewGroup;

struct Group {
    id: Uuid,
    leader: Uuid,
    members: Vec<Uuid>,
}

/// A forming group whose members have all joined.
async fn forming_group(fx: &Fixture, joined: usize, max_members: i32) -> Group {
    let leader = Uuid::new_v4();
    let group = fx
        .state
        .groups
        .create(
            leader,
            NewGroup {
                event_id: fx.event_id,
                group_name: "Row crew".to_string(),
                max_members,
                target_seats: joined as i32 + 1,
                estimated_price_per_seat: Some(60.0),
            },
        )
        .await
        .unwrap();

    let members: Vec<Uuid> = (0..joined).map(|_| Uuid::new_v4()).collect();
    if !members.is_empty() {
        fx.state.groups.invite(group.id, leader, &members).await.unwrap();
        for member in &members {
            fx.state.groups.join(group.id, *member).await.unwrap();
        }
    }
    Group {
        id: group.id,
        leader,
        members,
    }
}

#[tokio::test]
async fn purchase_needs_exactly_one_seat_per_participant() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 2, 6).await;

    let err = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &fx.seat_ids(&[0, 1]), &payment())
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::SeatCountMismatch { expected: 3, actual: 2 }));

    let receipt = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &fx.seat_ids(&[0, 1, 2]), &payment())
        .await
        .unwrap();
    assert_eq!(receipt.purchases.len(), 3);
    assert!(receipt.purchases.iter().all(|p| p.user_id == group.leader));
    assert_eq!(receipt.total_price, 225.0);
    assert_eq!(receipt.group.group.status, GroupStatus::Completed);
    assert_eq!(receipt.group.group.actual_total_cost, Some(225.0));
    assert!(receipt.group.group.completed_at.is_some());
}

#[tokio::test]
async fn seats_go_to_the_leader_first_then_members_in_join_order() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 3, 6).await;
    let seats = fx.seat_ids(&[8, 0, 9, 1]);

    let receipt = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &seats, &payment())
        .await
        .unwrap();

    let details = receipt.group;
    assert_eq!(details.group.leader_seat_id, Some(seats[0]));
    assert_eq!(details.group.leader_price, Some(50.0));
    let ordered = details.joined_members();
    assert_eq!(ordered.len(), 3);
    for (member, seat) in ordered.iter().zip(&seats[1..]) {
        assert_eq!(member.seat_assigned_id, Some(*seat));
        assert!(member.final_price.is_some());
        assert!(group.members.contains(&member.user_id));
    }
}

#[tokio::test]
async fn failed_seat_aborts_the_whole_group_purchase() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 1, 4).await;
    let taken = fx.seats[1].id;
    fx.state
        .purchases
        .purchase(Uuid::new_v4(), fx.event_id, &[taken], &payment())
        .await
        .unwrap();

    let err = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &[fx.seats[0].id, taken], &payment())
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::SeatUnavailable(_)));

    let details = fx.state.groups.details(group.id, group.leader).await.unwrap();
    assert_eq!(details.group.status, GroupStatus::Forming);
    assert!(details.group.actual_total_cost.is_none());
    assert!(details.members.iter().all(|m| m.seat_assigned_id.is_none()));
    assert!(fx
        .state
        .inventory
        .purchase_for_seat(fx.event_id, fx.seats[0].id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn only_the_leader_purchases_and_only_once() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 1, 4).await;

    let err = fx
        .state
        .groups
        .purchase_for_group(group.id, group.members[0], &fx.seat_ids(&[0, 1]), &payment())
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Forbidden(_)));

    fx.state
        .groups
        .purchase_for_group(group.id, group.leader, &fx.seat_ids(&[0, 1]), &payment())
        .await
        .unwrap();
    let err = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &fx.seat_ids(&[2, 3]), &payment())
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Conflict(_)));
}

#[tokio::test]
async fn invited_but_not_joined_members_do_not_count() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 1, 5).await;
    let pending = Uuid::new_v4();
    fx.state.groups.invite(group.id, group.leader, &[pending]).await.unwrap();

    let err = fx
        .state
        .groups
        .purchase_for_group(group.id, group.leader, &fx.seat_ids(&[0, 1, 2]), &payment())
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::SeatCountMismatch { expected: 2, actual: 3 }));
}

#[tokio::test]
async fn invitations_are_leader_only_and_capped() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 1, 3).await;

    let err = fx
        .state
        .groups
        .invite(group.id, group.members[0], &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Forbidden(_)));

    // leader + 1 member + 1 more fills a group of three
    let details = fx
        .state
        .groups
        .invite(group.id, group.leader, &[Uuid::new_v4(), group.members[0]])
        .await
        .unwrap();
    assert_eq!(details.headcount(), 3);

    let err = fx
        .state
        .groups
        .invite(group.id, group.leader, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Conflict(_)));
}

#[tokio::test]
async fn joining_requires_an_invitation() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 0, 4).await;

    let err = fx.state.groups.join(group.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, InventoryError::Forbidden(_)));

    let invitee = Uuid::new_v4();
    fx.state.groups.invite(group.id, group.leader, &[invitee]).await.unwrap();
    let member = fx.state.groups.join(group.id, invitee).await.unwrap();
    assert_eq!(member.status, MemberStatus::Joined);
    assert!(member.joined_at.is_some());
}

#[tokio::test]
async fn prepayments_accumulate_for_joined_members_only() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 2, 5).await;

    fx.state.groups.prepay(group.id, group.members[0], 40.0).await.unwrap();
    fx.state.groups.prepay(group.id, group.members[1], 25.5).await.unwrap();
    let details = fx.state.groups.prepay(group.id, group.members[0], 10.0).await.unwrap();
    assert_eq!(details.group.total_prepaid, 75.5);
    let first = details.members.iter().find(|m| m.user_id == group.members[0]).unwrap();
    assert_eq!(first.prepaid_amount, 50.0);

    let err = fx.state.groups.prepay(group.id, Uuid::new_v4(), 10.0).await.unwrap_err();
    assert!(matches!(err, InventoryError::Forbidden(_)));
    let err = fx.state.groups.prepay(group.id, group.members[0], 0.0).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));
}

#[tokio::test]
async fn group_details_are_private_to_participants() {
    let fx = Fixture::new().await;
    let group = forming_group(&fx, 1, 4).await;

    assert!(fx.state.groups.details(group.id, group.members[0]).await.is_ok());
    let err = fx.state.groups.details(group.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, InventoryError::Forbidden(_)));

    let listed = fx.state.groups.groups_for(group.members[0]).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, group.id);
}
