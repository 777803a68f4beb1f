mod common;

use chrono::{Duration, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use uuid::Uuid;

use common::Fixture;
use ticket_inventory::error::InventoryError;
use ticket_inventory::store::SeatStatus;

#[tokio::test]
async fn new_selection_replaces_the_old_one() {
    let fx = Fixture::new().await;
    let user = Uuid::new_v4();
    let (a, b, c) = (fx.seats[0].id, fx.seats[1].id, fx.seats[2].id);

    fx.state.reservations.reserve(user, fx.event_id, &[a, b]).await.unwrap();
    let receipt = fx.state.reservations.reserve(user, fx.event_id, &[c]).await.unwrap();
    assert_eq!(receipt.seat_ids, vec![c]);

    let held: Vec<Uuid> = fx
        .state
        .reservations
        .held(user, fx.event_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.seat_id)
        .collect();
    assert_eq!(held, vec![c]);
}

#[tokio::test]
async fn holds_expire_after_the_configured_ttl() {
    let fx = Fixture::new().await;
    let now = Utc::now();
    let receipt = fx
        .state
        .reservations
        .reserve_at(Uuid::new_v4(), fx.event_id, &[fx.seats[0].id], now)
        .await
        .unwrap();
    assert_eq!(receipt.expires_at, now + Duration::minutes(15));
}

#[tokio::test]
async fn rejected_batch_leaves_the_user_with_nothing() {
    let fx = Fixture::new().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (a, b, c) = (fx.seats[0].id, fx.seats[1].id, fx.seats[2].id);

    fx.state.reservations.reserve(bob, fx.event_id, &[c]).await.unwrap();
    fx.state.reservations.reserve(alice, fx.event_id, &[a]).await.unwrap();

    let err = fx
        .state
        .reservations
        .reserve(alice, fx.event_id, &[b, c])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::SeatUnavailable(ref seats) if seats == &vec![c]));

    // the previous hold on A is gone and nothing new was written for B
    assert!(fx.state.reservations.held(alice, fx.event_id).await.unwrap().is_empty());
    let map = fx.state.availability.seat_map(fx.event_id, Some(alice)).await.unwrap();
    let status: HashMap<Uuid, SeatStatus> = map.seats.iter().map(|s| (s.seat.id, s.status)).collect();
    assert_eq!(status[&a], SeatStatus::Free);
    assert_eq!(status[&b], SeatStatus::Free);
    assert_eq!(status[&c], SeatStatus::ReservedByOther);
}

#[tokio::test]
async fn expired_hold_never_blocks_another_user() {
    let fx = Fixture::new().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let seat = fx.seats[3].id;
    let start = Utc::now();

    fx.state
        .reservations
        .reserve_at(alice, fx.event_id, &[seat], start)
        .await
        .unwrap();
    let during = start + Duration::minutes(14);
    assert!(fx
        .state
        .reservations
        .reserve_at(bob, fx.event_id, &[seat], during)
        .await
        .is_err());

    // no sweep has run; the stale row is simply ignored
    let after = start + Duration::minutes(16);
    let receipt = fx
        .state
        .reservations
        .reserve_at(bob, fx.event_id, &[seat], after)
        .await
        .unwrap();
    assert_eq!(receipt.seat_ids, vec![seat]);
}

#[tokio::test]
async fn seat_map_distinguishes_self_from_other() {
    let fx = Fixture::new().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let seat = fx.seats[5].id;
    fx.state.reservations.reserve(alice, fx.event_id, &[seat]).await.unwrap();

    assert_eq!(status_of(&fx, seat, Some(alice)).await, SeatStatus::ReservedBySelf);
    assert_eq!(status_of(&fx, seat, Some(bob)).await, SeatStatus::ReservedByOther);
    assert_eq!(status_of(&fx, seat, None).await, SeatStatus::ReservedByOther);
}

async fn status_of(fx: &Fixture, seat: Uuid, requester: Option<Uuid>) -> SeatStatus {
    let map = fx.state.availability.seat_map(fx.event_id, requester).await.unwrap();
    map.seats.into_iter().find(|s| s.seat.id == seat).unwrap().status
}

#[tokio::test]
async fn release_is_idempotent() {
    let fx = Fixture::new().await;
    let user = Uuid::new_v4();
    fx.state
        .reservations
        .reserve(user, fx.event_id, &fx.seat_ids(&[0, 1]))
        .await
        .unwrap();

    assert_eq!(fx.state.reservations.release(user, fx.event_id).await.unwrap(), 2);
    assert_eq!(fx.state.reservations.release(user, fx.event_id).await.unwrap(), 0);
}

#[tokio::test]
async fn rejects_bad_selections() {
    let fx = Fixture::new().await;
    let user = Uuid::new_v4();
    let seat = fx.seats[0].id;

    let err = fx.state.reservations.reserve(user, fx.event_id, &[]).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));

    let err = fx
        .state
        .reservations
        .reserve(user, fx.event_id, &[seat, seat])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));

    let err = fx
        .state
        .reservations
        .reserve(user, fx.event_id, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NotFound(_)));

    let err = fx
        .state
        .reservations
        .reserve(user, Uuid::new_v4(), &[seat])
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holds_on_one_seat_admit_a_single_user() {
    let fx = Fixture::new().await;
    let seat = fx.seats[7].id;

    let attempts = (0..16).map(|_| {
        let state = fx.state.clone();
        let event = fx.event_id;
        tokio::spawn(async move { state.reservations.reserve(Uuid::new_v4(), event, &[seat]).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, InventoryError::SeatUnavailable(_))));
}
