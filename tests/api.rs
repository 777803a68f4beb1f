mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{token, Fixture};
use ticket_inventory::controllers;

fn payment_json() -> Value {
    json!({
        "cardholderName": "Grace Hopper",
        "cardNumber": "4111-1111-1111-4242",
        "expirationMonth": 11,
        "expirationYear": 2031,
        "cvv": "321",
        "billingAddress": "12 Navy Yard",
        "billingCity": "Arlington",
        "billingState": "VA",
        "billingZip": "22202",
        "savePaymentInfo": true
    })
}

async fn send(app: &Router, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_endpoints_answer() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn seat_map_is_public_but_personalised_with_a_token() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let user = Uuid::new_v4();
    let uri = format!("/api/events/{}/seats", fx.event_id);

    let (status, body) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"].as_array().unwrap().len(), fx.seats.len());
    assert_eq!(body["seats"][0]["status"], "free");
    assert_eq!(body["seats"][0]["price"], 75.0);

    let reserve = format!("/api/events/{}/reserve", fx.event_id);
    let seat = fx.seats[0].id;
    let (status, _) = send(&app, "POST", &reserve, Some(user), Some(json!({ "seatIds": [seat] }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, mine) = send(&app, "GET", &uri, Some(user), None).await;
    assert_eq!(mine["seats"][0]["status"], "reserved_by_self");
    let (_, anonymous) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(anonymous["seats"][0]["status"], "reserved_by_other");
}

#[tokio::test]
async fn mutations_require_a_valid_token() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let uri = format!("/api/events/{}/reserve", fx.event_id);
    let body = json!({ "seatIds": [fx.seats[0].id] });

    let (status, _) = send(&app, "POST", &uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer forged")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn contested_reservation_reports_the_unavailable_seats() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let uri = format!("/api/events/{}/reserve", fx.event_id);
    let (a, b) = (fx.seats[0].id, fx.seats[1].id);

    let (status, _) = send(&app, "POST", &uri, Some(Uuid::new_v4()), Some(json!({ "seatIds": [b] }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", &uri, Some(Uuid::new_v4()), Some(json!({ "seatIds": [a, b] }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["unavailableSeats"], json!([b]));
}

#[tokio::test]
async fn purchase_flow_over_http() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let user = Uuid::new_v4();
    let seats = [fx.seats[0].id, fx.seats[8].id];

    let uri = format!("/api/events/{}/purchase", fx.event_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(user),
        Some(json!({ "seatIds": seats, "paymentInfo": payment_json() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["totalPrice"], 125.0);
    assert_eq!(body["purchases"].as_array().unwrap().len(), 2);

    let (status, history) = send(&app, "GET", "/api/purchases", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);

    let (_, methods) = send(&app, "GET", "/api/payment-methods", Some(user), None).await;
    assert_eq!(methods[0]["lastFourDigits"], "4242");
    assert!(methods[0].get("cardNumber").is_none());
    assert_eq!(history[0]["section"], "Orchestra");
    assert_eq!(history[0]["venueName"], "Riverside Hall");
    assert!(history[0]["seatNumber"].is_number());

    let (_, stats) = send(&app, "GET", "/api/stats", None, None).await;
    assert_eq!(stats["purchases"], 2);
}

#[tokio::test]
async fn presale_and_bad_payment_are_rejected() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let user = Uuid::new_v4();

    let uri = format!("/api/events/{}/purchase", fx.presale_event_id);
    let body = json!({ "seatIds": [fx.seats[0].id], "paymentInfo": payment_json() });
    let (status, _) = send(&app, "POST", &uri, Some(user), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut payment = payment_json();
    payment["expirationMonth"] = json!(13);
    let uri = format!("/api/events/{}/purchase", fx.event_id);
    let body = json!({ "seatIds": [fx.seats[0].id], "paymentInfo": payment });
    let (status, body) = send(&app, "POST", &uri, Some(user), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn marketplace_over_http() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let (seller, buyer) = (Uuid::new_v4(), Uuid::new_v4());
    let seat = fx.seats[2].id;

    let uri = format!("/api/events/{}/purchase", fx.event_id);
    send(&app, "POST", &uri, Some(seller), Some(json!({ "seatIds": [seat], "paymentInfo": payment_json() }))).await;

    let (status, listing) = send(
        &app,
        "POST",
        "/api/marketplace/listings",
        Some(seller),
        Some(json!({ "eventId": fx.event_id, "seatId": seat, "listPrice": 140.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let listing_id = listing["id"].as_str().unwrap().to_string();

    let browse = format!("/api/marketplace/listings?eventId={}", fx.event_id);
    let (_, active) = send(&app, "GET", &browse, None, None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["row"], "A");
    assert_eq!(active[0]["seatNumber"], 3);
    assert_eq!(active[0]["listPrice"], 140.0);

    let buy = format!("/api/marketplace/purchase/{listing_id}");
    let (status, sale) = send(&app, "POST", &buy, Some(buyer), Some(json!({ "paymentInfo": payment_json() }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sale["listing"]["status"], "sold");
    assert_eq!(sale["purchase"]["userId"], buyer.to_string());

    let (status, _) = send(&app, "POST", &buy, Some(Uuid::new_v4()), Some(json!({ "paymentInfo": payment_json() }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn group_flow_over_http() {
    let fx = Fixture::new().await;
    let app = controllers::router(fx.state.clone());
    let (leader, friend) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, group) = send(
        &app,
        "POST",
        "/api/groups",
        Some(leader),
        Some(json!({
            "eventId": fx.event_id,
            "groupName": "Balcony friends",
            "maxMembers": 4,
            "targetSeats": 2
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["status"], "forming");
    let base = format!("/api/groups/{}", group["id"].as_str().unwrap());

    let (status, _) = send(&app, "POST", &format!("{base}/invite"), Some(leader), Some(json!({ "userIds": [friend] }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &format!("{base}/join"), Some(friend), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "POST", &format!("{base}/payment"), Some(friend), Some(json!({ "amount": 30.0 }))).await;
    assert_eq!(status, StatusCode::OK);

    let purchase = format!("{base}/purchase");
    let (status, body) = send(
        &app,
        "POST",
        &purchase,
        Some(leader),
        Some(json!({ "seatIds": [fx.seats[0].id], "paymentInfo": payment_json() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        "POST",
        &purchase,
        Some(leader),
        Some(json!({ "seatIds": [fx.seats[0].id, fx.seats[1].id], "paymentInfo": payment_json() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["group"]["status"], "completed");
    assert_eq!(body["group"]["totalPrepaid"], 30.0);
    assert_eq!(body["group"]["members"][0]["seatAssignedId"], fx.seats[1].id.to_string());

    let (status, _) = send(&app, "GET", &base, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
