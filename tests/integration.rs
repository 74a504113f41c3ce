use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use delivery_dispatch::api::rest::router;
use delivery_dispatch::config::Config;
use delivery_dispatch::engine::dispatch::run_dispatch_worker;
use delivery_dispatch::engine::queue::DispatchJob;
use delivery_dispatch::settlement::run_settlement_listener;
use delivery_dispatch::state::AppState;

fn setup() -> (axum::Router, mpsc::Receiver<DispatchJob>) {
    let (state, rx) = AppState::new(Config::default());
    (router(Arc::new(state)), rx)
}

fn setup_with_workers(config: Config) -> (axum::Router, Arc<AppState>) {
    let (state, rx) = AppState::new(config);
    let shared = Arc::new(state);
    tokio::spawn(run_dispatch_worker(shared.clone(), rx));
    tokio::spawn(run_settlement_listener(
        shared.settlement.clone(),
        shared.events_tx.subscribe(),
    ));
    (router(shared.clone()), shared)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn order_payload() -> Value {
    json!({
        "store_id": uuid::Uuid::new_v4(),
        "customer_id": uuid::Uuid::new_v4(),
        "pickup": { "lat": 30.0, "lng": 31.0 },
        "dropoff": { "lat": 30.02, "lng": 31.02 },
        "total": 1000,
        "delivery_fee": 50,
        "commission_bps": 1000
    })
}

async fn create_order(app: &axum::Router, payload: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn heartbeat(app: &axum::Router, courier_id: &str, lat: f64, lng: f64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/couriers/{courier_id}/heartbeat"),
            json!({ "location": { "lat": lat, "lng": lng }, "available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn transition(app: &axum::Router, order_id: &str, status: &str) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/transition"),
            json!({ "status": status }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["couriers"], 0);
    assert_eq!(body["assignments"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("dispatch_queue_depth"));
}

#[tokio::test]
async fn create_order_starts_pending_with_seeded_history() {
    let (app, _rx) = setup();
    let order = create_order(&app, order_payload()).await;

    assert_eq!(order["status"], "pending");
    assert!(order["courier_id"].is_null());
    assert_eq!(order["total"], 1000);

    let order_id = order["id"].as_str().unwrap();
    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}/history")))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "pending");
}

#[tokio::test]
async fn create_order_rejects_bad_amounts() {
    let (app, _rx) = setup();

    let mut payload = order_payload();
    payload["total"] = json!(0);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/orders", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut payload = order_payload();
    payload["commission_bps"] = json!(20_000);
    let response = app
        .oneshot(json_request("POST", "/orders", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn illegal_transition_returns_conflict_with_allowed_states() {
    let (app, _rx) = setup();
    let order = create_order(&app, order_payload()).await;
    let order_id = order["id"].as_str().unwrap();

    let response = transition(&app, order_id, "on_the_way").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["allowed"], json!(["confirmed", "cancelled"]));
}

#[tokio::test]
async fn heartbeat_rejects_out_of_range_locations() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/couriers/{}/heartbeat", uuid::Uuid::new_v4()),
            json!({ "location": { "lat": 95.0, "lng": 31.0 }, "available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_delivery_flow_settles_both_sides() {
    let (app, state) = setup_with_workers(Config::default());

    let near = uuid::Uuid::new_v4().to_string();
    let far = uuid::Uuid::new_v4().to_string();
    heartbeat(&app, &far, 30.045, 31.0).await;
    heartbeat(&app, &near, 30.009, 31.0).await;

    let order = create_order(&app, order_payload()).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let store_id = order["store_id"].as_str().unwrap().to_string();

    for status in ["confirmed", "processing", "ready_for_delivery"] {
        let response = transition(&app, &order_id, status).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    // the nearer courier got the assignment
    let response = app.clone().oneshot(get_request("/assignments")).await.unwrap();
    let assignments = body_json(response).await;
    let list = assignments.as_array().unwrap();
    assert_eq!(list.len(), 1);
    let assignment = &list[0];
    assert_eq!(assignment["order_id"], order_id);
    assert_eq!(assignment["courier_id"], near);
    assert_eq!(assignment["state"], "assigned");
    assert_eq!(assignment["estimated_earning"], 50);
    let assignment_id = assignment["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/assignments/{assignment_id}/accept"),
            json!({ "courier_id": near }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["state"], "accepted");

    let response = transition(&app, &order_id, "on_the_way").await;
    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/balances/store/{store_id}")))
        .await
        .unwrap();
    let store_balance = body_json(response).await;
    assert_eq!(store_balance["pending"], -900);
    assert_eq!(store_balance["total"], -900);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/balances/courier/{near}")))
        .await
        .unwrap();
    let courier_balance = body_json(response).await;
    assert_eq!(courier_balance["pending"], 900);
    assert_eq!(courier_balance["total"], 900);

    let response = transition(&app, &order_id, "delivered").await;
    assert_eq!(response.status(), StatusCode::OK);
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/balances/store/{store_id}")))
        .await
        .unwrap();
    let store_balance = body_json(response).await;
    assert_eq!(store_balance["available"], 100);
    assert_eq!(store_balance["total"], -800);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/balances/courier/{near}")))
        .await
        .unwrap();
    let courier_balance = body_json(response).await;
    assert_eq!(courier_balance["available"], 50);
    assert_eq!(courier_balance["total"], 950);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/balances/courier/{near}/transactions")))
        .await
        .unwrap();
    let journal = body_json(response).await;
    assert_eq!(journal.as_array().unwrap().len(), 2);

    // the order is now terminal
    let response = transition(&app, &order_id, "delivered").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let order = state.orders.get(order_id.parse().unwrap()).unwrap();
    assert!(order.delivered_at.is_some());
    assert_eq!(state.orders.history(order.id).len(), 6);
}

#[tokio::test]
async fn rejected_assignment_rolls_to_the_next_courier() {
    let (app, _state) = setup_with_workers(Config::default());

    let near = uuid::Uuid::new_v4().to_string();
    let far = uuid::Uuid::new_v4().to_string();
    heartbeat(&app, &near, 30.009, 31.0).await;
    heartbeat(&app, &far, 30.045, 31.0).await;

    let order = create_order(&app, order_payload()).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    for status in ["confirmed", "processing", "ready_for_delivery"] {
        let response = transition(&app, &order_id, status).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let response = app.clone().oneshot(get_request("/assignments")).await.unwrap();
    let assignments = body_json(response).await;
    let first = &assignments.as_array().unwrap()[0];
    assert_eq!(first["courier_id"], near);
    let first_id = first["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/assignments/{first_id}/reject"),
            json!({ "courier_id": near, "reason": "busy" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let response = app.clone().oneshot(get_request("/assignments")).await.unwrap();
    let assignments = body_json(response).await;
    let list = assignments.as_array().unwrap();
    assert_eq!(list.len(), 2);

    let replacement = list
        .iter()
        .find(|a| a["state"] == "assigned")
        .expect("replacement assignment");
    assert_eq!(replacement["courier_id"], far);
    assert_eq!(replacement["order_id"], order_id);
}

#[tokio::test]
async fn unanswered_assignment_times_out_and_moves_on() {
    let config = Config {
        response_window_secs: 1,
        ..Config::default()
    };
    let (app, state) = setup_with_workers(config);

    let near = uuid::Uuid::new_v4().to_string();
    let far = uuid::Uuid::new_v4().to_string();
    heartbeat(&app, &near, 30.009, 31.0).await;
    heartbeat(&app, &far, 30.045, 31.0).await;

    let order = create_order(&app, order_payload()).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    for status in ["confirmed", "processing", "ready_for_delivery"] {
        let response = transition(&app, &order_id, status).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // let the response window lapse without an accept or reject
    tokio::time::sleep(tokio::time::Duration::from_millis(1_600)).await;

    let assignments = state.assignments.all();
    assert_eq!(assignments.len(), 2);

    let timed_out = assignments
        .iter()
        .find(|a| a.state == delivery_dispatch::models::assignment::AssignmentState::TimedOut)
        .expect("timed out assignment");
    let replacement = assignments
        .iter()
        .find(|a| a.state == delivery_dispatch::models::assignment::AssignmentState::Assigned)
        .expect("replacement assignment");

    assert_eq!(timed_out.courier_id.to_string(), near);
    assert_eq!(replacement.courier_id.to_string(), far);
    assert_ne!(timed_out.id, replacement.id);
}
