use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::GeoPoint;
use crate::models::order::{Order, OrderStatus, StatusHistoryEntry};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/history", get(get_history))
        .route("/orders/:id/transition", post(request_transition))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub store_id: Uuid,
    pub customer_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub total: i64,
    pub delivery_fee: i64,
    #[serde(default)]
    pub tax: i64,
    #[serde(default)]
    pub service_fee: i64,
    pub commission_bps: u32,
    #[serde(default)]
    pub estimated_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.total <= 0 {
        return Err(AppError::BadRequest("total must be > 0".to_string()));
    }
    if payload.delivery_fee < 0 || payload.tax < 0 || payload.service_fee < 0 {
        return Err(AppError::BadRequest("fees cannot be negative".to_string()));
    }
    if payload.commission_bps > 10_000 {
        return Err(AppError::BadRequest(
            "commission_bps cannot exceed 10000".to_string(),
        ));
    }

    let order = Order {
        id: Uuid::new_v4(),
        status: OrderStatus::Pending,
        store_id: payload.store_id,
        customer_id: payload.customer_id,
        courier_id: None,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        total: payload.total,
        delivery_fee: payload.delivery_fee,
        tax: payload.tax,
        service_fee: payload.service_fee,
        commission_bps: payload.commission_bps,
        created_at: Utc::now(),
        estimated_delivery_at: payload.estimated_delivery_at,
        delivered_at: None,
    };

    state.orders.insert(order.clone());
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusHistoryEntry>>, AppError> {
    if state.orders.get(id).is_none() {
        return Err(AppError::NotFound(format!("order {id} not found")));
    }
    Ok(Json(state.orders.history(id)))
}

async fn request_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .lifecycle
        .request_transition(id, payload.status, payload.note)
        .await?;
    Ok(Json(order))
}
