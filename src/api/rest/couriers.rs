use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{CourierLocation, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", get(list_couriers))
        .route("/couriers/:id/heartbeat", post(heartbeat))
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub location: GeoPoint,
    pub available: bool,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<HeartbeatRequest>,
) -> Result<Json<CourierLocation>, AppError> {
    if !payload.location.lat.is_finite() || !payload.location.lng.is_finite() {
        return Err(AppError::BadRequest("location must be finite".to_string()));
    }
    if payload.location.lat.abs() > 90.0 || payload.location.lng.abs() > 180.0 {
        return Err(AppError::BadRequest("location out of range".to_string()));
    }

    let entry = state
        .geo
        .heartbeat(id, payload.location, payload.available);
    Ok(Json(entry))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<CourierLocation>> {
    Json(state.geo.all())
}
