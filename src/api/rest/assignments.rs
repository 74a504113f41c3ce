use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/accept", post(accept))
        .route("/assignments/:id/reject", post(reject))
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub courier_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    Json(state.assignments.all())
}

async fn get_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state
        .assignments
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {id} not found")))?;
    Ok(Json(assignment))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state.dispatcher.accept(id, payload.courier_id).await?;
    Ok(Json(assignment))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = state
        .dispatcher
        .reject(id, payload.courier_id, payload.reason)
        .await?;
    Ok(Json(assignment))
}
