use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ledger::{Balance, OwnerKind, OwnerRef, Transaction};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/balances/:kind/:id", get(get_balance))
        .route("/balances/:kind/:id/transactions", get(get_transactions))
}

fn parse_owner(kind: &str, id: Uuid) -> Result<OwnerRef, AppError> {
    let kind = OwnerKind::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown owner kind: {kind}")))?;
    Ok(OwnerRef { kind, id })
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Balance>, AppError> {
    let owner = parse_owner(&kind, id)?;
    Ok(Json(state.ledger.balance(owner)))
}

async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let owner = parse_owner(&kind, id)?;
    Ok(Json(state.ledger.transactions(owner)))
}
