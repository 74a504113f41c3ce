use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition from {from}")]
    InvalidTransition {
        from: OrderStatus,
        allowed: Vec<OrderStatus>,
    },

    #[error("order is terminal in state {0}")]
    TerminalState(OrderStatus),

    #[error("no available courier")]
    NoAvailableCourier,

    #[error("assignment expired or already taken")]
    AssignmentExpiredOrTaken,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)
            | AppError::InvalidTransition { .. }
            | AppError::TerminalState(_)
            | AppError::AssignmentExpiredOrTaken => StatusCode::CONFLICT,
            AppError::NoAvailableCourier => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({
            "error": self.to_string()
        });
        // legal next states travel with the rejection so clients can render them
        if let AppError::InvalidTransition { allowed, .. } = &self {
            body["allowed"] = json!(allowed);
        }

        (status, Json(body)).into_response()
    }
}
