//! Maps component errors onto the wire error shapes in spec §6.1/§7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ai_broker::AiError;
use crate::budget::BudgetError;
use crate::mapper::MapperError;
use crate::task_bus::TaskBusError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    TaskBus(#[from] TaskBusError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("{0}")]
    BadRequest(String),
    #[error("no online agent for this network")]
    NoOnlineAgent,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            // Budget failures surface as 402, per spec §6.1 form-page callbacks.
            AppError::Budget(BudgetError::BudgetExceeded { .. }) => (StatusCode::PAYMENT_REQUIRED, "BUDGET_EXCEEDED"),
            AppError::Budget(BudgetError::AccessDenied { code, .. }) => (StatusCode::FORBIDDEN, code.as_str()),
            AppError::Budget(BudgetError::NoSubscription { .. }) => (StatusCode::FORBIDDEN, "NO_API_KEY"),
            AppError::Budget(BudgetError::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            AppError::TaskBus(TaskBusError::SessionInvalidated) => (StatusCode::UNAUTHORIZED, "session_invalidated"),
            AppError::TaskBus(TaskBusError::TokenExpired) => (StatusCode::UNAUTHORIZED, "token_expired"),
            AppError::TaskBus(TaskBusError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::TaskBus(TaskBusError::Store(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            AppError::Mapper(MapperError::UnknownSession(_)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Mapper(MapperError::StateConflict(..)) => (StatusCode::CONFLICT, "state_conflict"),
            AppError::Mapper(MapperError::LoginFailed) => (StatusCode::OK, "LOGIN_FAILED"),
            AppError::Mapper(MapperError::BudgetExceeded) => (StatusCode::PAYMENT_REQUIRED, "BUDGET_EXCEEDED"),
            AppError::Mapper(MapperError::AccessDenied(code)) => (StatusCode::FORBIDDEN, code.as_str()),
            AppError::Mapper(MapperError::Budget(BudgetError::AccessDenied { code, .. })) => (StatusCode::FORBIDDEN, code.as_str()),
            AppError::Mapper(MapperError::Budget(_)) => (StatusCode::PAYMENT_REQUIRED, "BUDGET_EXCEEDED"),
            AppError::Mapper(MapperError::Bus(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            AppError::Mapper(MapperError::Other(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            AppError::Ai(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NoOnlineAgent => (StatusCode::BAD_REQUEST, "no_online_agent"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
        };

        let body = ErrorBody {
            error: code.to_string(),
            message: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
