use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    response::{ApiResponse, Meta},
    status::{IllegalTransition, OrderStatus, UnknownStatus},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error(
        "product {product_id} has insufficient stock \
         (available: {available}, requested: {requested})"
    )]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i64,
    },

    #[error("cannot change status from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    InvalidState(String),

    #[error("{service} service unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} service error: {reason}")]
    Upstream {
        service: &'static str,
        reason: String,
    },

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

/// Stable classification of [`AppError`]; the HTTP status is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    InsufficientStock,
    IllegalTransition,
    InvalidState,
    Unavailable,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InsufficientStock
            | ErrorKind::IllegalTransition
            | ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(self) -> bool {
        self.status_code().is_server_error()
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden => ErrorKind::Forbidden,
            AppError::OrderNotFound(_) | AppError::ProductNotFound(_) => ErrorKind::NotFound,
            AppError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            AppError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            AppError::InvalidState(_) => ErrorKind::InvalidState,
            AppError::Unavailable { .. } => ErrorKind::Unavailable,
            AppError::Upstream { .. } => ErrorKind::Upstream,
            AppError::OrmError(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<IllegalTransition> for AppError {
    fn from(err: IllegalTransition) -> Self {
        AppError::IllegalTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<UnknownStatus> for AppError {
    fn from(err: UnknownStatus) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorData {
    pub error: String,
    pub kind: ErrorKind,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status_code();

        // server-side details stay in the logs
        let message = if kind.is_server_error() {
            tracing::error!(error = %self, debug = ?self, "request failed");
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };

        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                kind,
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
