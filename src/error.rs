use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::{ErrorResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("A user with this email address already exists")]
    EmailTaken,

    #[error("Invalid {0} address")]
    InvalidAddress(&'static str),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Could not compute price: {0}")]
    PriceComputation(String),

    #[error("Order could not be created")]
    OrderCreationFailed,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Order not found")]
    OrderNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Order already paid")]
    AlreadyPaid,

    #[error("Payment already completed")]
    AlreadyCompleted,

    #[error("Order has not been paid")]
    OrderNotPaid,

    #[error("A refund already exists for this order")]
    DuplicateRefund,

    #[error("quantity must be between 1 and {}", crate::pricing::MAX_LINE_QUANTITY)]
    InvalidQuantity,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound
            | AppError::OrderNotFound
            | AppError::PaymentNotFound
            | AppError::ProductNotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_)
            | AppError::EmailTaken
            | AppError::InvalidAddress(_)
            | AppError::EmptyCart
            | AppError::PriceComputation(_)
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyPaid
            | AppError::AlreadyCompleted
            | AppError::OrderNotPaid
            | AppError::DuplicateRefund
            | AppError::InvalidQuantity => StatusCode::BAD_REQUEST,
            AppError::OrderCreationFailed
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                AppError::DbError(err) => tracing::error!(error = %err, "database error"),
                AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
                AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
                other => tracing::error!(error = %other, "request failed"),
            }
        }

        let body = ErrorResponse {
            message: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            error: self.to_string(),
            meta: Meta::empty(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_errors_are_bad_requests() {
        for err in [
            AppError::AlreadyPaid,
            AppError::AlreadyCompleted,
            AppError::DuplicateRefund,
            AppError::EmailTaken,
            AppError::EmptyCart,
            AppError::InvalidTransition {
                from: "shipped".into(),
                to: "cancelled".into(),
            },
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn lookups_and_auth_map_to_their_codes() {
        assert_eq!(AppError::OrderNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::PaymentNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Unauthorized("expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal Server Error");
        assert_eq!(AppError::OrderCreationFailed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
