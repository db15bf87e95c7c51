use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::geo::AreaRejection;
use crate::models::coupon::CouponRejection;
use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("outside service area: {0}")]
    ServiceArea(AreaRejection),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("invalid coupon: {0}")]
    InvalidCoupon(CouponRejection),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("invalid transition from {current} to {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::ServiceArea(_) => "service_area_error",
            AppError::Upstream(_) => "upstream_error",
            AppError::InvalidCoupon(_) => "invalid_coupon",
            AppError::Conflict(_) => "conflict",
            AppError::Expired(_) => "expired",
            AppError::PaymentRequired(_) => "payment_required",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceArea(_) | AppError::InvalidCoupon(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Conflict(_) | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        if let AppError::InvalidTransition { current, requested } = &self {
            body["current"] = json!(current);
            body["requested"] = json!(requested);
        }

        (status, Json(body)).into_response()
    }
}
