use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::engine::coupon::{create_coupon, preview_coupon};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::coupon::{Coupon, CouponValidation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coupons", post(create).get(list))
        .route("/coupons/validate", post(validate))
}

#[derive(Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub subtotal_cents: i64,
    #[serde(default)]
    pub account_type: Option<String>,
}

async fn validate(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidation>, AppError> {
    let mut validation = preview_coupon(
        &state,
        &payload.code,
        actor.id,
        payload.subtotal_cents,
        payload.account_type.as_deref(),
        Utc::now(),
    )
    .await?;

    // Customers see the outcome, not the coupon's internal limits.
    if !actor.is_admin() {
        validation.coupon = None;
    }
    Ok(Json(validation))
}

async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<Coupon>,
) -> Result<Json<Coupon>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("only operators can create coupons".to_string()));
    }
    Ok(Json(create_coupon(&state, payload).await?))
}

async fn list(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Coupon>>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("only operators can list coupons".to_string()));
    }
    Ok(Json(state.coupons.list().await?))
}
