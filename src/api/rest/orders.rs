use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::orders::{
    accept_order, cancel_order, create_order, get_order, list_available_orders,
    list_orders_for_user, record_payment, update_order_status, NewOrder,
};
use crate::engine::sweep::sweep_expired_orders;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::order::{DeliveryOrder, OrderStatus, PaymentStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create).get(list_mine))
        .route("/orders/:id", get(show))
        .route("/orders/:id/accept", post(accept))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/cancel", post(cancel))
        .route("/orders/:id/payment", post(payment))
        .route("/drivers/available-orders", get(available))
        .route("/maintenance/sweep", post(sweep))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub cancelled: usize,
}

async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewOrder>,
) -> Result<Json<DeliveryOrder>, AppError> {
    if actor.role == Role::Driver {
        return Err(AppError::Forbidden("drivers cannot book deliveries".to_string()));
    }
    let order = create_order(&state, actor.id, payload, Utc::now()).await?;
    Ok(Json(order))
}

async fn list_mine(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    Ok(Json(list_orders_for_user(&state, actor.id).await?))
}

async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(get_order(&state, &id, actor).await?))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(accept_order(&state, &id, actor, Utc::now()).await?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    let order = update_order_status(&state, &id, actor, payload.status, Utc::now()).await?;
    Ok(Json(order))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
) -> Result<Json<DeliveryOrder>, AppError> {
    Ok(Json(cancel_order(&state, &id, actor, Utc::now()).await?))
}

/// Called by the payment integration once a charge settles or is refunded.
async fn payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    actor: Actor,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<DeliveryOrder>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("payment updates are restricted".to_string()));
    }
    let order = record_payment(&state, &id, payload.payment_status, Utc::now()).await?;
    Ok(Json(order))
}

async fn available(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    Ok(Json(list_available_orders(&state, actor, Utc::now()).await?))
}

async fn sweep(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<SweepResponse>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("sweeps are restricted".to_string()));
    }
    let cancelled = sweep_expired_orders(&state, Utc::now()).await?;
    Ok(Json(SweepResponse { cancelled }))
}
