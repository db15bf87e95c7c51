use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::quote::{get_fare_estimate, get_fare_range};
use crate::error::AppError;
use crate::models::geo::GeoPoint;
use crate::models::pricing::{FareBreakdown, FareRange, PackageSize};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes/estimate", post(estimate))
        .route("/quotes/range", post(range))
}

#[derive(Deserialize)]
pub struct EstimateRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub package_size: PackageSize,
}

#[derive(Deserialize)]
pub struct RangeRequest {
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EstimateRequest>,
) -> Result<Json<FareBreakdown>, AppError> {
    let fare =
        get_fare_estimate(&state, payload.pickup, payload.dropoff, payload.package_size).await?;
    Ok(Json(fare))
}

async fn range(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RangeRequest>,
) -> Result<Json<FareRange>, AppError> {
    let range = get_fare_range(&state, payload.pickup, payload.dropoff).await?;
    Ok(Json(range))
}
