use std::time::Instant;

use tracing::{debug, warn};

use crate::engine::fare::compute_fare;
use crate::error::AppError;
use crate::geo::validate_service_area;
use crate::models::geo::GeoPoint;
use crate::models::pricing::{FareBreakdown, FareRange, PackageSize, PricingConfig};
use crate::routing::Route;
use crate::state::AppState;

/// Checks coverage for both endpoints, then asks the provider for the route.
/// Nothing is priced when either step fails.
pub async fn route_for_trip(
    state: &AppState,
    config: &PricingConfig,
    pickup: GeoPoint,
    dropoff: GeoPoint,
) -> Result<Route, AppError> {
    pickup.validate("pickup")?;
    dropoff.validate("dropoff")?;

    let area = validate_service_area(&pickup, &dropoff, &config.service_area.centers)
        .into_result()
        .map_err(AppError::ServiceArea)?;
    debug!(
        pickup_area = area.pickup_area_label.as_deref().unwrap_or_default(),
        dropoff_area = area.dropoff_area_label.as_deref().unwrap_or_default(),
        "trip inside service area"
    );

    let route = state.routes.compute_route(pickup, dropoff).await?;
    Ok(route)
}

pub async fn get_fare_estimate(
    state: &AppState,
    pickup: GeoPoint,
    dropoff: GeoPoint,
    size: PackageSize,
) -> Result<FareBreakdown, AppError> {
    let config = state.pricing.active();
    observe_quote(state, async {
        let route = route_for_trip(state, &config, pickup, dropoff).await?;
        Ok(compute_fare(&route, size, &config))
    })
    .await
}

/// Fare spread between the smallest and largest package sizes.
pub async fn get_fare_range(
    state: &AppState,
    pickup: GeoPoint,
    dropoff: GeoPoint,
) -> Result<FareRange, AppError> {
    let config = state.pricing.active();
    observe_quote(state, async {
        let route = route_for_trip(state, &config, pickup, dropoff).await?;
        let low = compute_fare(&route, PackageSize::SMALLEST, &config);
        let high = compute_fare(&route, PackageSize::LARGEST, &config);

        Ok(FareRange {
            min: low.total,
            max: high.total,
            currency: low.currency,
        })
    })
    .await
}

async fn observe_quote<T, F>(state: &AppState, quote: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, AppError>>,
{
    let start = Instant::now();
    let result = quote.await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => {
            warn!(error = %err, "fare quote failed");
            err.code()
        }
    };
    state
        .metrics
        .quote_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state.metrics.quotes_total.with_label_values(&[outcome]).inc();

    result
}
