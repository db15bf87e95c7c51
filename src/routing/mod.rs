use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub distance_km: f64,
    pub duration_minutes: u32,
}

impl Route {
    /// Kilometres rounded to two decimals, minutes rounded up.
    pub fn from_raw(distance_meters: f64, duration_seconds: f64) -> Result<Self, RouteError> {
        if !(distance_meters.is_finite() && distance_meters >= 0.0)
            || !(duration_seconds.is_finite() && duration_seconds >= 0.0)
        {
            return Err(RouteError::RouteNotFound(
                "provider returned an invalid route".to_string(),
            ));
        }

        let distance_km = (distance_meters / 10.0).round() / 100.0;
        let duration_minutes = (duration_seconds / 60.0).ceil();
        Ok(Self {
            distance_km,
            duration_minutes: duration_minutes.min(f64::from(u32::MAX)) as u32,
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouteError {
    #[error("no route found: {0}")]
    RouteNotFound(String),

    #[error("routing provider unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<RouteError> for AppError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::RouteNotFound(msg) => AppError::Validation(format!("no route found: {msg}")),
            RouteError::UpstreamUnavailable(msg) => AppError::Upstream(msg),
        }
    }
}

/// Driving distance and duration between two points.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn compute_route(&self, pickup: GeoPoint, dropoff: GeoPoint)
    -> Result<Route, RouteError>;
}

/// Offline estimator: great-circle distance stretched by a road factor.
#[derive(Debug, Clone)]
pub struct StraightLineProvider {
    pub road_factor: f64,
    pub average_speed_kmh: f64,
}

impl StraightLineProvider {
    pub fn new(road_factor: f64, average_speed_kmh: f64) -> Self {
        Self {
            road_factor,
            average_speed_kmh,
        }
    }
}

#[async_trait]
impl DistanceProvider for StraightLineProvider {
    async fn compute_route(
        &self,
        pickup: GeoPoint,
        dropoff: GeoPoint,
    ) -> Result<Route, RouteError> {
        if self.average_speed_kmh <= 0.0 {
            return Err(RouteError::UpstreamUnavailable(
                "estimator has no usable speed".to_string(),
            ));
        }

        let meters = haversine_km(&pickup, &dropoff) * self.road_factor * 1_000.0;
        let seconds = meters / 1_000.0 / self.average_speed_kmh * 3_600.0;
        Route::from_raw(meters, seconds)
    }
}

/// Bounds every call of the wrapped provider.
pub struct TimeoutProvider<P> {
    inner: P,
    timeout: Duration,
}

impl<P> TimeoutProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<P> DistanceProvider for TimeoutProvider<P>
where
    P: DistanceProvider,
{
    async fn compute_route(
        &self,
        pickup: GeoPoint,
        dropoff: GeoPoint,
    ) -> Result<Route, RouteError> {
        match tokio::time::timeout(self.timeout, self.inner.compute_route(pickup, dropoff)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "route lookup timed out");
                Err(RouteError::UpstreamUnavailable(format!(
                    "route lookup exceeded {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl DistanceProvider for SlowProvider {
        async fn compute_route(&self, _: GeoPoint, _: GeoPoint) -> Result<Route, RouteError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Route::from_raw(1_000.0, 60.0)
        }
    }

    #[test]
    fn raw_route_is_rounded_to_cents_of_km_and_whole_minutes() {
        let route = Route::from_raw(12_345.0, 61.0).unwrap();
        assert_eq!(route.distance_km, 12.35);
        assert_eq!(route.duration_minutes, 2);

        let exact = Route::from_raw(5_000.0, 120.0).unwrap();
        assert_eq!(exact.distance_km, 5.0);
        assert_eq!(exact.duration_minutes, 2);
    }

    #[test]
    fn negative_raw_values_are_not_a_route() {
        assert!(matches!(
            Route::from_raw(-1.0, 10.0),
            Err(RouteError::RouteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn straight_line_applies_road_factor() {
        let provider = StraightLineProvider::new(1.5, 30.0);
        let a = GeoPoint::new(49.2827, -123.1207);
        let b = GeoPoint::new(49.2488, -122.9805);

        let route = provider.compute_route(a, b).await.unwrap();
        let straight = haversine_km(&a, &b);

        assert!((route.distance_km - straight * 1.5).abs() < 0.01);
        assert!(route.duration_minutes > 0);
    }

    #[tokio::test]
    async fn timeout_surfaces_upstream_unavailable() {
        let provider = TimeoutProvider::new(SlowProvider, Duration::from_millis(20));
        let p = GeoPoint::new(49.0, -123.0);

        let result = provider.compute_route(p, p).await;

        assert!(matches!(result, Err(RouteError::UpstreamUnavailable(_))));
    }

    #[test]
    fn upstream_errors_map_to_retryable_app_error() {
        let err: AppError = RouteError::UpstreamUnavailable("down".to_string()).into();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
