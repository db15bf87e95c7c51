use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use parcel_engine::api;
use parcel_engine::config::Config;
use parcel_engine::engine::coupon::create_coupon;
use parcel_engine::engine::sweep::run_expiry_sweeper;
use parcel_engine::error::AppError;
use parcel_engine::models::coupon::Coupon;
use parcel_engine::models::pricing::PricingConfig;
use parcel_engine::routing::{StraightLineProvider, TimeoutProvider};
use parcel_engine::state::AppState;
use parcel_engine::store::config::{load_config_file, PricingConfigStore};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let initial_pricing = match &config.pricing_config_path {
        Some(path) => load_config_file(path)?,
        None => PricingConfig::default(),
    };
    let pricing = PricingConfigStore::new(initial_pricing)?;

    let routes = TimeoutProvider::new(
        StraightLineProvider::new(config.road_factor, config.average_speed_kmh),
        Duration::from_millis(config.route_timeout_ms),
    );

    let app_state = AppState::new(pricing, Arc::new(routes), config.event_buffer_size)
        .with_order_ttl(chrono::Duration::minutes(config.order_ttl_minutes));
    let shared_state = Arc::new(app_state);

    if let Some(path) = &config.coupons_path {
        seed_coupons(&shared_state, path).await?;
    }

    tokio::spawn(run_expiry_sweeper(
        shared_state.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    ));

    if let Some(path) = config.pricing_config_path.clone() {
        tokio::spawn(watch_pricing_file(
            shared_state.clone(),
            path,
            Duration::from_secs(config.config_reload_secs),
        ));
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        pricing_version = shared_state.pricing.active().version,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn seed_coupons(state: &AppState, path: &Path) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::Internal(format!("failed to read {}: {err}", path.display())))?;
    let coupons: Vec<Coupon> = serde_json::from_str(&raw)
        .map_err(|err| AppError::Validation(format!("invalid coupons file: {err}")))?;

    let count = coupons.len();
    for coupon in coupons {
        create_coupon(state, coupon).await?;
    }
    tracing::info!(count, "coupons seeded");
    Ok(())
}

async fn watch_pricing_file(state: Arc<AppState>, path: PathBuf, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match state.pricing.reload_from_path(&path) {
            Ok(Some(version)) => tracing::info!(version, "pricing config reloaded"),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "pricing config reload failed; keeping active version"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
