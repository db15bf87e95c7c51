use std::env;
use std::path::PathBuf;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub order_ttl_minutes: i64,
    pub sweep_interval_secs: u64,
    pub route_timeout_ms: u64,
    pub road_factor: f64,
    pub average_speed_kmh: f64,
    pub pricing_config_path: Option<PathBuf>,
    pub config_reload_secs: u64,
    pub coupons_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            order_ttl_minutes: parse_or_default("ORDER_TTL_MINUTES", 30)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 60)?,
            route_timeout_ms: parse_or_default("ROUTE_TIMEOUT_MS", 5_000)?,
            road_factor: parse_or_default("ROAD_FACTOR", 1.3)?,
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", 30.0)?,
            pricing_config_path: optional_path("PRICING_CONFIG_PATH"),
            config_reload_secs: parse_or_default("CONFIG_RELOAD_SECS", 30)?,
            coupons_path: optional_path("COUPONS_PATH"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.order_ttl_minutes <= 0 {
            return Err(AppError::Internal("ORDER_TTL_MINUTES must be > 0".to_string()));
        }
        if self.sweep_interval_secs == 0 || self.config_reload_secs == 0 {
            return Err(AppError::Internal(
                "SWEEP_INTERVAL_SECS and CONFIG_RELOAD_SECS must be > 0".to_string(),
            ));
        }
        if self.road_factor < 1.0 || self.average_speed_kmh <= 0.0 {
            return Err(AppError::Internal(
                "ROAD_FACTOR must be >= 1 and AVERAGE_SPEED_KMH > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
