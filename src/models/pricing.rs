use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PackageSize {
    XS,
    S,
    M,
    L,
}

impl PackageSize {
    pub const SMALLEST: PackageSize = PackageSize::XS;
    pub const LARGEST: PackageSize = PackageSize::L;
}

impl fmt::Display for PackageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PackageSize::XS => "XS",
            PackageSize::S => "S",
            PackageSize::M => "M",
            PackageSize::L => "L",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCenter {
    pub code: String,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    pub soft_radius_km: f64,
    pub active: bool,
}

impl ServiceCenter {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateCard {
    pub currency: String,
    pub base_cents: i64,
    pub per_km_cents: i64,
    /// Reserved; duration does not affect the fare.
    #[serde(default)]
    pub per_min_cents: i64,
    pub min_fare_cents: i64,
    pub size_multiplier: HashMap<PackageSize, f64>,
}

impl RateCard {
    /// Multiplier for `size`, 1.0 when the card does not list it.
    pub fn size_multiplier(&self, size: PackageSize) -> f64 {
        self.size_multiplier.get(&size).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistanceBand {
    pub km_max_threshold: f64,
    pub multiplier: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxRule {
    pub enabled: bool,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceArea {
    pub centers: Vec<ServiceCenter>,
}

/// A complete rate schedule. The store assigns `version` on publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub effective_from: DateTime<Utc>,
    pub service_area: ServiceArea,
    pub rate_card: RateCard,
    pub bands: Vec<DistanceBand>,
    pub tax: TaxRule,
}

impl PricingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.service_area.centers.is_empty() {
            return Err(AppError::Validation(
                "pricing config needs at least one service center".to_string(),
            ));
        }
        for center in &self.service_area.centers {
            center.location().validate(&format!("center {}", center.code))?;
            if !(center.soft_radius_km.is_finite() && center.soft_radius_km > 0.0) {
                return Err(AppError::Validation(format!(
                    "center {} must have a positive radius",
                    center.code
                )));
            }
        }

        if self.bands.is_empty() {
            return Err(AppError::Validation(
                "pricing config needs at least one distance band".to_string(),
            ));
        }
        let mut previous = 0.0;
        for band in &self.bands {
            if !(band.km_max_threshold.is_finite() && band.km_max_threshold > previous) {
                return Err(AppError::Validation(format!(
                    "band {} threshold must be strictly increasing",
                    band.label
                )));
            }
            if !(band.multiplier.is_finite() && band.multiplier > 0.0) {
                return Err(AppError::Validation(format!(
                    "band {} multiplier must be positive",
                    band.label
                )));
            }
            previous = band.km_max_threshold;
        }

        let card = &self.rate_card;
        if card.base_cents < 0 || card.per_km_cents < 0 || card.min_fare_cents < 0 {
            return Err(AppError::Validation(
                "rate card amounts must be non-negative".to_string(),
            ));
        }
        if card.currency.trim().is_empty() {
            return Err(AppError::Validation("rate card currency is required".to_string()));
        }
        if card
            .size_multiplier
            .values()
            .any(|m| !(m.is_finite() && *m > 0.0))
        {
            return Err(AppError::Validation(
                "size multipliers must be positive".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.tax.rate) {
            return Err(AppError::Validation("tax rate must be within [0, 1)".to_string()));
        }

        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        let center = |code: &str, label: &str, lat: f64, lng: f64, radius: f64| ServiceCenter {
            code: code.to_string(),
            label: label.to_string(),
            lat,
            lng,
            soft_radius_km: radius,
            active: true,
        };
        let band = |km: f64, multiplier: f64, label: &str| DistanceBand {
            km_max_threshold: km,
            multiplier,
            label: label.to_string(),
        };

        Self {
            version: 0,
            effective_from: Utc::now(),
            service_area: ServiceArea {
                centers: vec![
                    center("YVR", "Vancouver", 49.2827, -123.1207, 15.0),
                    center("BBY", "Burnaby", 49.2488, -122.9805, 10.0),
                    center("SRY", "Surrey", 49.1913, -122.8490, 15.0),
                ],
            },
            rate_card: RateCard {
                currency: "CAD".to_string(),
                base_cents: 300,
                per_km_cents: 99,
                per_min_cents: 0,
                min_fare_cents: 699,
                size_multiplier: HashMap::from([
                    (PackageSize::XS, 1.0),
                    (PackageSize::S, 1.10),
                    (PackageSize::M, 1.25),
                    (PackageSize::L, 1.50),
                ]),
            },
            bands: vec![
                band(5.0, 1.00, "local"),
                band(10.0, 1.10, "metro"),
                band(999.0, 1.25, "regional"),
            ],
            tax: TaxRule {
                enabled: true,
                rate: 0.05,
            },
        }
    }
}

/// Itemized fare for one trip and package size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareBreakdown {
    pub base_component: i64,
    pub distance_component: i64,
    /// Pre-tax fare after size multiplier and minimum-fare floor.
    pub base_fare: i64,
    pub tax: i64,
    pub total: i64,
    pub currency: String,
    pub distance_km: f64,
    pub duration_minutes: u32,
    pub config_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FareRange {
    pub min: i64,
    pub max: i64,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn unsorted_bands_are_rejected() {
        let mut config = PricingConfig::default();
        config.bands.swap(0, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_service_area_is_rejected() {
        let mut config = PricingConfig::default();
        config.service_area.centers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_size_defaults_to_neutral_multiplier() {
        let mut card = PricingConfig::default().rate_card;
        card.size_multiplier.remove(&PackageSize::M);
        assert_eq!(card.size_multiplier(PackageSize::M), 1.0);
        assert_eq!(card.size_multiplier(PackageSize::S), 1.10);
    }
}
