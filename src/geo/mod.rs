use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::geo::GeoPoint;
use crate::models::pricing::ServiceCenter;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum AreaRejection {
    PickupOutsideArea,
    DropoffOutsideArea,
    LookupFailed(String),
}

impl fmt::Display for AreaRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaRejection::PickupOutsideArea => f.write_str("pickup is outside the service area"),
            AreaRejection::DropoffOutsideArea => {
                f.write_str("dropoff is outside the service area")
            }
            AreaRejection::LookupFailed(detail) => {
                write!(f, "service area lookup failed: {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaCheck {
    pub ok: bool,
    pub pickup_area_label: Option<String>,
    pub dropoff_area_label: Option<String>,
    pub reason: Option<AreaRejection>,
}

impl AreaCheck {
    fn rejected(reason: AreaRejection) -> Self {
        Self {
            ok: false,
            pickup_area_label: None,
            dropoff_area_label: None,
            reason: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<Self, AreaRejection> {
        match self.reason.clone() {
            Some(reason) => Err(reason),
            None => Ok(self),
        }
    }
}

/// Nearest active center to `point` with its distance, if any center is active.
pub fn nearest_center<'a, I>(point: &GeoPoint, centers: I) -> Option<(&'a ServiceCenter, f64)>
where
    I: IntoIterator<Item = &'a ServiceCenter>,
{
    centers
        .into_iter()
        .filter(|center| center.active)
        .map(|center| (center, haversine_km(point, &center.location())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Label of the covering center, when `point` lies within its nearest center's radius.
fn covering_label(point: &GeoPoint, centers: &[ServiceCenter]) -> Option<String> {
    let (center, distance_km) = nearest_center(point, centers)?;
    (distance_km <= center.soft_radius_km).then(|| center.label.clone())
}

/// Both endpoints must be covered, possibly by different centers.
pub fn validate_service_area(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    centers: &[ServiceCenter],
) -> AreaCheck {
    if !centers.iter().any(|center| center.active) {
        return AreaCheck::rejected(AreaRejection::LookupFailed(
            "no active service centers".to_string(),
        ));
    }

    for (name, point) in [("pickup", pickup), ("dropoff", dropoff)] {
        if point.validate(name).is_err() {
            return AreaCheck::rejected(AreaRejection::LookupFailed(format!(
                "{name} coordinates are invalid"
            )));
        }
    }

    let Some(pickup_label) = covering_label(pickup, centers) else {
        return AreaCheck::rejected(AreaRejection::PickupOutsideArea);
    };
    let Some(dropoff_label) = covering_label(dropoff, centers) else {
        return AreaCheck::rejected(AreaRejection::DropoffOutsideArea);
    };

    AreaCheck {
        ok: true,
        pickup_area_label: Some(pickup_label),
        dropoff_area_label: Some(dropoff_label),
        reason: None,
    }
}
