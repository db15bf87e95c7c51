use crate::models::pricing::{DistanceBand, FareBreakdown, PackageSize, PricingConfig, TaxRule};
use crate::routing::Route;

/// Tax on a pre-tax amount. Both the plain and couponed paths use this.
pub fn compute_tax(amount_cents: i64, tax: &TaxRule) -> i64 {
    if !tax.enabled {
        return 0;
    }
    (amount_cents as f64 * tax.rate).round() as i64
}

/// Distance charge in fractional cents, walking the bands in ascending order.
/// The last band is open-ended and absorbs whatever distance remains.
fn distance_charge(distance_km: f64, per_km_cents: i64, bands: &[DistanceBand]) -> f64 {
    let mut previous_km = 0.0;
    let mut remaining = distance_km.max(0.0);
    let mut charge = 0.0;

    for (index, band) in bands.iter().enumerate() {
        if remaining <= 0.0 {
            break;
        }

        let is_last = index + 1 == bands.len();
        let band_span = band.km_max_threshold - previous_km;
        let portion = if is_last {
            remaining
        } else {
            remaining.min(band_span)
        };

        charge += portion * per_km_cents as f64 * band.multiplier;
        remaining -= portion;
        previous_km = band.km_max_threshold;
    }

    charge
}

/// Prices one trip. Duration is carried through but never priced.
pub fn compute_fare(route: &Route, size: PackageSize, config: &PricingConfig) -> FareBreakdown {
    let card = &config.rate_card;

    let base_component = card.base_cents;
    let distance_component =
        distance_charge(route.distance_km, card.per_km_cents, &config.bands).round() as i64;

    let fare = base_component + distance_component;
    let fare = (fare as f64 * card.size_multiplier(size)).round() as i64;
    let fare = fare.max(card.min_fare_cents);

    let tax = compute_tax(fare, &config.tax);

    FareBreakdown {
        base_component,
        distance_component,
        base_fare: fare,
        tax,
        total: fare + tax,
        currency: card.currency.clone(),
        distance_km: route.distance_km,
        duration_minutes: route.duration_minutes,
        config_version: config.version,
    }
}
