use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::coupon::{Coupon, CouponRejection, CouponValidation, DiscountType};
use crate::state::AppState;
use crate::store::coupons::CouponRepository;

const USAGE_ATTEMPTS: usize = 3;
/// Pause before the second and third attempts.
const USAGE_BACKOFF_MS: [u64; USAGE_ATTEMPTS - 1] = [50, 100];

/// Who is redeeming, and against how much.
#[derive(Debug, Clone)]
pub struct RedemptionContext<'a> {
    pub user_id: Uuid,
    pub account_type: Option<&'a str>,
    pub order_amount_cents: i64,
    pub user_redemptions: u32,
    pub now: DateTime<Utc>,
}

/// Applies the coupon rules in order, stopping at the first one that fails.
pub fn check_terms(coupon: &Coupon, ctx: &RedemptionContext<'_>) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.expiry_date.is_some_and(|expiry| ctx.now > expiry) {
        return Err(CouponRejection::Expired);
    }
    if coupon
        .max_uses_total
        .is_some_and(|max| coupon.current_uses_total >= max)
    {
        return Err(CouponRejection::UsageLimitReached);
    }
    if coupon
        .max_uses_per_user
        .is_some_and(|max| ctx.user_redemptions >= max)
    {
        return Err(CouponRejection::UserLimitReached);
    }
    if !coupon.applicable_user_ids.is_empty() && !coupon.applicable_user_ids.contains(&ctx.user_id)
    {
        return Err(CouponRejection::UserNotEligible);
    }
    if !coupon.applicable_account_types.is_empty() {
        let eligible = ctx.account_type.is_some_and(|account_type| {
            coupon
                .applicable_account_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(account_type))
        });
        if !eligible {
            return Err(CouponRejection::AccountTypeNotEligible);
        }
    }
    if let Some(min) = coupon.min_order_amount_cents {
        if ctx.order_amount_cents < min {
            return Err(CouponRejection::BelowMinimumOrder {
                min_order_amount_cents: min,
            });
        }
    }

    Ok(())
}

/// Discount in cents, never more than `subtotal_cents` and never negative.
pub fn calculate_discount(coupon: &Coupon, subtotal_cents: i64, base_fare_cents: i64) -> i64 {
    let subtotal = subtotal_cents.max(0);
    let value = coupon.discount_value.unwrap_or(0).max(0);

    let discount = match coupon.discount_type {
        DiscountType::EliminateFee => base_fare_cents,
        DiscountType::FixedDiscount => value,
        DiscountType::PercentageDiscount => subtotal * value.min(100) / 100,
    };

    discount.clamp(0, subtotal)
}

/// Looks the coupon up and checks it for this user and amount.
pub async fn validate_coupon(
    state: &AppState,
    code: &str,
    user_id: Uuid,
    order_amount_cents: i64,
    account_type: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CouponValidation, AppError> {
    let Some(coupon) = state.coupons.get(code).await? else {
        return Ok(CouponValidation::rejected(CouponRejection::NotFound));
    };

    let user_redemptions = if coupon.max_uses_per_user.is_some() {
        state
            .orders
            .count_coupon_redemptions(user_id, &coupon.code)
            .await?
    } else {
        0
    };

    let ctx = RedemptionContext {
        user_id,
        account_type,
        order_amount_cents,
        user_redemptions,
        now,
    };

    Ok(match check_terms(&coupon, &ctx) {
        Ok(()) => CouponValidation::accepted(coupon),
        Err(reason) => CouponValidation::rejected(reason),
    })
}

/// `ValidateCoupon`: validity plus the discount it would give on `subtotal_cents`.
pub async fn preview_coupon(
    state: &AppState,
    code: &str,
    user_id: Uuid,
    subtotal_cents: i64,
    account_type: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CouponValidation, AppError> {
    if subtotal_cents < 0 {
        return Err(AppError::Validation("subtotal must be non-negative".to_string()));
    }

    let mut validation =
        validate_coupon(state, code, user_id, subtotal_cents, account_type, now).await?;

    if let Some(coupon) = &validation.coupon {
        let base_fee = state.pricing.active().rate_card.base_cents;
        validation.discount_preview = Some(calculate_discount(coupon, subtotal_cents, base_fee));
    }

    Ok(validation)
}

pub async fn create_coupon(state: &AppState, coupon: Coupon) -> Result<Coupon, AppError> {
    if coupon.code.trim().is_empty() {
        return Err(AppError::Validation("coupon code cannot be empty".to_string()));
    }

    match (coupon.discount_type, coupon.discount_value) {
        (DiscountType::EliminateFee, _) => {}
        (DiscountType::FixedDiscount, Some(value)) if value > 0 => {}
        (DiscountType::PercentageDiscount, Some(value)) if (1..=100).contains(&value) => {}
        (DiscountType::FixedDiscount, _) => {
            return Err(AppError::Validation(
                "fixed discounts need a positive discount_value".to_string(),
            ));
        }
        (DiscountType::PercentageDiscount, _) => {
            return Err(AppError::Validation(
                "percentage discounts need a discount_value between 1 and 100".to_string(),
            ));
        }
    }

    let stored = state.coupons.insert(coupon).await?;
    info!(code = %stored.code, "coupon created");
    Ok(stored)
}

/// Bumps the coupon's usage counter in the background. Failures are logged
/// and never reach the order that redeemed it.
pub fn record_redemption(state: &AppState, code: String) {
    let coupons = state.coupons.clone();
    let failures = state.metrics.coupon_usage_failures_total.clone();

    tokio::spawn(async move {
        if increment_with_retry(coupons.as_ref(), &code).await.is_err() {
            failures.inc();
        }
    });
}

async fn increment_with_retry(
    coupons: &dyn CouponRepository,
    code: &str,
) -> Result<u32, AppError> {
    let mut last_error = None;

    for attempt in 0..USAGE_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(USAGE_BACKOFF_MS[attempt - 1])).await;
        }
        match coupons.increment_usage(code).await {
            Ok(uses) => return Ok(uses),
            Err(err) => {
                warn!(code, attempt = attempt + 1, error = %err, "coupon usage increment failed");
                last_error = Some(err);
            }
        }
    }

    let err = last_error
        .map(AppError::from)
        .unwrap_or_else(|| AppError::Internal("coupon usage increment not attempted".to_string()));
    error!(code, error = %err, "giving up on coupon usage increment");
    Err(err)
}
