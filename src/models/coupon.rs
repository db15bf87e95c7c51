use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    EliminateFee,
    FixedDiscount,
    PercentageDiscount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coupon {
    pub code: String,
    pub discount_type: DiscountType,
    /// Cents for fixed discounts, percent for percentage discounts.
    pub discount_value: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub max_uses_total: Option<u32>,
    pub max_uses_per_user: Option<u32>,
    #[serde(default)]
    pub current_uses_total: u32,
    #[serde(default)]
    pub applicable_user_ids: Vec<Uuid>,
    #[serde(default)]
    pub applicable_account_types: Vec<String>,
    pub min_order_amount_cents: Option<i64>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Coupon terms copied onto an order at redemption time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Option<i64>,
    pub discount_cents: i64,
}

impl CouponSnapshot {
    pub fn capture(coupon: &Coupon, discount_cents: i64) -> Self {
        Self {
            code: coupon.code.clone(),
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            discount_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    UsageLimitReached,
    UserLimitReached,
    UserNotEligible,
    AccountTypeNotEligible,
    BelowMinimumOrder { min_order_amount_cents: i64 },
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => f.write_str("coupon code does not exist"),
            CouponRejection::Inactive => f.write_str("coupon is not active"),
            CouponRejection::Expired => f.write_str("coupon has expired"),
            CouponRejection::UsageLimitReached => f.write_str("coupon usage limit reached"),
            CouponRejection::UserLimitReached => {
                f.write_str("coupon already used the maximum number of times by this user")
            }
            CouponRejection::UserNotEligible => f.write_str("coupon is not available to this user"),
            CouponRejection::AccountTypeNotEligible => {
                f.write_str("coupon is not available for this account type")
            }
            CouponRejection::BelowMinimumOrder {
                min_order_amount_cents,
            } => write!(
                f,
                "order amount is below the coupon minimum of {min_order_amount_cents} cents"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<Coupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_preview: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CouponRejection>,
}

impl CouponValidation {
    pub fn accepted(coupon: Coupon) -> Self {
        Self {
            valid: true,
            coupon: Some(coupon),
            discount_preview: None,
            reason: None,
        }
    }

    pub fn rejected(reason: CouponRejection) -> Self {
        Self {
            valid: false,
            coupon: None,
            discount_preview: None,
            reason: Some(reason),
        }
    }
}
