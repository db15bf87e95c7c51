use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::coupon::{normalize_code, Coupon};
use crate::store::StoreError;

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError>;

    async fn get(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn list(&self) -> Result<Vec<Coupon>, StoreError>;

    /// Adds one redemption to the coupon's running total.
    async fn increment_usage(&self, code: &str) -> Result<u32, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCouponRepository {
    coupons: DashMap<String, Coupon>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn insert(&self, mut coupon: Coupon) -> Result<Coupon, StoreError> {
        coupon.code = normalize_code(&coupon.code);
        match self.coupons.entry(coupon.code.clone()) {
            Entry::Occupied(existing) => Err(StoreError::DuplicateKey(existing.key().clone())),
            Entry::Vacant(slot) => Ok(slot.insert(coupon).clone()),
        }
    }

    async fn get(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self
            .coupons
            .get(&normalize_code(code))
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Coupon>, StoreError> {
        let mut coupons: Vec<Coupon> = self
            .coupons
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    async fn increment_usage(&self, code: &str) -> Result<u32, StoreError> {
        let code = normalize_code(code);
        let mut coupon = self
            .coupons
            .get_mut(&code)
            .ok_or(StoreError::NotFound(code.clone()))?;

        coupon.current_uses_total = coupon.current_uses_total.saturating_add(1);
        Ok(coupon.current_uses_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coupon::DiscountType;

    fn coupon(code: &str) -> Coupon {
        Coupon {
            code: code.to_string(),
            discount_type: DiscountType::FixedDiscount,
            discount_value: Some(500),
            expiry_date: None,
            is_active: true,
            max_uses_total: None,
            max_uses_per_user: None,
            current_uses_total: 0,
            applicable_user_ids: Vec::new(),
            applicable_account_types: Vec::new(),
            min_order_amount_cents: None,
        }
    }

    #[tokio::test]
    async fn codes_are_stored_uppercase_and_unique() {
        let repo = InMemoryCouponRepository::new();
        let stored = repo.insert(coupon(" welcome5 ")).await.unwrap();
        assert_eq!(stored.code, "WELCOME5");

        assert!(matches!(
            repo.insert(coupon("Welcome5")).await,
            Err(StoreError::DuplicateKey(_))
        ));
        assert!(repo.get("welcome5").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn usage_only_increases() {
        let repo = InMemoryCouponRepository::new();
        repo.insert(coupon("SAVE")).await.unwrap();

        assert_eq!(repo.increment_usage("save").await.unwrap(), 1);
        assert_eq!(repo.increment_usage("SAVE").await.unwrap(), 2);
        assert!(matches!(
            repo.increment_usage("MISSING").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
