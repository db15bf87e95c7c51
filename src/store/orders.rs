use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::order::{DeliveryOrder, OrderChange, OrderStatus, PaymentStatus};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverGuard {
    Any,
    Unset,
    Is(Uuid),
}

/// Precondition of a conditional update. Every set field must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderGuard {
    pub status: Option<OrderStatus>,
    pub driver: DriverGuard,
    pub payment: Option<PaymentStatus>,
    /// Order must not have expired at this instant.
    pub live_at: Option<DateTime<Utc>>,
    /// Order must have expired at this instant.
    pub expired_at: Option<DateTime<Utc>>,
}

impl OrderGuard {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            driver: DriverGuard::Any,
            payment: None,
            live_at: None,
            expired_at: None,
        }
    }

    pub fn driver(mut self, driver: DriverGuard) -> Self {
        self.driver = driver;
        self
    }

    pub fn payment(mut self, payment: PaymentStatus) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn live_at(mut self, now: DateTime<Utc>) -> Self {
        self.live_at = Some(now);
        self
    }

    pub fn expired_at(mut self, now: DateTime<Utc>) -> Self {
        self.expired_at = Some(now);
        self
    }

    pub fn matches(&self, order: &DeliveryOrder) -> bool {
        if self.status.is_some_and(|status| order.status != status) {
            return false;
        }

        let driver_ok = match self.driver {
            DriverGuard::Any => true,
            DriverGuard::Unset => order.driver_id.is_none(),
            DriverGuard::Is(id) => order.driver_id == Some(id),
        };
        if !driver_ok {
            return false;
        }

        if self.payment.is_some_and(|payment| order.payment_status != payment) {
            return false;
        }
        if self.live_at.is_some_and(|now| order.is_expired_at(now)) {
            return false;
        }
        if self.expired_at.is_some_and(|now| !order.is_expired_at(now)) {
            return false;
        }

        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The guard held and the change was committed; carries the new state.
    Applied(DeliveryOrder),
    /// The guard did not hold; carries the state that was observed.
    Rejected(DeliveryOrder),
    Missing,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: DeliveryOrder) -> Result<(), StoreError>;

    async fn get(&self, order_id: &str) -> Result<Option<DeliveryOrder>, StoreError>;

    /// Checks `guard` and applies `change` as one atomic step.
    async fn update_where(
        &self,
        order_id: &str,
        guard: &OrderGuard,
        change: &OrderChange,
    ) -> Result<CasOutcome, StoreError>;

    /// Ids of pending, unassigned orders whose expiry is at or before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Pending, paid, unassigned orders that can still be accepted.
    async fn list_assignable(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryOrder>, StoreError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<DeliveryOrder>, StoreError>;

    async fn count_coupon_redemptions(&self, user_id: Uuid, code: &str)
    -> Result<u32, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<String, DeliveryOrder>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, mut keep: F) -> Vec<DeliveryOrder>
    where
        F: FnMut(&DeliveryOrder) -> bool,
    {
        self.orders
            .iter()
            .filter_map(|entry| {
                let order = entry.value();
                if keep(order) { Some(order.clone()) } else { None }
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: DeliveryOrder) -> Result<(), StoreError> {
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(existing) => Err(StoreError::DuplicateKey(existing.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<DeliveryOrder>, StoreError> {
        Ok(self.orders.get(order_id).map(|entry| entry.value().clone()))
    }

    async fn update_where(
        &self,
        order_id: &str,
        guard: &OrderGuard,
        change: &OrderChange,
    ) -> Result<CasOutcome, StoreError> {
        // The shard write lock is held from the guard check through the mutation.
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Ok(CasOutcome::Missing);
        };

        if !guard.matches(&order) {
            return Ok(CasOutcome::Rejected(order.clone()));
        }

        order.apply(change);
        Ok(CasOutcome::Applied(order.clone()))
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(self
            .collect(|order| {
                order.status == OrderStatus::Pending
                    && order.driver_id.is_none()
                    && order.is_expired_at(now)
            })
            .into_iter()
            .map(|order| order.order_id)
            .collect())
    }

    async fn list_assignable(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryOrder>, StoreError> {
        let mut orders = self.collect(|order| {
            order.status == OrderStatus::Pending
                && order.driver_id.is_none()
                && order.payment_status == PaymentStatus::Paid
                && !order.is_expired_at(now)
        });
        orders.sort_by_key(|order| order.timeline.created_at);
        Ok(orders)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<DeliveryOrder>, StoreError> {
        let mut orders = self.collect(|order| order.user_id == user_id);
        orders.sort_by(|a, b| b.timeline.created_at.cmp(&a.timeline.created_at));
        Ok(orders)
    }

    async fn count_coupon_redemptions(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<u32, StoreError> {
        let count = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                order.user_id == user_id
                    && order
                        .coupon
                        .as_ref()
                        .is_some_and(|coupon| coupon.code == code)
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.orders.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::order::fixtures::pending_order;

    async fn paid_order(repo: &InMemoryOrderRepository, id: &str) -> DeliveryOrder {
        let mut order = pending_order(id, Uuid::new_v4(), Utc::now());
        order.payment_status = PaymentStatus::Paid;
        repo.insert(order.clone()).await.unwrap();
        order
    }

    fn accept_guard(now: DateTime<Utc>) -> OrderGuard {
        OrderGuard::status(OrderStatus::Pending)
            .driver(DriverGuard::Unset)
            .payment(PaymentStatus::Paid)
            .live_at(now)
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = paid_order(&repo, "DLV-AAAA0001").await;

        let result = repo.insert(order).await;

        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn rejected_update_leaves_order_untouched() {
        let repo = InMemoryOrderRepository::new();
        let order = paid_order(&repo, "DLV-AAAA0002").await;
        let now = Utc::now();

        let outcome = repo
            .update_where(
                &order.order_id,
                &OrderGuard::status(OrderStatus::Assigned),
                &OrderChange::Advance {
                    to: OrderStatus::PickedUp,
                    at: now,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, CasOutcome::Rejected(order.clone()));
        assert_eq!(repo.get(&order.order_id).await.unwrap(), Some(order));
    }

    #[tokio::test]
    async fn missing_order_reports_missing() {
        let repo = InMemoryOrderRepository::new();
        let outcome = repo
            .update_where(
                "DLV-NOPE0000",
                &OrderGuard::status(OrderStatus::Pending),
                &OrderChange::Payment(PaymentStatus::Paid),
            )
            .await
            .unwrap();

        assert_eq!(outcome, CasOutcome::Missing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assignment_has_exactly_one_winner() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = paid_order(&repo, "DLV-RACE0001").await;
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            let order_id = order.order_id.clone();
            handles.push(tokio::spawn(async move {
                repo.update_where(
                    &order_id,
                    &accept_guard(now),
                    &OrderChange::Assign {
                        driver_id: Uuid::new_v4(),
                        at: now,
                    },
                )
                .await
                .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), CasOutcome::Applied(_)) {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn expired_guard_matches_only_after_expiry() {
        let repo = InMemoryOrderRepository::new();
        let order = paid_order(&repo, "DLV-EXPR0001").await;
        let expires_at = order.expires_at.unwrap();

        assert!(repo.find_expired(expires_at - Duration::seconds(1)).await.unwrap().is_empty());
        assert_eq!(
            repo.find_expired(expires_at).await.unwrap(),
            vec![order.order_id.clone()]
        );

        let guard = OrderGuard::status(OrderStatus::Pending).expired_at(expires_at);
        assert!(guard.matches(&order));
        assert!(!accept_guard(expires_at).matches(&order));
    }

    #[tokio::test]
    async fn assignable_orders_must_be_paid_and_live() {
        let repo = InMemoryOrderRepository::new();
        let now = Utc::now();
        let paid = paid_order(&repo, "DLV-LIST0001").await;
        repo.insert(pending_order("DLV-LIST0002", Uuid::new_v4(), now))
            .await
            .unwrap();

        let listed = repo.list_assignable(now).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].order_id, paid.order_id);

        let later = now + Duration::hours(1);
        assert!(repo.list_assignable(later).await.unwrap().is_empty());
    }
}
