use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{CancellationReason, OrderChange, OrderStatus};
use crate::state::AppState;
use crate::store::orders::{CasOutcome, DriverGuard, OrderGuard};

/// Cancels every pending, unassigned order whose expiry is at or before `now`.
///
/// Each cancellation re-checks its guard atomically, so an order accepted
/// between the scan and the update is left alone. Running the sweep again
/// for the same instant cancels nothing new.
pub async fn sweep_expired_orders(state: &AppState, now: DateTime<Utc>) -> Result<usize, AppError> {
    let candidates = state.orders.find_expired(now).await?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let guard = OrderGuard::status(OrderStatus::Pending)
        .driver(DriverGuard::Unset)
        .expired_at(now);
    let change = OrderChange::Cancel {
        reason: CancellationReason::Expired,
        at: now,
    };

    let mut cancelled = 0;
    for order_id in candidates {
        match state.orders.update_where(&order_id, &guard, &change).await {
            Ok(CasOutcome::Applied(order)) => {
                cancelled += 1;
                state.publish(OrderEvent::from_order(OrderEventKind::Expired, &order, now));
                info!(order_id = %order.order_id, "unassigned order expired");
            }
            Ok(CasOutcome::Rejected(order)) => {
                debug!(order_id = %order.order_id, status = %order.status, "order no longer expirable");
            }
            Ok(CasOutcome::Missing) => {
                debug!(order_id = %order_id, "expired order vanished before cancellation");
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "failed to expire order; continuing");
            }
        }
    }

    state.metrics.orders_expired_total.inc_by(cancelled as u64);
    Ok(cancelled)
}

pub async fn run_expiry_sweeper(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "expiry sweeper started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match sweep_expired_orders(&state, Utc::now()).await {
            Ok(0) => {}
            Ok(count) => info!(count, "expiry sweep cancelled orders"),
            Err(err) => error!(error = %err, "expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use super::*;
    use crate::models::actor::Actor;
    use crate::models::order::fixtures::pending_order;
    use crate::models::order::{DeliveryOrder, PaymentStatus};
    use crate::models::pricing::PricingConfig;
    use crate::routing::StraightLineProvider;
    use crate::store::config::PricingConfigStore;
    use crate::store::coupons::InMemoryCouponRepository;
    use crate::store::orders::{InMemoryOrderRepository, OrderRepository};
    use crate::store::StoreError;

    fn state_with_orders(orders: Arc<dyn OrderRepository>) -> AppState {
        let pricing = PricingConfigStore::new(PricingConfig::default()).unwrap();
        AppState::with_repositories(
            pricing,
            Arc::new(StraightLineProvider::new(1.3, 30.0)),
            orders,
            Arc::new(InMemoryCouponRepository::new()),
            16,
        )
    }

    async fn seed(state: &AppState, id: &str, now: DateTime<Utc>) -> DeliveryOrder {
        let mut order = pending_order(id, Uuid::new_v4(), now);
        order.payment_status = PaymentStatus::Paid;
        state.orders.insert(order.clone()).await.unwrap();
        order
    }

    #[tokio::test]
    async fn sweep_cancels_each_expired_order_once() {
        let state = state_with_orders(Arc::new(InMemoryOrderRepository::new()));
        let created = Utc::now();
        seed(&state, "DLV-SWEEP001", created).await;
        seed(&state, "DLV-SWEEP002", created).await;
        seed(&state, "DLV-SWEEP003", created + ChronoDuration::minutes(20)).await;

        let tick = created + ChronoDuration::minutes(30);
        assert_eq!(sweep_expired_orders(&state, tick).await.unwrap(), 2);
        assert_eq!(sweep_expired_orders(&state, tick).await.unwrap(), 0);

        let expired = state.orders.get("DLV-SWEEP001").await.unwrap().unwrap();
        assert_eq!(expired.status, OrderStatus::Cancelled);
        assert_eq!(expired.timeline.cancelled_at, Some(tick));
        assert_eq!(expired.cancellation_reason, Some(CancellationReason::Expired));

        let fresh = state.orders.get("DLV-SWEEP003").await.unwrap().unwrap();
        assert_eq!(fresh.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn accepted_orders_are_left_alone() {
        let state = state_with_orders(Arc::new(InMemoryOrderRepository::new()));
        let created = Utc::now();
        let order = seed(&state, "DLV-SWEEP010", created).await;

        crate::engine::orders::accept_order(
            &state,
            &order.order_id,
            Actor::driver(Uuid::new_v4()),
            created + ChronoDuration::minutes(5),
        )
        .await
        .unwrap();

        let tick = created + ChronoDuration::hours(2);
        assert_eq!(sweep_expired_orders(&state, tick).await.unwrap(), 0);
        assert_eq!(
            state.orders.get(&order.order_id).await.unwrap().unwrap().status,
            OrderStatus::Assigned
        );
    }

    /// Reports a stale scan: the listed order was accepted before the update ran.
    struct StaleScan {
        inner: InMemoryOrderRepository,
        stale_id: String,
    }

    #[async_trait]
    impl OrderRepository for StaleScan {
        async fn insert(&self, order: DeliveryOrder) -> Result<(), StoreError> {
            self.inner.insert(order).await
        }

        async fn get(&self, order_id: &str) -> Result<Option<DeliveryOrder>, StoreError> {
            self.inner.get(order_id).await
        }

        async fn update_where(
            &self,
            order_id: &str,
            guard: &OrderGuard,
            change: &OrderChange,
        ) -> Result<CasOutcome, StoreError> {
            if order_id == "DLV-BROKEN01" {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.update_where(order_id, guard, change).await
        }

        async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
            let mut ids = self.inner.find_expired(now).await?;
            ids.push(self.stale_id.clone());
            ids.push("DLV-BROKEN01".to_string());
            Ok(ids)
        }

        async fn list_assignable(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<DeliveryOrder>, StoreError> {
            self.inner.list_assignable(now).await
        }

        async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<DeliveryOrder>, StoreError> {
            self.inner.list_by_user(user_id).await
        }

        async fn count_coupon_redemptions(
            &self,
            user_id: Uuid,
            code: &str,
        ) -> Result<u32, StoreError> {
            self.inner.count_coupon_redemptions(user_id, code).await
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn sweep_skips_raced_and_failing_orders() {
        let repo = Arc::new(StaleScan {
            inner: InMemoryOrderRepository::new(),
            stale_id: "DLV-RACED001".to_string(),
        });
        let state = state_with_orders(repo);
        let created = Utc::now();
        seed(&state, "DLV-EXPIRE01", created).await;
        let raced = seed(&state, "DLV-RACED001", created).await;

        let driver = Uuid::new_v4();
        state
            .orders
            .update_where(
                &raced.order_id,
                &OrderGuard::status(OrderStatus::Pending),
                &OrderChange::Assign {
                    driver_id: driver,
                    at: created,
                },
            )
            .await
            .unwrap();

        let tick = created + ChronoDuration::minutes(45);
        assert_eq!(sweep_expired_orders(&state, tick).await.unwrap(), 1);

        let raced = state.orders.get("DLV-RACED001").await.unwrap().unwrap();
        assert_eq!(raced.status, OrderStatus::Assigned);
        assert_eq!(raced.driver_id, Some(driver));
    }
}
