use std::sync::Arc;

use chrono::Duration;
use tokio::sync::broadcast;

use crate::models::event::OrderEvent;
use crate::observability::metrics::Metrics;
use crate::routing::DistanceProvider;
use crate::store::config::PricingConfigStore;
use crate::store::coupons::{CouponRepository, InMemoryCouponRepository};
use crate::store::orders::{InMemoryOrderRepository, OrderRepository};

pub const DEFAULT_ORDER_TTL_MINUTES: i64 = 30;

pub struct AppState {
    pub pricing: PricingConfigStore,
    pub orders: Arc<dyn OrderRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub routes: Arc<dyn DistanceProvider>,
    pub order_events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
    /// How long a new order stays acceptable before the sweep cancels it.
    pub order_ttl: Duration,
}

impl AppState {
    /// State backed by the in-memory repositories.
    pub fn new(
        pricing: PricingConfigStore,
        routes: Arc<dyn DistanceProvider>,
        event_buffer_size: usize,
    ) -> Self {
        Self::with_repositories(
            pricing,
            routes,
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCouponRepository::new()),
            event_buffer_size,
        )
    }

    pub fn with_repositories(
        pricing: PricingConfigStore,
        routes: Arc<dyn DistanceProvider>,
        orders: Arc<dyn OrderRepository>,
        coupons: Arc<dyn CouponRepository>,
        event_buffer_size: usize,
    ) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            pricing,
            orders,
            coupons,
            routes,
            order_events_tx,
            metrics: Metrics::new(),
            order_ttl: Duration::minutes(DEFAULT_ORDER_TTL_MINUTES),
        }
    }

    pub fn with_order_ttl(mut self, ttl: Duration) -> Self {
        self.order_ttl = ttl;
        self
    }

    pub fn publish(&self, event: OrderEvent) {
        let _ = self.order_events_tx.send(event);
    }
}
