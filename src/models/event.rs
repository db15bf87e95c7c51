use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{DeliveryOrder, OrderStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    Assigned,
    StatusChanged,
    PaymentChanged,
    Cancelled,
    Expired,
}

/// Published after every committed order mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: String,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn from_order(kind: OrderEventKind, order: &DeliveryOrder, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            order_id: order.order_id.clone(),
            user_id: order.user_id,
            driver_id: order.driver_id,
            status: order.status,
            payment_status: order.payment_status,
            at,
        }
    }
}
