use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::coupon::CouponSnapshot;
use crate::models::geo::GeoPoint;
use crate::models::pricing::PackageSize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Transitions a driver may request on an order they own.
    /// `pending -> assigned` is not listed; it only happens through acceptance.
    pub fn driver_can_move_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Assigned, OrderStatus::PickedUp)
                | (OrderStatus::PickedUp, OrderStatus::InTransit)
                | (OrderStatus::InTransit, OrderStatus::Delivered)
                | (OrderStatus::Assigned, OrderStatus::Cancelled)
                | (OrderStatus::PickedUp, OrderStatus::Cancelled)
                | (OrderStatus::InTransit, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn can_move_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Unpaid, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    Expired,
    Customer,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub address: String,
    pub coordinates: GeoPoint,
    pub contact_name: String,
    pub contact_phone: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub size: PackageSize,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Prices fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingSnapshot {
    pub base_fare: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub coupon_discount: i64,
    pub total: i64,
    pub currency: String,
    pub config_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistanceSnapshot {
    pub km: f64,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryOrder {
    pub order_id: String,
    pub user_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub pickup: Stop,
    pub dropoff: Stop,
    pub package: Package,
    pub pricing: PricingSnapshot,
    pub coupon: Option<CouponSnapshot>,
    pub distance: DistanceSnapshot,
    pub timeline: Timeline,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<CancellationReason>,
}

/// A mutation the store applies once its guard has matched.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderChange {
    Assign { driver_id: Uuid, at: DateTime<Utc> },
    Advance { to: OrderStatus, at: DateTime<Utc> },
    Cancel { reason: CancellationReason, at: DateTime<Utc> },
    Payment(PaymentStatus),
}

impl DeliveryOrder {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn apply(&mut self, change: &OrderChange) {
        match *change {
            OrderChange::Assign { driver_id, at } => {
                self.driver_id = Some(driver_id);
                self.status = OrderStatus::Assigned;
                self.timeline.assigned_at = Some(at);
                self.expires_at = None;
            }
            OrderChange::Advance { to, at } => {
                self.status = to;
                match to {
                    OrderStatus::PickedUp => {
                        self.timeline.picked_up_at = Some(at);
                        self.pickup.actual_at = Some(at);
                    }
                    OrderStatus::Delivered => {
                        self.timeline.delivered_at = Some(at);
                        self.dropoff.actual_at = Some(at);
                    }
                    _ => {}
                }
            }
            OrderChange::Cancel { reason, at } => {
                self.status = OrderStatus::Cancelled;
                self.timeline.cancelled_at = Some(at);
                self.cancellation_reason = Some(reason);
                self.expires_at = None;
            }
            OrderChange::Payment(status) => {
                self.payment_status = status;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::fixtures::pending_order;
    use super::*;

    #[test]
    fn terminal_states_accept_no_driver_transitions() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for next in OrderStatus::ALL {
                assert!(!terminal.driver_can_move_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn driver_transition_table_is_closed() {
        let allowed = [
            (OrderStatus::Assigned, OrderStatus::PickedUp),
            (OrderStatus::PickedUp, OrderStatus::InTransit),
            (OrderStatus::InTransit, OrderStatus::Delivered),
            (OrderStatus::Assigned, OrderStatus::Cancelled),
            (OrderStatus::PickedUp, OrderStatus::Cancelled),
            (OrderStatus::InTransit, OrderStatus::Cancelled),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.driver_can_move_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn assignment_clears_expiry_and_stamps_timeline() {
        let now = Utc::now();
        let driver = Uuid::new_v4();
        let mut order = pending_order("DLV-TEST0001", Uuid::new_v4(), now);

        order.apply(&OrderChange::Assign {
            driver_id: driver,
            at: now,
        });

        assert_eq!(order.status, OrderStatus::Assigned);
        assert_eq!(order.driver_id, Some(driver));
        assert_eq!(order.timeline.assigned_at, Some(now));
        assert!(order.expires_at.is_none());
        assert!(!order.is_expired_at(now + chrono::Duration::days(1)));
    }

    #[test]
    fn pickup_and_delivery_stamp_stops() {
        let now = Utc::now();
        let mut order = pending_order("DLV-TEST0002", Uuid::new_v4(), now);

        order.apply(&OrderChange::Advance {
            to: OrderStatus::PickedUp,
            at: now,
        });
        assert_eq!(order.pickup.actual_at, Some(now));
        assert_eq!(order.timeline.picked_up_at, Some(now));

        order.apply(&OrderChange::Advance {
            to: OrderStatus::Delivered,
            at: now,
        });
        assert_eq!(order.dropoff.actual_at, Some(now));
        assert_eq!(order.timeline.delivered_at, Some(now));
    }

    #[test]
    fn payment_moves_forward_only() {
        assert!(PaymentStatus::Unpaid.can_move_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Paid.can_move_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_move_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Unpaid.can_move_to(PaymentStatus::Refunded));
    }
}
