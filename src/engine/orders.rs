use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::coupon::{calculate_discount, record_redemption, validate_coupon};
use crate::engine::fare::{compute_fare, compute_tax};
use crate::engine::quote::route_for_trip;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::coupon::CouponSnapshot;
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{
    CancellationReason, DeliveryOrder, DistanceSnapshot, OrderChange, OrderStatus, Package,
    PaymentStatus, PricingSnapshot, Stop, Timeline,
};
use crate::state::AppState;
use crate::store::orders::{CasOutcome, DriverGuard, OrderGuard};
use crate::store::StoreError;

const ORDER_ID_PREFIX: &str = "DLV-";
const ORDER_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_ID_LEN: usize = 8;
const MAX_ID_ATTEMPTS: usize = 5;
const MAX_STATUS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub pickup: Stop,
    pub dropoff: Stop,
    pub package: Package,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
}

/// Short id customers can read out over the phone.
pub fn generate_order_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_ID_LEN)
        .map(|_| char::from(ORDER_ID_ALPHABET[rng.gen_range(0..ORDER_ID_ALPHABET.len())]))
        .collect();
    format!("{ORDER_ID_PREFIX}{suffix}")
}

fn validate_stop(stop: &Stop, field: &str) -> Result<(), AppError> {
    stop.coordinates.validate(field)?;

    for (name, value) in [
        ("address", &stop.address),
        ("contact_name", &stop.contact_name),
        ("contact_phone", &stop.contact_phone),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field}.{name} cannot be empty")));
        }
    }
    Ok(())
}

fn validate_new_order(order: &NewOrder) -> Result<(), AppError> {
    validate_stop(&order.pickup, "pickup")?;
    validate_stop(&order.dropoff, "dropoff")?;

    if let Some(weight) = order.package.weight {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(AppError::Validation("package.weight must be positive".to_string()));
        }
    }
    Ok(())
}

/// Prices and persists a new pending order.
pub async fn create_order(
    state: &AppState,
    owner_id: Uuid,
    request: NewOrder,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder, AppError> {
    validate_new_order(&request)?;

    let config = state.pricing.active();
    let route = route_for_trip(
        state,
        &config,
        request.pickup.coordinates,
        request.dropoff.coordinates,
    )
    .await?;
    let fare = compute_fare(&route, request.package.size, &config);

    let coupon_code = request
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());

    let coupon = match coupon_code {
        Some(code) => {
            let validation = validate_coupon(
                state,
                code,
                owner_id,
                fare.base_fare,
                request.account_type.as_deref(),
                now,
            )
            .await?;

            match (validation.coupon, validation.reason) {
                (Some(coupon), None) => {
                    let discount =
                        calculate_discount(&coupon, fare.base_fare, fare.base_component);
                    Some(CouponSnapshot::capture(&coupon, discount))
                }
                (_, Some(reason)) => return Err(AppError::InvalidCoupon(reason)),
                (None, None) => {
                    return Err(AppError::Internal("coupon validation returned nothing".to_string()));
                }
            }
        }
        None => None,
    };

    let coupon_discount = coupon.as_ref().map_or(0, |c| c.discount_cents);
    let subtotal = fare.base_fare - coupon_discount;
    let tax = compute_tax(subtotal, &config.tax);

    let mut order = DeliveryOrder {
        order_id: generate_order_id(),
        user_id: owner_id,
        driver_id: None,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        pickup: Stop {
            actual_at: None,
            ..request.pickup
        },
        dropoff: Stop {
            actual_at: None,
            ..request.dropoff
        },
        package: request.package,
        pricing: PricingSnapshot {
            base_fare: fare.base_fare,
            subtotal,
            tax,
            coupon_discount,
            total: subtotal + tax,
            currency: fare.currency,
            config_version: fare.config_version,
        },
        coupon,
        distance: DistanceSnapshot {
            km: route.distance_km,
            duration_minutes: route.duration_minutes,
        },
        timeline: Timeline {
            created_at: now,
            ..Timeline::default()
        },
        expires_at: Some(now + state.order_ttl),
        cancellation_reason: None,
    };

    let mut attempts = 0;
    loop {
        attempts += 1;
        match state.orders.insert(order.clone()).await {
            Ok(()) => break,
            Err(StoreError::DuplicateKey(_)) if attempts < MAX_ID_ATTEMPTS => {
                order.order_id = generate_order_id();
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(snapshot) = &order.coupon {
        record_redemption(state, snapshot.code.clone());
    }

    state.metrics.orders_created_total.inc();
    state.publish(OrderEvent::from_order(OrderEventKind::Created, &order, now));
    info!(
        order_id = %order.order_id,
        user_id = %owner_id,
        total = order.pricing.total,
        coupon = order.coupon.as_ref().map(|c| c.code.as_str()).unwrap_or("none"),
        "order created"
    );

    Ok(order)
}

fn not_found(order_id: &str) -> AppError {
    AppError::NotFound(format!("order {order_id} not found"))
}

/// Explains why an acceptance guard did not hold against `current`.
fn acceptance_failure(current: &DeliveryOrder, now: DateTime<Utc>) -> AppError {
    let order_id = &current.order_id;

    match (current.status, current.driver_id) {
        (OrderStatus::Pending, None) if current.is_expired_at(now) => {
            AppError::Expired(format!("order {order_id} is no longer assignable"))
        }
        (OrderStatus::Pending, None) if current.payment_status != PaymentStatus::Paid => {
            AppError::PaymentRequired(format!("order {order_id} has not been paid"))
        }
        (OrderStatus::Cancelled, None)
            if current.cancellation_reason == Some(CancellationReason::Expired) =>
        {
            AppError::Expired(format!("order {order_id} expired before it was accepted"))
        }
        _ => AppError::Conflict(format!("order {order_id} is no longer available")),
    }
}

/// Assigns a paid, pending, unexpired order to the calling driver.
/// Exactly one of any number of racing drivers succeeds.
pub async fn accept_order(
    state: &AppState,
    order_id: &str,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder, AppError> {
    if !actor.is_driver() {
        return Err(AppError::Forbidden("only drivers can accept orders".to_string()));
    }

    let guard = OrderGuard::status(OrderStatus::Pending)
        .driver(DriverGuard::Unset)
        .payment(PaymentStatus::Paid)
        .live_at(now);
    let change = OrderChange::Assign {
        driver_id: actor.id,
        at: now,
    };

    let outcome = state.orders.update_where(order_id, &guard, &change).await?;
    let result = match outcome {
        CasOutcome::Applied(order) => Ok(order),
        CasOutcome::Rejected(current) => Err(acceptance_failure(&current, now)),
        CasOutcome::Missing => Err(not_found(order_id)),
    };

    let label = match &result {
        Ok(_) => "success",
        Err(err) => err.code(),
    };
    state
        .metrics
        .accept_attempts_total
        .with_label_values(&[label])
        .inc();

    match result {
        Ok(order) => {
            state.publish(OrderEvent::from_order(OrderEventKind::Assigned, &order, now));
            info!(order_id = %order.order_id, driver_id = %actor.id, "order assigned");
            Ok(order)
        }
        Err(err) => {
            warn!(order_id, driver_id = %actor.id, error = %err, "order acceptance rejected");
            Err(err)
        }
    }
}

fn check_driver_transition(
    current: &DeliveryOrder,
    driver_id: Uuid,
    requested: OrderStatus,
) -> Result<(), AppError> {
    let not_yours = || {
        AppError::Forbidden(format!(
            "order {} is not assigned to this driver",
            current.order_id
        ))
    };

    // Another driver's order is off limits; an unowned one is judged by the table.
    if current.driver_id.is_some_and(|owner| owner != driver_id) {
        return Err(not_yours());
    }
    if !current.status.driver_can_move_to(requested) {
        return Err(AppError::InvalidTransition {
            current: current.status,
            requested,
        });
    }
    if current.driver_id.is_none() {
        return Err(not_yours());
    }
    Ok(())
}

/// Moves an order the calling driver owns one step along its lifecycle.
pub async fn update_order_status(
    state: &AppState,
    order_id: &str,
    actor: Actor,
    requested: OrderStatus,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder, AppError> {
    if !actor.is_driver() {
        return Err(AppError::Forbidden("only drivers can update order status".to_string()));
    }

    let mut current = state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| not_found(order_id))?;

    let change = if requested == OrderStatus::Cancelled {
        OrderChange::Cancel {
            reason: CancellationReason::Driver,
            at: now,
        }
    } else {
        OrderChange::Advance { to: requested, at: now }
    };

    for _ in 0..MAX_STATUS_ATTEMPTS {
        check_driver_transition(&current, actor.id, requested)?;

        let guard = OrderGuard::status(current.status).driver(DriverGuard::Is(actor.id));
        match state.orders.update_where(order_id, &guard, &change).await? {
            CasOutcome::Applied(order) => {
                let kind = if requested == OrderStatus::Cancelled {
                    OrderEventKind::Cancelled
                } else {
                    OrderEventKind::StatusChanged
                };
                state.publish(OrderEvent::from_order(kind, &order, now));
                info!(
                    order_id,
                    driver_id = %actor.id,
                    from = %current.status,
                    to = %requested,
                    "order status updated"
                );
                return Ok(order);
            }
            CasOutcome::Rejected(fresh) => current = fresh,
            CasOutcome::Missing => return Err(not_found(order_id)),
        }
    }

    Err(AppError::Conflict(format!(
        "order {order_id} kept changing; refresh and retry"
    )))
}

/// Lets the owner (or an admin) withdraw an order nobody has accepted yet.
pub async fn cancel_order(
    state: &AppState,
    order_id: &str,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder, AppError> {
    let current = state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| not_found(order_id))?;

    if current.user_id != actor.id && !actor.is_admin() {
        return Err(AppError::Forbidden(format!(
            "order {order_id} belongs to another customer"
        )));
    }

    let guard = OrderGuard::status(OrderStatus::Pending).driver(DriverGuard::Unset);
    let change = OrderChange::Cancel {
        reason: CancellationReason::Customer,
        at: now,
    };

    match state.orders.update_where(order_id, &guard, &change).await? {
        CasOutcome::Applied(order) => {
            state.publish(OrderEvent::from_order(OrderEventKind::Cancelled, &order, now));
            info!(order_id, user_id = %actor.id, "order cancelled by customer");
            Ok(order)
        }
        CasOutcome::Rejected(fresh) => Err(AppError::InvalidTransition {
            current: fresh.status,
            requested: OrderStatus::Cancelled,
        }),
        CasOutcome::Missing => Err(not_found(order_id)),
    }
}

/// Applies a payment outcome reported by the payment collaborator.
pub async fn record_payment(
    state: &AppState,
    order_id: &str,
    payment: PaymentStatus,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder, AppError> {
    let current = state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| not_found(order_id))?;

    if !current.payment_status.can_move_to(payment) {
        return Err(AppError::Validation(format!(
            "payment status cannot move from {:?} to {:?}",
            current.payment_status, payment
        )));
    }
    if payment == PaymentStatus::Paid && current.status == OrderStatus::Cancelled {
        return Err(AppError::Validation(format!(
            "order {order_id} is cancelled and cannot be paid"
        )));
    }

    let guard = OrderGuard::status(current.status).payment(current.payment_status);
    match state
        .orders
        .update_where(order_id, &guard, &OrderChange::Payment(payment))
        .await?
    {
        CasOutcome::Applied(order) => {
            state.publish(OrderEvent::from_order(OrderEventKind::PaymentChanged, &order, now));
            info!(order_id, payment_status = ?payment, "order payment recorded");
            Ok(order)
        }
        CasOutcome::Rejected(_) => Err(AppError::Conflict(format!(
            "order {order_id} changed while recording payment"
        ))),
        CasOutcome::Missing => Err(not_found(order_id)),
    }
}

pub async fn get_order(
    state: &AppState,
    order_id: &str,
    actor: Actor,
) -> Result<DeliveryOrder, AppError> {
    let order = state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| not_found(order_id))?;

    let visible = actor.is_admin()
        || order.user_id == actor.id
        || order.driver_id == Some(actor.id)
        || (actor.is_driver() && order.status == OrderStatus::Pending && order.driver_id.is_none());

    if visible {
        Ok(order)
    } else {
        Err(AppError::Forbidden(format!("order {order_id} is not visible to this user")))
    }
}

/// Orders a driver could accept right now, oldest first.
pub async fn list_available_orders(
    state: &AppState,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<Vec<DeliveryOrder>, AppError> {
    if !actor.is_driver() && !actor.is_admin() {
        return Err(AppError::Forbidden("only drivers can browse open orders".to_string()));
    }
    Ok(state.orders.list_assignable(now).await?)
}

pub async fn list_orders_for_user(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<DeliveryOrder>, AppError> {
    Ok(state.orders.list_by_user(user_id).await?)
}
