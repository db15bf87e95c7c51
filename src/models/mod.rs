pub mod actor;
pub mod coupon;
pub mod event;
pub mod geo;
pub mod order;
pub mod pricing;
