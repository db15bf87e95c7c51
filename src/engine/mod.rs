pub mod coupon;
pub mod fare;
pub mod orders;
pub mod quote;
pub mod sweep;
