//! 后台任务

pub mod coupon_expiry;

pub use coupon_expiry::CouponExpiryWorker;
