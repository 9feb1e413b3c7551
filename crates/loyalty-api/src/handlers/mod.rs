//! HTTP 请求处理器模块

pub mod coupon;
pub mod customer;
pub mod health;
pub mod ledger;
pub mod otp;
pub mod sync;
