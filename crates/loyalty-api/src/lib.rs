//! 积分账本 HTTP 服务
//!
//! 在账本服务之上提供 REST API：
//!
//! - 请求按 Host 子域名（其次 `x-tenant-id` 请求头）解析租户作用域
//! - 请求体在进入账本前按类型校验
//! - 账本错误映射为 HTTP 状态码与统一响应体 `{success, code, message, data}`
//! - 后台任务定期处理过期优惠券

pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::{ApiError, Result};
pub use routes::app;
pub use state::{AppState, Repositories};
