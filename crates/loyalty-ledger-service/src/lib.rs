//! 多租户积分账本服务
//!
//! 按租户作用域记录客户的积分流水，余额由流水推导，从不单独存储。
//!
//! ## 核心功能
//!
//! - **租户解析**：子域名或请求头 → 租户目录 → `TenantScope`
//! - **积分累积与消耗**：按规则或活动计算奖励，每个 (客户, 订单, 规则) 只记一次
//! - **优惠券核销与预留**：同一张券只能被一个订单核销
//! - **批量同步**：外部系统上报的券核销与交易，逐条处理并记录批次日志
//! - **查询**：分页流水、余额、同步日志
//! - **验证码短信**：只存摘要，每次发送都有审计记录
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `validation`: 入参校验
//! - `repository`: PostgreSQL 与内存仓储
//! - `service`: 业务服务层
//! - `notification`: 客户通知与短信下发

pub mod error;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;
pub mod validation;

pub use error::{LedgerError, Result};
pub use models::*;
pub use notification::{NotificationSender, NotificationService, SmsDispatcher, TemplateEngine};
pub use repository::InMemoryBackend;
pub use service::{
    CatalogService, LedgerService, OtpService, QueryService, SyncReconciler, TenantResolver, dto,
};

/// 内嵌的数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
