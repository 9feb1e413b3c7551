//! 统一基础设施错误
//!
//! 定义连接池、配置加载等共享基础设施可能产生的错误，业务错误由各服务自行定义。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum InfraError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 外部服务错误 ====================
    #[error("外部服务超时: {service}")]
    Timeout { service: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, InfraError>;

impl InfraError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => is_transient_sqlx_error(e),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// 判断 sqlx 错误是否为瞬时故障
///
/// 连接池耗尽、IO 中断、连接被服务端关闭等可通过重试恢复；
/// 约束冲突、行不存在、解码失败属于确定性错误，重试没有意义。
pub fn is_transient_sqlx_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            // 40001 serialization_failure / 40P01 deadlock_detected / 57P01 admin_shutdown
            matches!(
                db_err.code().as_deref(),
                Some("40001") | Some("40P01") | Some("57P01")
            )
        }
        _ => false,
    }
}
