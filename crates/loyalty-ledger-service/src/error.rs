//! 账本服务错误类型
//!
//! 区分业务错误（不可重试，直接反馈给调用方）与系统错误（瞬时故障可重试一次）

use rust_decimal::Decimal;
use thiserror::Error;

/// 账本服务错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // === 作用域 ===
    #[error("无法解析租户作用域")]
    UnauthorizedScope,

    // === 规则与优惠券 ===
    /// 规则、活动、事件或优惠券在当前作用域内不存在或不适用
    #[error("没有可适用的规则: {0}")]
    RuleNotApplicable(String),

    #[error("积分余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("优惠券已被使用: {code}")]
    CouponAlreadyRedeemed { code: String },

    #[error("优惠券已过期: {code}")]
    CouponExpired { code: String },

    #[error("优惠券已被其他订单预留: {code}")]
    CouponReserved { code: String },

    // === 查询 ===
    #[error("客户不存在: {0}")]
    CustomerNotFound(String),

    #[error("同步日志不存在: {0}")]
    SyncLogNotFound(i64),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("账本暂时不可用，请稍后重试")]
    LedgerUnavailable,

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 账本服务 Result 类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// 检查是否为可重试的错误
    ///
    /// 只有瞬时的持久化故障（连接池耗尽、序列化冲突、死锁等）可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => loyalty_shared::error::is_transient_sqlx_error(e),
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Internal(_)
                | Self::LedgerUnavailable
        )
    }

    /// 获取错误码（用于 API 响应和同步日志）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnauthorizedScope => "UNAUTHORIZED_SCOPE",
            Self::RuleNotApplicable(_) => "RULE_NOT_APPLICABLE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::CouponAlreadyRedeemed { .. } => "COUPON_ALREADY_REDEEMED",
            Self::CouponExpired { .. } => "COUPON_EXPIRED",
            Self::CouponReserved { .. } => "COUPON_RESERVED",
            Self::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            Self::SyncLogNotFound(_) => "SYNC_LOG_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 重试耗尽后的最终错误：仍属瞬时故障的统一映射为 LedgerUnavailable
    pub fn into_terminal(self) -> Self {
        if self.is_retryable() {
            Self::LedgerUnavailable
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(LedgerError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!LedgerError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!LedgerError::RuleNotApplicable("rule 1".into()).is_retryable());
        assert!(!LedgerError::LedgerUnavailable.is_retryable());
    }

    #[test]
    fn test_error_is_business_error() {
        assert!(LedgerError::UnauthorizedScope.is_business_error());
        assert!(
            LedgerError::InsufficientBalance {
                required: dec("50"),
                available: dec("30"),
            }
            .is_business_error()
        );
        assert!(!LedgerError::LedgerUnavailable.is_business_error());
        assert!(!LedgerError::Internal("boom".into()).is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            LedgerError::CouponAlreadyRedeemed { code: "A".into() }.error_code(),
            "COUPON_ALREADY_REDEEMED"
        );
        assert_eq!(
            LedgerError::RuleNotApplicable("x".into()).error_code(),
            "RULE_NOT_APPLICABLE"
        );
        assert_eq!(LedgerError::LedgerUnavailable.error_code(), "LEDGER_UNAVAILABLE");
    }

    #[test]
    fn test_into_terminal_maps_transient_only() {
        let err = LedgerError::Database(sqlx::Error::PoolTimedOut).into_terminal();
        assert!(matches!(err, LedgerError::LedgerUnavailable));

        let err = LedgerError::CouponExpired { code: "B".into() }.into_terminal();
        assert!(matches!(err, LedgerError::CouponExpired { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientBalance {
            required: dec("50.00"),
            available: dec("30.00"),
        };
        assert!(err.to_string().contains("50.00"));
        assert!(err.to_string().contains("30.00"));
    }
}
