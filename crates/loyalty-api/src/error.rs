//! API 错误类型定义
//!
//! 把账本错误映射为 HTTP 状态码与统一的错误响应体

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use loyalty_ledger::LedgerError;
use serde_json::json;

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 请求体或查询参数无法解析
    #[error("请求格式错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ledger(e) => match e {
                LedgerError::UnauthorizedScope => StatusCode::UNAUTHORIZED,
                LedgerError::RuleNotApplicable(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::InsufficientBalance { .. }
                | LedgerError::CouponAlreadyRedeemed { .. }
                | LedgerError::CouponExpired { .. }
                | LedgerError::CouponReserved { .. } => StatusCode::CONFLICT,
                LedgerError::CustomerNotFound(_) | LedgerError::SyncLogNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                LedgerError::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Database(_)
                | LedgerError::Serialization(_)
                | LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Ledger(e) => e.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Ledger(
                e @ (LedgerError::Database(_)
                | LedgerError::Serialization(_)
                | LedgerError::Internal(_)),
            ) => {
                tracing::error!(error = %e, code = e.error_code(), "账本系统错误");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Ledger(LedgerError::LedgerUnavailable) => {
                tracing::warn!("账本暂时不可用");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                LedgerError::UnauthorizedScope.into(),
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED_SCOPE",
            ),
            (
                LedgerError::RuleNotApplicable("rule:1".into()).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "RULE_NOT_APPLICABLE",
            ),
            (
                LedgerError::InsufficientBalance {
                    required: Decimal::new(5000, 2),
                    available: Decimal::new(3000, 2),
                }
                .into(),
                StatusCode::CONFLICT,
                "INSUFFICIENT_BALANCE",
            ),
            (
                LedgerError::CouponAlreadyRedeemed { code: "C1".into() }.into(),
                StatusCode::CONFLICT,
                "COUPON_ALREADY_REDEEMED",
            ),
            (
                LedgerError::CouponReserved { code: "C1".into() }.into(),
                StatusCode::CONFLICT,
                "COUPON_RESERVED",
            ),
            (
                LedgerError::SyncLogNotFound(3).into(),
                StatusCode::NOT_FOUND,
                "SYNC_LOG_NOT_FOUND",
            ),
            (
                LedgerError::Validation("amount".into()).into(),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                LedgerError::LedgerUnavailable.into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_UNAVAILABLE",
            ),
            (
                LedgerError::Internal("boom".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
            (
                ApiError::BadRequest("expected value".into()),
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{:?}", err);
            assert_eq!(err.error_code(), code);
        }
    }

    #[tokio::test]
    async fn test_system_error_message_is_generic() {
        let response = ApiError::from(LedgerError::Internal("connection string leaked".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["message"], "服务内部错误，请稍后重试");
        assert!(json["data"].is_null());
    }
}
