//! 短信审计与 OTP 实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::SmsStatus;
use super::tenant::TenantScope;

/// 短信发送审计记录
///
/// 每次发送尝试都会落库，请求体中的验证码已打码
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SmsLog {
    pub id: i64,
    pub phone_no: String,
    pub language_code: String,
    pub provider: String,
    pub request_payload: Value,
    #[sqlx(default)]
    pub response_payload: Option<Value>,
    pub status: SmsStatus,
    #[sqlx(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSmsLog {
    pub phone_no: String,
    pub language_code: String,
    pub provider: String,
    pub request_payload: Value,
    pub response_payload: Option<Value>,
    pub status: SmsStatus,
    pub error_message: Option<String>,
}

/// OTP 记录，只保存验证码的 sha256 摘要
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OtpCode {
    pub id: i64,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub phone_no: String,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOtpCode {
    pub scope: TenantScope,
    pub phone_no: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}
