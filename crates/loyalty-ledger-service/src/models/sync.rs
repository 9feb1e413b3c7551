//! 批量同步日志与同步条目
//!
//! 每次批量运行生成一条 SyncLog，逐条记录成功与失败

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::enums::{SyncKind, SyncStatus};
use super::tenant::TenantScope;

/// 优惠券同步条目（外部系统上报的核销记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSyncItem {
    pub code: String,
    pub customer_phone_no: String,
    pub invoice_no: String,
    pub used_time: DateTime<Utc>,
}

/// 交易同步条目（外部系统上报的消费记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSyncItem {
    pub customer_phone_no: String,
    pub invoice_no: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    pub transaction_time: DateTime<Utc>,
}

/// 单条同步结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemResult {
    /// 条目在批次中的下标
    pub index: usize,
    /// 业务标识（发票号，缺失时为券码）
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
    #[serde(default)]
    pub replayed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SyncItemResult {
    pub fn success(index: usize, reference: String, activity_id: i64, replayed: bool) -> Self {
        Self {
            index,
            reference,
            activity_id: Some(activity_id),
            replayed,
            error_code: None,
            reason: None,
        }
    }

    pub fn failure(index: usize, reference: String, error_code: &str, reason: String) -> Self {
        Self {
            index,
            reference,
            activity_id: None,
            replayed: false,
            error_code: Some(error_code.to_string()),
            reason: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

/// 同步日志
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    pub id: i64,
    /// 作用域无法解析时为空
    #[sqlx(default)]
    pub tenant_id: Option<i64>,
    #[sqlx(default)]
    pub business_unit_id: Option<i64>,
    pub kind: SyncKind,
    pub status: SyncStatus,
    pub total_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    pub success_items: Json<Vec<SyncItemResult>>,
    pub failed_items: Json<Vec<SyncItemResult>>,
    #[sqlx(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncLog {
    pub fn scope(&self) -> Option<TenantScope> {
        match (self.tenant_id, self.business_unit_id) {
            (Some(t), Some(b)) => Some(TenantScope::new(t, b)),
            _ => None,
        }
    }

    /// 已完成的批次满足 成功 + 失败 == 总数
    pub fn is_balanced(&self) -> bool {
        self.success_count + self.failed_count == self.total_count
    }
}

/// 新建同步日志
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncLog {
    pub scope: Option<TenantScope>,
    pub kind: SyncKind,
    pub total_count: i32,
}
