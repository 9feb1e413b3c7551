//! 客户实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::CustomerStatus;
use super::tenant::TenantScope;

/// 客户
///
/// customer_id 对外稳定不变，手机号存储为规范化后的形式
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub customer_id: String,
    pub phone_no: String,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == CustomerStatus::Active
    }
}
