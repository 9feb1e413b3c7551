//! 租户目录仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::TenantDirectoryTrait;
use crate::error::Result;
use crate::models::TenantRecord;

/// 基于 tenant_domains 表的租户目录
pub struct TenantDirectoryRepository {
    pool: PgPool,
}

impl TenantDirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectoryTrait for TenantDirectoryRepository {
    async fn resolve_by_domain(&self, label: &str) -> Result<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            r#"
            SELECT id, domain_label, tenant_id, business_unit_id, status, created_at
            FROM tenant_domains
            WHERE domain_label = $1
            "#,
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
