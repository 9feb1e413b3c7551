//! 客户仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::CustomerRepositoryTrait;
use crate::error::Result;
use crate::models::{Customer, TenantScope};

pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepositoryTrait for CustomerRepository {
    async fn find_active_by_phone(
        &self,
        scope: TenantScope,
        phone_no: &str,
    ) -> Result<Option<Customer>> {
        // 同一手机号可能对应多个历史账号，取最新的有效账号
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, tenant_id, business_unit_id, customer_id, phone_no, status,
                   created_at, updated_at
            FROM customers
            WHERE tenant_id = $1 AND business_unit_id = $2 AND phone_no = $3 AND status = 'ACTIVE'
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .bind(phone_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn get(&self, scope: TenantScope, customer_id: &str) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, tenant_id, business_unit_id, customer_id, phone_no, status,
                   created_at, updated_at
            FROM customers
            WHERE tenant_id = $1 AND business_unit_id = $2 AND customer_id = $3
            "#,
        )
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }
}
