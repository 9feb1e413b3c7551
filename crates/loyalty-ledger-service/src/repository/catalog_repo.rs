//! 目录仓储
//!
//! 活动、规则、优惠券的只读查询，所有查询都带 tenant_id + business_unit_id 条件

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::CatalogRepositoryTrait;
use crate::error::Result;
use crate::models::{Campaign, Coupon, Rule, RuleDirection, TenantScope};

const RULE_COLUMNS: &str = r#"
    id, campaign_id, tenant_id, business_unit_id, name, direction, event_name,
    reward_kind, reward_value, min_order_amount, enabled, created_at
"#;

pub(crate) const COUPON_COLUMNS: &str = r#"
    id, tenant_id, business_unit_id, code, coupon_type, status, customer_id, campaign_id,
    face_value, expires_at, reserved_order_id, redeemed_order_id, redeemed_at,
    created_at, updated_at
"#;

pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepositoryTrait for CatalogRepository {
    async fn get_rule(&self, scope: TenantScope, rule_id: i64) -> Result<Option<Rule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules \
             WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3"
        );
        let rule = sqlx::query_as::<_, Rule>(&sql)
            .bind(rule_id)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(rule)
    }

    async fn get_campaign(
        &self,
        scope: TenantScope,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, tenant_id, business_unit_id, name, campaign_type, status,
                   starts_at, ends_at, created_at
            FROM campaigns
            WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3
            "#,
        )
        .bind(campaign_id)
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(campaign)
    }

    async fn list_campaign_rules(
        &self,
        scope: TenantScope,
        campaign_id: Uuid,
        direction: RuleDirection,
    ) -> Result<Vec<Rule>> {
        let sql = format!(
            r#"
            SELECT {RULE_COLUMNS} FROM rules
            WHERE campaign_id = $1 AND tenant_id = $2 AND business_unit_id = $3 AND direction = $4
            ORDER BY id
            "#
        );
        let rules = sqlx::query_as::<_, Rule>(&sql)
            .bind(campaign_id)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .bind(direction)
            .fetch_all(&self.pool)
            .await?;

        Ok(rules)
    }

    async fn list_rules_by_event(&self, scope: TenantScope, event_name: &str) -> Result<Vec<Rule>> {
        let sql = format!(
            r#"
            SELECT {RULE_COLUMNS} FROM rules
            WHERE event_name = $1 AND tenant_id = $2 AND business_unit_id = $3
            ORDER BY id
            "#
        );
        let rules = sqlx::query_as::<_, Rule>(&sql)
            .bind(event_name)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rules)
    }

    async fn find_coupon(&self, scope: TenantScope, code: &str) -> Result<Option<Coupon>> {
        let sql = format!(
            "SELECT {COUPON_COLUMNS} FROM coupons \
             WHERE code = $1 AND tenant_id = $2 AND business_unit_id = $3"
        );
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(code)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(coupon)
    }
}
