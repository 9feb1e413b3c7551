//! 积分流水仓储
//!
//! 流水只追加。幂等由部分唯一索引 `uq_activities_idempotency` 保证：
//! 并发写入同一幂等键时，输家读到赢家的记录。

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use super::traits::{ActivityRepositoryTrait, AppendOutcome};
use crate::error::{LedgerError, Result};
use crate::models::{ActivityFilter, CustomerActivity, IdempotencyKey, NewActivity, TenantScope};

const ACTIVITY_COLUMNS: &str = r#"
    id, tenant_id, business_unit_id, customer_id, campaign_id, coupon_id, rule_id, rule_name,
    order_id, target_ref, amount, activity_type, meta, created_at
"#;

pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中写入流水
    ///
    /// 幂等键冲突时返回 None，由调用方读取已有记录
    pub async fn insert_in_tx(
        conn: &mut PgConnection,
        activity: &NewActivity,
    ) -> Result<Option<CustomerActivity>> {
        let sql = format!(
            r#"
            INSERT INTO customer_activities
                (tenant_id, business_unit_id, customer_id, campaign_id, coupon_id, rule_id,
                 rule_name, order_id, target_ref, amount, activity_type, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (tenant_id, business_unit_id, customer_id, order_id, target_ref)
                WHERE order_id IS NOT NULL
                DO NOTHING
            RETURNING {ACTIVITY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, CustomerActivity>(&sql)
            .bind(activity.scope.tenant_id)
            .bind(activity.scope.business_unit_id)
            .bind(&activity.customer_id)
            .bind(activity.campaign_id)
            .bind(activity.coupon_id)
            .bind(activity.rule_id)
            .bind(&activity.rule_name)
            .bind(&activity.order_id)
            .bind(&activity.target_ref)
            .bind(activity.amount)
            .bind(activity.activity_type)
            .bind(&activity.meta)
            .fetch_optional(conn)
            .await?;

        Ok(row)
    }

    /// 在事务中按幂等键查询
    pub async fn find_by_key_in_tx(
        conn: &mut PgConnection,
        key: &IdempotencyKey,
    ) -> Result<Option<CustomerActivity>> {
        let sql = format!(
            r#"
            SELECT {ACTIVITY_COLUMNS} FROM customer_activities
            WHERE tenant_id = $1 AND business_unit_id = $2 AND customer_id = $3
              AND order_id = $4 AND target_ref = $5
            "#
        );

        let row = sqlx::query_as::<_, CustomerActivity>(&sql)
            .bind(key.scope.tenant_id)
            .bind(key.scope.business_unit_id)
            .bind(&key.customer_id)
            .bind(&key.order_id)
            .bind(&key.target_ref)
            .fetch_optional(conn)
            .await?;

        Ok(row)
    }

    /// 在事务中计算余额
    pub async fn balance_in_tx(
        conn: &mut PgConnection,
        scope: TenantScope,
        customer_id: &str,
    ) -> Result<Decimal> {
        let balance: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM customer_activities
            WHERE tenant_id = $1 AND business_unit_id = $2 AND customer_id = $3
            "#,
        )
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .bind(customer_id)
        .fetch_one(conn)
        .await?;

        Ok(balance)
    }

    /// 获取客户级事务锁，事务结束自动释放
    pub async fn lock_customer_in_tx(
        conn: &mut PgConnection,
        scope: TenantScope,
        customer_id: &str,
    ) -> Result<()> {
        let lock_key = format!("{}:{}:{}", scope.tenant_id, scope.business_unit_id, customer_id);
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(lock_key)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// 写入后若发生冲突则读回赢家记录
    pub(crate) async fn insert_or_existing(
        conn: &mut PgConnection,
        activity: &NewActivity,
    ) -> Result<AppendOutcome> {
        if let Some(created) = Self::insert_in_tx(&mut *conn, activity).await? {
            return Ok(AppendOutcome::Created(created));
        }

        let key = activity
            .idempotency_key()
            .ok_or_else(|| LedgerError::Internal("无订单号的流水不应发生冲突".to_string()))?;
        Self::find_by_key_in_tx(conn, &key)
            .await?
            .map(AppendOutcome::Existing)
            .ok_or_else(|| LedgerError::Internal("幂等冲突后未找到已有流水".to_string()))
    }
}

#[async_trait]
impl ActivityRepositoryTrait for ActivityRepository {
    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<CustomerActivity>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_key_in_tx(&mut conn, key).await
    }

    async fn append(&self, activity: &NewActivity) -> Result<AppendOutcome> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_or_existing(&mut conn, activity).await
    }

    async fn append_debit(&self, activity: &NewActivity) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        Self::lock_customer_in_tx(&mut tx, activity.scope, &activity.customer_id).await?;

        // 锁内再查一次幂等键，避免重复扣减
        if let Some(key) = activity.idempotency_key()
            && let Some(existing) = Self::find_by_key_in_tx(&mut tx, &key).await?
        {
            tx.commit().await?;
            return Ok(AppendOutcome::Existing(existing));
        }

        let available =
            Self::balance_in_tx(&mut tx, activity.scope, &activity.customer_id).await?;
        let required = -activity.amount;
        if available < required {
            tx.rollback().await?;
            return Err(LedgerError::InsufficientBalance {
                required,
                available,
            });
        }

        let outcome = Self::insert_or_existing(&mut tx, activity).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn balance(&self, scope: TenantScope, customer_id: &str) -> Result<Decimal> {
        let mut conn = self.pool.acquire().await?;
        Self::balance_in_tx(&mut conn, scope, customer_id).await
    }

    async fn list(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CustomerActivity>> {
        let sql = format!(
            r#"
            SELECT {ACTIVITY_COLUMNS} FROM customer_activities
            WHERE tenant_id = $1 AND business_unit_id = $2 AND customer_id = $3
              AND ($4::varchar IS NULL OR activity_type = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at < $6)
            ORDER BY created_at DESC, id DESC
            LIMIT $7 OFFSET $8
            "#
        );

        let rows = sqlx::query_as::<_, CustomerActivity>(&sql)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .bind(customer_id)
            .bind(filter.activity_type)
            .bind(filter.from)
            .bind(filter.to)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
    ) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM customer_activities
            WHERE tenant_id = $1 AND business_unit_id = $2 AND customer_id = $3
              AND ($4::varchar IS NULL OR activity_type = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at < $6)
            "#,
        )
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .bind(customer_id)
        .bind(filter.activity_type)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
