//! 优惠券状态仓储
//!
//! 状态迁移使用带条件的 `UPDATE ... WHERE status IN (...)`：
//! 两个不同订单并发核销同一张券，只有一个能更新成功。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::activity_repo::ActivityRepository;
use super::catalog_repo::COUPON_COLUMNS;
use super::traits::{AppendOutcome, CouponRepositoryTrait};
use crate::error::{LedgerError, Result};
use crate::models::{Coupon, CouponStatus, NewActivity, TenantScope};

pub struct CouponRepository {
    pool: PgPool,
}

impl CouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_in_tx(
        conn: &mut PgConnection,
        scope: TenantScope,
        coupon_id: Uuid,
    ) -> Result<Option<Coupon>> {
        let sql = format!(
            "SELECT {COUPON_COLUMNS} FROM coupons \
             WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3"
        );
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(coupon_id)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .fetch_optional(conn)
            .await?;
        Ok(coupon)
    }

    /// 写入优惠券状态审计
    pub async fn log_status_in_tx(
        conn: &mut PgConnection,
        coupon_id: Uuid,
        from: CouponStatus,
        to: CouponStatus,
        order_id: Option<&str>,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_status_logs
                (coupon_id, from_status, to_status, order_id, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(coupon_id)
        .bind(from)
        .bind(to)
        .bind(order_id)
        .bind(reason)
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// 条件更新失败后，根据券的当前状态给出确切原因
pub(crate) fn classify_unavailable(
    coupon: &Coupon,
    order_id: &str,
    now: DateTime<Utc>,
) -> LedgerError {
    let code = coupon.code.clone();
    match coupon.status {
        CouponStatus::Redeemed => LedgerError::CouponAlreadyRedeemed { code },
        CouponStatus::Expired => LedgerError::CouponExpired { code },
        _ if coupon.is_past_expiry(now) => LedgerError::CouponExpired { code },
        CouponStatus::Reserved if coupon.reserved_order_id.as_deref() != Some(order_id) => {
            LedgerError::CouponReserved { code }
        }
        _ => LedgerError::Internal(format!("优惠券状态异常: {}", coupon.code)),
    }
}

#[async_trait]
impl CouponRepositoryTrait for CouponRepository {
    async fn redeem(
        &self,
        scope: TenantScope,
        coupon_id: Uuid,
        order_id: &str,
        activity: &NewActivity,
    ) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let updated: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE coupons
            SET status = 'REDEEMED', redeemed_order_id = $4, redeemed_at = $5, updated_at = $5
            WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3
              AND (status = 'ISSUED' OR (status = 'RESERVED' AND reserved_order_id = $4))
              AND (expires_at IS NULL OR expires_at > $5)
            RETURNING reserved_order_id
            "#,
        )
        .bind(coupon_id)
        .bind(scope.tenant_id)
        .bind(scope.business_unit_id)
        .bind(order_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((reserved_order_id,)) = updated else {
            let coupon = Self::get_in_tx(&mut tx, scope, coupon_id)
                .await?
                .ok_or_else(|| LedgerError::RuleNotApplicable(format!("coupon {}", coupon_id)))?;

            // 同一订单的并发重复请求：读回赢家写入的流水
            if coupon.status == CouponStatus::Redeemed
                && coupon.redeemed_order_id.as_deref() == Some(order_id)
                && let Some(key) = activity.idempotency_key()
                && let Some(existing) = ActivityRepository::find_by_key_in_tx(&mut tx, &key).await?
            {
                tx.commit().await?;
                return Ok(AppendOutcome::Existing(existing));
            }

            tx.rollback().await?;
            return Err(classify_unavailable(&coupon, order_id, now));
        };

        let from = if reserved_order_id.is_some() {
            CouponStatus::Reserved
        } else {
            CouponStatus::Issued
        };
        Self::log_status_in_tx(
            &mut tx,
            coupon_id,
            from,
            CouponStatus::Redeemed,
            Some(order_id),
            "redeem",
        )
        .await?;

        let outcome = ActivityRepository::insert_or_existing(&mut tx, activity).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn reserve(&self, scope: TenantScope, coupon_id: Uuid, order_id: &str) -> Result<Coupon> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let sql = format!(
            r#"
            UPDATE coupons
            SET status = 'RESERVED', reserved_order_id = $4, updated_at = $5
            WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3
              AND status = 'ISSUED'
              AND (expires_at IS NULL OR expires_at > $5)
            RETURNING {COUPON_COLUMNS}
            "#
        );
        let reserved = sqlx::query_as::<_, Coupon>(&sql)
            .bind(coupon_id)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .bind(order_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(coupon) = reserved {
            Self::log_status_in_tx(
                &mut tx,
                coupon_id,
                CouponStatus::Issued,
                CouponStatus::Reserved,
                Some(order_id),
                "reserve",
            )
            .await?;
            tx.commit().await?;
            return Ok(coupon);
        }

        let coupon = Self::get_in_tx(&mut tx, scope, coupon_id)
            .await?
            .ok_or_else(|| LedgerError::RuleNotApplicable(format!("coupon {}", coupon_id)))?;
        tx.rollback().await?;

        if coupon.status == CouponStatus::Reserved
            && coupon.reserved_order_id.as_deref() == Some(order_id)
            && !coupon.is_past_expiry(now)
        {
            return Ok(coupon);
        }

        Err(classify_unavailable(&coupon, order_id, now))
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED 允许多实例并行处理而不互相阻塞
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            WITH due AS (
                SELECT id FROM coupons
                WHERE status = 'ISSUED' AND expires_at IS NOT NULL AND expires_at <= $1
                ORDER BY expires_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE coupons c
            SET status = 'EXPIRED', updated_at = $1
            FROM due
            WHERE c.id = due.id
            RETURNING c.id
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        for (coupon_id,) in &expired {
            Self::log_status_in_tx(
                &mut tx,
                *coupon_id,
                CouponStatus::Issued,
                CouponStatus::Expired,
                None,
                "expired",
            )
            .await?;
        }

        tx.commit().await?;

        let count = expired.len() as u64;
        if count > 0 {
            info!(count, "优惠券过期处理完成");
        }
        Ok(count)
    }
}
