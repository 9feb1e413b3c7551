//! 同步日志仓储
//!
//! 单条结果通过原子 UPDATE 追加到 JSONB 数组，计数只增不减

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;

use super::traits::SyncLogRepositoryTrait;
use crate::error::{LedgerError, Result};
use crate::models::{NewSyncLog, SyncItemResult, SyncLog, TenantScope};

const SYNC_LOG_COLUMNS: &str = r#"
    id, tenant_id, business_unit_id, kind, status, total_count, success_count, failed_count,
    success_items, failed_items, error_message, created_at, completed_at
"#;

pub struct SyncLogRepository {
    pool: PgPool,
}

impl SyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogRepositoryTrait for SyncLogRepository {
    async fn create(&self, log: &NewSyncLog) -> Result<SyncLog> {
        let sql = format!(
            r#"
            INSERT INTO sync_logs
                (tenant_id, business_unit_id, kind, status, total_count, created_at)
            VALUES ($1, $2, $3, 'pending', $4, NOW())
            RETURNING {SYNC_LOG_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, SyncLog>(&sql)
            .bind(log.scope.map(|s| s.tenant_id))
            .bind(log.scope.map(|s| s.business_unit_id))
            .bind(log.kind)
            .bind(log.total_count)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn record_item(&self, id: i64, item: &SyncItemResult) -> Result<()> {
        let sql = if item.is_success() {
            r#"
            UPDATE sync_logs
            SET success_count = success_count + 1,
                success_items = success_items || jsonb_build_array($2::jsonb)
            WHERE id = $1 AND status = 'pending'
            "#
        } else {
            r#"
            UPDATE sync_logs
            SET failed_count = failed_count + 1,
                failed_items = failed_items || jsonb_build_array($2::jsonb)
            WHERE id = $1 AND status = 'pending'
            "#
        };

        let result = sqlx::query(sql)
            .bind(id)
            .bind(Json(item))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::SyncLogNotFound(id));
        }
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<SyncLog> {
        let sql = format!(
            r#"
            UPDATE sync_logs
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1
            RETURNING {SYNC_LOG_COLUMNS}
            "#
        );
        sqlx::query_as::<_, SyncLog>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::SyncLogNotFound(id))
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<SyncLog> {
        let sql = format!(
            r#"
            UPDATE sync_logs
            SET status = 'failed', error_message = $2, completed_at = NOW()
            WHERE id = $1
            RETURNING {SYNC_LOG_COLUMNS}
            "#
        );
        sqlx::query_as::<_, SyncLog>(&sql)
            .bind(id)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::SyncLogNotFound(id))
    }

    async fn get(&self, scope: TenantScope, id: i64) -> Result<Option<SyncLog>> {
        let sql = format!(
            "SELECT {SYNC_LOG_COLUMNS} FROM sync_logs \
             WHERE id = $1 AND tenant_id = $2 AND business_unit_id = $3"
        );
        let log = sqlx::query_as::<_, SyncLog>(&sql)
            .bind(id)
            .bind(scope.tenant_id)
            .bind(scope.business_unit_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(log)
    }
}
