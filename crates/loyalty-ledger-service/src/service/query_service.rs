//! 客户流水与同步日志查询
//!
//! 余额从不存储，每次都按流水带符号金额求和。

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use super::dto::{BalanceDto, MAX_PAGE, Page, Pagination};
use crate::error::{LedgerError, Result};
use crate::models::{ActivityFilter, CustomerActivity, SyncLog, TenantScope};
use crate::repository::{ActivityRepositoryTrait, SyncLogRepositoryTrait};
use crate::validation;

pub struct QueryService {
    activities: Arc<dyn ActivityRepositoryTrait>,
    sync_logs: Arc<dyn SyncLogRepositoryTrait>,
}

impl QueryService {
    pub fn new(
        activities: Arc<dyn ActivityRepositoryTrait>,
        sync_logs: Arc<dyn SyncLogRepositoryTrait>,
    ) -> Self {
        Self {
            activities,
            sync_logs,
        }
    }

    /// 分页查询客户流水，最新的在前
    #[instrument(
        skip_all,
        fields(scope = %scope, customer_id = %customer_id, page = pagination.page)
    )]
    pub async fn list_activities(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
        pagination: Pagination,
    ) -> Result<Page<CustomerActivity>> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        if let (Some(from), Some(to)) = (filter.from, filter.to)
            && from > to
        {
            return Err(LedgerError::Validation("from 不能晚于 to".to_string()));
        }
        if pagination.is_out_of_range() {
            return Err(LedgerError::Validation(format!("page 不能超过 {}", MAX_PAGE)));
        }

        let total = self.activities.count(scope, customer_id, filter).await?;
        let items = if total == 0 {
            Vec::new()
        } else {
            self.activities
                .list(scope, customer_id, filter, pagination.limit(), pagination.offset())
                .await?
        };

        Ok(Page::new(items, total, pagination))
    }

    pub async fn balance(&self, scope: TenantScope, customer_id: &str) -> Result<BalanceDto> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        let balance: Decimal = self.activities.balance(scope, customer_id).await?;
        Ok(BalanceDto {
            customer_id: customer_id.to_string(),
            balance,
        })
    }

    /// 同步日志只在所属作用域内可见
    pub async fn get_sync_log(&self, scope: TenantScope, id: i64) -> Result<SyncLog> {
        self.sync_logs
            .get(scope, id)
            .await?
            .ok_or(LedgerError::SyncLogNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MockActivityRepositoryTrait, MockSyncLogRepositoryTrait};
    use chrono::{Duration, Utc};

    fn scope() -> TenantScope {
        TenantScope::new(1, 1)
    }

    #[tokio::test]
    async fn test_empty_history_skips_list() {
        let mut activities = MockActivityRepositoryTrait::new();
        activities.expect_count().returning(|_, _, _| Ok(0));
        activities.expect_list().never();

        let service = QueryService::new(
            Arc::new(activities),
            Arc::new(MockSyncLogRepositoryTrait::new()),
        );
        let page = service
            .list_activities(scope(), "c-1", &ActivityFilter::default(), Pagination::default())
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped_before_listing() {
        let mut activities = MockActivityRepositoryTrait::new();
        activities.expect_count().returning(|_, _, _| Ok(250));
        activities
            .expect_list()
            .withf(|_, cid, _, limit, offset| cid == "c-1" && *limit == 100 && *offset == 100)
            .returning(|_, _, _, _, _| Ok(vec![]));

        let service = QueryService::new(
            Arc::new(activities),
            Arc::new(MockSyncLogRepositoryTrait::new()),
        );
        let page = service
            .list_activities(scope(), " c-1 ", &ActivityFilter::default(), Pagination::new(2, 1000))
            .await
            .unwrap();

        assert_eq!(page.page_size, 100);
        assert_eq!(page.total_pages, 3);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let service = QueryService::new(
            Arc::new(MockActivityRepositoryTrait::new()),
            Arc::new(MockSyncLogRepositoryTrait::new()),
        );
        let now = Utc::now();
        let filter = ActivityFilter {
            activity_type: None,
            from: Some(now),
            to: Some(now - Duration::days(1)),
        };

        let result = service
            .list_activities(scope(), "c-1", &filter, Pagination::default())
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_page_beyond_limit_is_rejected_before_querying() {
        let mut activities = MockActivityRepositoryTrait::new();
        activities.expect_count().never();
        activities.expect_list().never();

        let service = QueryService::new(
            Arc::new(activities),
            Arc::new(MockSyncLogRepositoryTrait::new()),
        );
        let result = service
            .list_activities(
                scope(),
                "c-1",
                &ActivityFilter::default(),
                Pagination::new(i64::MAX, 100),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_last_allowed_page_uses_bounded_offset() {
        let mut activities = MockActivityRepositoryTrait::new();
        activities.expect_count().returning(|_, _, _| Ok(1));
        activities
            .expect_list()
            .withf(|_, _, _, limit, offset| *limit == 100 && *offset == (MAX_PAGE - 1) * 100)
            .returning(|_, _, _, _, _| Ok(vec![]));

        let service = QueryService::new(
            Arc::new(activities),
            Arc::new(MockSyncLogRepositoryTrait::new()),
        );
        let page = service
            .list_activities(
                scope(),
                "c-1",
                &ActivityFilter::default(),
                Pagination::new(MAX_PAGE, 100),
            )
            .await
            .unwrap();
        assert_eq!(page.page, MAX_PAGE);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_sync_log() {
        let mut sync_logs = MockSyncLogRepositoryTrait::new();
        sync_logs.expect_get().returning(|_, _| Ok(None));

        let service =
            QueryService::new(Arc::new(MockActivityRepositoryTrait::new()), Arc::new(sync_logs));
        let result = service.get_sync_log(scope(), 42).await;
        assert!(matches!(result, Err(LedgerError::SyncLogNotFound(42))));
    }
}
