//! 批量同步对账
//!
//! 外部系统批量上报已使用的优惠券（`reconcile`）和购买交易
//! （`reconcile_transactions`），逐条交给账本处理，每批写一条 `SyncLog`。
//!
//! - 条目之间相互独立，单条失败只记录在 `failed_items` 中
//! - 并发处理（`ledger.sync_concurrency`），结果按输入顺序记录
//! - 所有条目都尝试过后状态为 `completed`；批次无法开始时为 `failed`
//!   （作用域无法解析、空批次、超过 `ledger.max_batch_size`）
//! - 已处理过的 invoice_no 再次上报视为成功（`replayed = true`），不产生新流水

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::observability::metrics as app_metrics;
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use super::ledger_service::LedgerService;
use super::tenant_resolver::TenantResolver;
use crate::error::{LedgerError, Result};
use crate::models::{
    CouponSyncItem, Customer, LedgerReceipt, NewSyncLog, OrderSnapshot, RequestOrigin, RuleRef,
    SyncItemResult, SyncKind, SyncLog, TenantScope, TransactionSyncItem,
};
use crate::repository::{CustomerRepositoryTrait, SyncLogRepositoryTrait};
use crate::validation;

pub struct SyncReconciler {
    ledger: Arc<LedgerService>,
    customers: Arc<dyn CustomerRepositoryTrait>,
    sync_logs: Arc<dyn SyncLogRepositoryTrait>,
    resolver: Arc<TenantResolver>,
    concurrency: usize,
    max_batch_size: usize,
}

impl SyncReconciler {
    pub fn new(
        ledger: Arc<LedgerService>,
        customers: Arc<dyn CustomerRepositoryTrait>,
        sync_logs: Arc<dyn SyncLogRepositoryTrait>,
        resolver: Arc<TenantResolver>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            ledger,
            customers,
            sync_logs,
            resolver,
            concurrency: config.sync_concurrency.max(1),
            max_batch_size: config.max_batch_size,
        }
    }

    /// 优惠券同步：每条核销一张券，invoice_no 作为订单号
    #[instrument(skip_all, fields(scope = %scope, items = items.len()))]
    pub async fn reconcile(
        &self,
        scope: TenantScope,
        items: Vec<CouponSyncItem>,
    ) -> Result<SyncLog> {
        let started = self.start_batch(Some(scope), SyncKind::Coupon, items.len()).await?;
        let log = match started {
            BatchStart::Rejected(log) => return Ok(log),
            BatchStart::Ready(log) => log,
        };

        let results = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.reconcile_coupon_item(scope, index, item))
            .buffered(self.concurrency);

        self.finish_batch(log, results).await
    }

    /// 交易同步：每条按规则或活动累积积分
    #[instrument(skip_all, fields(scope = %scope, items = items.len()))]
    pub async fn reconcile_transactions(
        &self,
        scope: TenantScope,
        items: Vec<TransactionSyncItem>,
    ) -> Result<SyncLog> {
        let started = self
            .start_batch(Some(scope), SyncKind::Transaction, items.len())
            .await?;
        let log = match started {
            BatchStart::Rejected(log) => return Ok(log),
            BatchStart::Ready(log) => log,
        };

        let results = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| self.reconcile_transaction_item(scope, index, item))
            .buffered(self.concurrency);

        self.finish_batch(log, results).await
    }

    /// 先解析请求来源，作用域无法解析时批次直接失败
    pub async fn reconcile_for_origin(
        &self,
        origin: &RequestOrigin,
        items: Vec<CouponSyncItem>,
    ) -> Result<SyncLog> {
        match self.resolver.resolve(origin).await {
            Ok(scope) => self.reconcile(scope, items).await,
            Err(e) => self.unscoped_failure(SyncKind::Coupon, items.len(), e).await,
        }
    }

    pub async fn reconcile_transactions_for_origin(
        &self,
        origin: &RequestOrigin,
        items: Vec<TransactionSyncItem>,
    ) -> Result<SyncLog> {
        match self.resolver.resolve(origin).await {
            Ok(scope) => self.reconcile_transactions(scope, items).await,
            Err(e) => self.unscoped_failure(SyncKind::Transaction, items.len(), e).await,
        }
    }

    async fn unscoped_failure(
        &self,
        kind: SyncKind,
        total: usize,
        cause: LedgerError,
    ) -> Result<SyncLog> {
        warn!(kind = kind.as_str(), error = %cause, "无法解析租户作用域，批次失败");
        let log = self
            .sync_logs
            .create(&NewSyncLog {
                scope: None,
                kind,
                total_count: count(total),
            })
            .await?;
        let log = self.sync_logs.mark_failed(log.id, &cause.to_string()).await?;
        app_metrics::record_sync_batch(kind.as_str(), log.status.as_str(), 0, 0);
        Ok(log)
    }

    async fn start_batch(
        &self,
        scope: Option<TenantScope>,
        kind: SyncKind,
        total: usize,
    ) -> Result<BatchStart> {
        let log = self
            .sync_logs
            .create(&NewSyncLog {
                scope,
                kind,
                total_count: count(total),
            })
            .await?;

        let rejection = if total == 0 {
            Some("批次为空".to_string())
        } else if total > self.max_batch_size {
            Some(format!("批次条目数 {} 超过上限 {}", total, self.max_batch_size))
        } else {
            None
        };

        match rejection {
            Some(reason) => {
                warn!(sync_log_id = log.id, kind = kind.as_str(), reason = %reason, "批次无法开始");
                let log = self.sync_logs.mark_failed(log.id, &reason).await?;
                app_metrics::record_sync_batch(kind.as_str(), log.status.as_str(), 0, 0);
                Ok(BatchStart::Rejected(log))
            }
            None => {
                info!(sync_log_id = log.id, kind = kind.as_str(), total, "开始处理同步批次");
                Ok(BatchStart::Ready(log))
            }
        }
    }

    /// 按输入顺序逐条记录结果，全部记录后标记完成
    async fn finish_batch<S>(&self, log: SyncLog, results: S) -> Result<SyncLog>
    where
        S: futures::Stream<Item = SyncItemResult>,
    {
        let start = Instant::now();
        let mut results = std::pin::pin!(results);
        let (mut success, mut failed) = (0u64, 0u64);

        while let Some(result) = results.next().await {
            if result.is_success() {
                success += 1;
            } else {
                failed += 1;
            }
            if let Err(e) = self.sync_logs.record_item(log.id, &result).await {
                error!(sync_log_id = log.id, error = %e, "同步结果写入失败");
                if let Err(mark_err) = self.sync_logs.mark_failed(log.id, &e.to_string()).await {
                    error!(sync_log_id = log.id, error = %mark_err, "标记同步批次失败时出错");
                }
                return Err(e);
            }
        }

        let log = self.sync_logs.mark_completed(log.id).await?;
        app_metrics::record_sync_batch(log.kind.as_str(), log.status.as_str(), success, failed);
        info!(
            sync_log_id = log.id,
            total = log.total_count,
            success = log.success_count,
            failed = log.failed_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "同步批次处理完成"
        );
        Ok(log)
    }

    async fn reconcile_coupon_item(
        &self,
        scope: TenantScope,
        index: usize,
        item: CouponSyncItem,
    ) -> SyncItemResult {
        let reference = item.invoice_no.trim().to_string();
        let outcome = self.redeem_synced_coupon(scope, &reference, &item).await;
        item_result(index, reference, outcome)
    }

    async fn redeem_synced_coupon(
        &self,
        scope: TenantScope,
        reference: &str,
        item: &CouponSyncItem,
    ) -> Result<LedgerReceipt> {
        let phone_no = validation::validate_coupon_sync_item(item)?;
        let customer = self.customer_by_phone(scope, &phone_no).await?;
        let order = OrderSnapshot::new(Some(reference.to_string()), Decimal::ZERO, item.used_time);
        self.ledger
            .redeem_coupon(scope, &customer.customer_id, item.code.trim(), &order)
            .await
    }

    async fn reconcile_transaction_item(
        &self,
        scope: TenantScope,
        index: usize,
        item: TransactionSyncItem,
    ) -> SyncItemResult {
        let reference = item.invoice_no.trim().to_string();
        let outcome = self.earn_synced_transaction(scope, &reference, &item).await;
        item_result(index, reference, outcome)
    }

    async fn earn_synced_transaction(
        &self,
        scope: TenantScope,
        reference: &str,
        item: &TransactionSyncItem,
    ) -> Result<LedgerReceipt> {
        let phone_no = validation::validate_transaction_sync_item(item)?;
        let rule_ref = match (item.rule_id, item.campaign_id) {
            (Some(rule_id), None) => RuleRef::Rule(rule_id),
            (None, Some(campaign_id)) => RuleRef::Campaign(campaign_id),
            _ => {
                return Err(LedgerError::Validation(
                    "ruleId 与 campaignId 必须且只能提供一个".to_string(),
                ));
            }
        };
        let customer = self.customer_by_phone(scope, &phone_no).await?;

        let mut order = OrderSnapshot::new(
            Some(reference.to_string()),
            item.amount,
            item.transaction_time,
        );
        order.subtotal = item.subtotal;
        self.ledger
            .earn(scope, &customer.customer_id, rule_ref, &order)
            .await
    }

    async fn customer_by_phone(&self, scope: TenantScope, phone_no: &str) -> Result<Customer> {
        self.customers
            .find_active_by_phone(scope, phone_no)
            .await?
            .ok_or_else(|| LedgerError::CustomerNotFound(phone_no.to_string()))
    }
}

enum BatchStart {
    Ready(SyncLog),
    Rejected(SyncLog),
}

fn count(total: usize) -> i32 {
    i32::try_from(total).unwrap_or(i32::MAX)
}

fn item_result(index: usize, reference: String, outcome: Result<LedgerReceipt>) -> SyncItemResult {
    match outcome {
        Ok(receipt) => {
            SyncItemResult::success(index, reference, receipt.activity.id, receipt.replayed)
        }
        Err(e) => {
            if !e.is_business_error() {
                warn!(index, reference = %reference, error = %e, "同步条目处理出现系统错误");
            }
            SyncItemResult::failure(index, reference, e.error_code(), e.to_string())
        }
    }
}
