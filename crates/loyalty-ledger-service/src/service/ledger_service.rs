//! 账本引擎
//!
//! 每个订单、每条规则（或每张券）最多产生一条客户流水。
//!
//! ## 记账流程
//!
//! 1. 参数校验 -> 2. 目录解析（找不到即 `RuleNotApplicable`）
//!    -> 3. 幂等检查（已存在则原样返回，`replayed = true`）
//!    -> 4. 计算金额（消耗为负）-> 5. 事务写入（消耗在客户锁内校验余额，
//!    核销在同一事务内完成券状态迁移与审计）
//!    -> 6. 新写入时发送通知（异步，失败不影响账本）
//!
//! 瞬时持久化故障退避后重试一次，仍失败返回 `LedgerUnavailable`。
//! 没有订单号的请求不存在幂等键，每次调用都追加新流水。
//! 客户 ID、订单号与券码在校验时去除首尾空白，幂等键只由规范化后的值构成。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::observability::metrics as app_metrics;
use loyalty_shared::retry::{RetryPolicy, retry_with_policy};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::catalog_service::CatalogService;
use super::reward;
use crate::error::{LedgerError, Result};
use crate::models::{
    ActivityType, Coupon, Evidence, EvidenceFacts, LedgerReceipt, NewActivity, OrderSnapshot,
    Rule, RuleDirection, RuleRef, TenantScope,
};
use crate::notification::{Notification, NotificationKind, NotificationSender};
use crate::repository::{ActivityRepositoryTrait, AppendOutcome, CouponRepositoryTrait};
use crate::validation;

pub struct LedgerService {
    catalog: Arc<CatalogService>,
    activities: Arc<dyn ActivityRepositoryTrait>,
    coupons: Arc<dyn CouponRepositoryTrait>,
    retry_policy: RetryPolicy,
    notification_sender: RwLock<Option<Arc<NotificationSender>>>,
}

impl LedgerService {
    pub fn new(
        catalog: Arc<CatalogService>,
        activities: Arc<dyn ActivityRepositoryTrait>,
        coupons: Arc<dyn CouponRepositoryTrait>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            catalog,
            activities,
            coupons,
            retry_policy: RetryPolicy::once(Duration::from_millis(config.retry_delay_ms)),
            notification_sender: RwLock::new(None),
        }
    }

    /// 设置通知发送器
    pub async fn set_notification_sender(&self, sender: Arc<NotificationSender>) {
        let mut guard = self.notification_sender.write().await;
        *guard = Some(sender);
        info!("LedgerService 通知发送器已设置");
    }

    /// 累积积分
    #[instrument(
        skip_all,
        fields(scope = %scope, customer_id = %customer_id, rule_ref = %rule_ref)
    )]
    pub async fn earn(
        &self,
        scope: TenantScope,
        customer_id: &str,
        rule_ref: RuleRef,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let start = Instant::now();
        let result = self.earn_inner(scope, customer_id, rule_ref, order).await;
        record("earn", &result, start);
        result
    }

    async fn earn_inner(
        &self,
        scope: TenantScope,
        customer_id: &str,
        rule_ref: RuleRef,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        let order = &validation::normalize_order(order)?;

        let facts = order.facts();
        let rule = self
            .catalog
            .find_applicable_rule(scope, rule_ref, RuleDirection::Earn, &facts, Utc::now())
            .await?;

        let activity_type = match rule_ref {
            RuleRef::Rule(_) => ActivityType::Rule,
            RuleRef::Campaign(_) => ActivityType::Campaign,
        };
        let activity = rule_activity(
            scope,
            customer_id,
            &rule,
            &facts,
            activity_type,
            Evidence::order(order).to_value(),
        );

        self.append(activity, RuleDirection::Earn).await
    }

    /// 消耗积分
    #[instrument(
        skip_all,
        fields(scope = %scope, customer_id = %customer_id, rule_id = rule_id)
    )]
    pub async fn burn(
        &self,
        scope: TenantScope,
        customer_id: &str,
        rule_id: i64,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let start = Instant::now();
        let result = self.burn_inner(scope, customer_id, rule_id, order).await;
        record("burn", &result, start);
        result
    }

    async fn burn_inner(
        &self,
        scope: TenantScope,
        customer_id: &str,
        rule_id: i64,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        let order = &validation::normalize_order(order)?;

        let facts = order.facts();
        let rule = self
            .catalog
            .find_applicable_rule(
                scope,
                RuleRef::Rule(rule_id),
                RuleDirection::Burn,
                &facts,
                Utc::now(),
            )
            .await?;

        let activity = rule_activity(
            scope,
            customer_id,
            &rule,
            &facts,
            ActivityType::Rule,
            Evidence::order(order).to_value(),
        );

        self.append(activity, RuleDirection::Burn).await
    }

    /// 事件驱动记账，方向跟随匹配到的规则
    #[instrument(
        skip_all,
        fields(scope = %scope, customer_id = %customer_id, event_name = %event_name)
    )]
    pub async fn earn_or_burn_by_event(
        &self,
        scope: TenantScope,
        customer_id: &str,
        event_name: &str,
        metadata: &Value,
    ) -> Result<LedgerReceipt> {
        let start = Instant::now();
        let result = self
            .event_inner(scope, customer_id, event_name, metadata)
            .await;
        record("event", &result, start);
        result
    }

    async fn event_inner(
        &self,
        scope: TenantScope,
        customer_id: &str,
        event_name: &str,
        metadata: &Value,
    ) -> Result<LedgerReceipt> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        validation::validate_event(event_name, metadata)?;
        let event_name = event_name.trim();

        let facts = EvidenceFacts::from_event_metadata(metadata);
        let rule = self
            .catalog
            .find_rule_for_event(scope, event_name, &facts, Utc::now())
            .await?;

        let activity = rule_activity(
            scope,
            customer_id,
            &rule,
            &facts,
            ActivityType::Rule,
            Evidence::event(event_name, metadata).to_value(),
        );

        self.append(activity, rule.direction).await
    }

    /// 核销优惠券
    ///
    /// 返现券按面额入账，其他类型记 0.00。同一订单重复核销返回原流水。
    #[instrument(skip_all, fields(scope = %scope, customer_id = %customer_id, code = %code))]
    pub async fn redeem_coupon(
        &self,
        scope: TenantScope,
        customer_id: &str,
        code: &str,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let start = Instant::now();
        let result = self.redeem_inner(scope, customer_id, code, order).await;
        record("redeem_coupon", &result, start);
        result
    }

    async fn redeem_inner(
        &self,
        scope: TenantScope,
        customer_id: &str,
        code: &str,
        order: &OrderSnapshot,
    ) -> Result<LedgerReceipt> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        let code = validation::validate_coupon_code(code)?;
        let order = &validation::normalize_order(order)?;
        let order_id = order
            .order_id
            .as_deref()
            .ok_or_else(|| LedgerError::Validation("核销优惠券必须提供 orderId".to_string()))?;

        let coupon = self.owned_coupon(scope, customer_id, code).await?;

        let activity = NewActivity {
            scope,
            customer_id: customer_id.to_string(),
            campaign_id: coupon.campaign_id,
            coupon_id: Some(coupon.id),
            rule_id: None,
            rule_name: None,
            order_id: Some(order_id.to_string()),
            target_ref: NewActivity::coupon_target(coupon.id),
            amount: coupon.credit_amount(),
            activity_type: ActivityType::Coupon,
            meta: Evidence::coupon(order, &coupon.code).to_value(),
        };

        if let Some(receipt) = self.replay(&activity).await? {
            return Ok(receipt);
        }

        let outcome = self
            .persist("redeem_coupon", || {
                self.coupons.redeem(scope, coupon.id, order_id, &activity)
            })
            .await?;

        if outcome.is_created() {
            info!(
                coupon_id = %coupon.id,
                order_id,
                amount = %outcome.activity().amount,
                "优惠券核销成功"
            );
        }
        self.notify(NotificationKind::CouponRedeemed, &outcome).await;
        Ok(outcome.into_receipt())
    }

    /// 为订单预留优惠券
    #[instrument(
        skip_all,
        fields(scope = %scope, customer_id = %customer_id, code = %code, order_id = %order_id)
    )]
    pub async fn reserve_coupon(
        &self,
        scope: TenantScope,
        customer_id: &str,
        code: &str,
        order_id: &str,
    ) -> Result<Coupon> {
        let start = Instant::now();
        let result = self.reserve_inner(scope, customer_id, code, order_id).await;

        let outcome = match &result {
            Ok(_) => "reserved",
            Err(e) => e.error_code(),
        };
        app_metrics::record_ledger_operation(
            "reserve_coupon",
            outcome,
            start.elapsed().as_secs_f64(),
        );
        result
    }

    async fn reserve_inner(
        &self,
        scope: TenantScope,
        customer_id: &str,
        code: &str,
        order_id: &str,
    ) -> Result<Coupon> {
        let customer_id = validation::validate_customer_id(customer_id)?;
        let code = validation::validate_coupon_code(code)?;
        let order_id = validation::validate_order_id(order_id)?;

        let coupon = self.owned_coupon(scope, customer_id, code).await?;
        let reserved = self
            .persist("reserve_coupon", || {
                self.coupons.reserve(scope, coupon.id, order_id)
            })
            .await?;

        info!(coupon_id = %reserved.id, order_id, "优惠券已预留");
        Ok(reserved)
    }

    /// 查找券并校验归属，别人的券与不存在的券同样返回 `RuleNotApplicable`
    async fn owned_coupon(
        &self,
        scope: TenantScope,
        customer_id: &str,
        code: &str,
    ) -> Result<Coupon> {
        let coupon = self.catalog.find_coupon(scope, code).await?;
        if !coupon.belongs_to(customer_id) {
            warn!(code, customer_id, "优惠券不属于该客户");
            return Err(LedgerError::RuleNotApplicable(format!("coupon {}", code)));
        }
        Ok(coupon)
    }

    async fn replay(&self, activity: &NewActivity) -> Result<Option<LedgerReceipt>> {
        let Some(key) = activity.idempotency_key() else {
            warn!(
                customer_id = %activity.customer_id,
                target = %activity.target_ref,
                "请求未携带订单号，无法做幂等保护"
            );
            return Ok(None);
        };

        let existing = self.activities.find_by_key(&key).await?;
        if let Some(existing) = existing {
            info!(
                activity_id = existing.id,
                order_id = %key.order_id,
                "幂等请求，返回已存在的流水"
            );
            return Ok(Some(LedgerReceipt::replayed(existing)));
        }
        Ok(None)
    }

    async fn append(
        &self,
        activity: NewActivity,
        direction: RuleDirection,
    ) -> Result<LedgerReceipt> {
        if let Some(receipt) = self.replay(&activity).await? {
            return Ok(receipt);
        }

        let outcome = match direction {
            RuleDirection::Earn => {
                self.persist("append_activity", || self.activities.append(&activity))
                    .await?
            }
            RuleDirection::Burn => {
                self.persist("append_debit", || self.activities.append_debit(&activity))
                    .await?
            }
        };

        if outcome.is_created() {
            info!(
                activity_id = outcome.activity().id,
                amount = %outcome.activity().amount,
                direction = direction.as_str(),
                "流水写入成功"
            );
        }

        let kind = match direction {
            RuleDirection::Earn => NotificationKind::PointsEarned,
            RuleDirection::Burn => NotificationKind::PointsBurned,
        };
        self.notify(kind, &outcome).await;
        Ok(outcome.into_receipt())
    }

    /// 瞬时故障重试一次，仍失败映射为 `LedgerUnavailable`
    async fn persist<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_policy(&self.retry_policy, operation, LedgerError::is_retryable, op)
            .await
            .map_err(LedgerError::into_terminal)
    }

    async fn notify(&self, kind: NotificationKind, outcome: &AppendOutcome) {
        if !outcome.is_created() {
            return;
        }
        let sender = {
            let guard = self.notification_sender.read().await;
            guard.clone()
        };
        if let Some(sender) = sender {
            let activity = outcome.activity();
            let payload = Notification::activity_payload(activity);
            sender.send(activity.scope(), &activity.customer_id, kind, payload);
        }
    }
}

fn rule_activity(
    scope: TenantScope,
    customer_id: &str,
    rule: &Rule,
    facts: &EvidenceFacts,
    activity_type: ActivityType,
    meta: Value,
) -> NewActivity {
    NewActivity {
        scope,
        customer_id: customer_id.to_string(),
        campaign_id: Some(rule.campaign_id),
        coupon_id: None,
        rule_id: Some(rule.id),
        rule_name: Some(rule.name.clone()),
        order_id: facts.order_id.clone(),
        target_ref: NewActivity::rule_target(rule.id),
        amount: reward::signed_amount(rule, facts),
        activity_type,
        meta,
    }
}

fn record(operation: &str, result: &Result<LedgerReceipt>, start: Instant) {
    let outcome = match result {
        Ok(receipt) if receipt.replayed => "replayed",
        Ok(_) => "created",
        Err(e) => e.error_code(),
    };
    app_metrics::record_ledger_operation(operation, outcome, start.elapsed().as_secs_f64());
}
