//! 内存仓储实现
//!
//! 实现全部仓储 Trait，语义与 PostgreSQL 实现保持一致（作用域过滤、幂等键、
//! 条件状态迁移、客户级余额锁）。用于服务层测试和本地演示，不做持久化。
//!
//! 单把互斥锁保护全部状态，相当于每个仓储操作都是一个串行化事务。

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use super::coupon_repo::classify_unavailable;
use super::traits::{
    ActivityRepositoryTrait, AppendOutcome, CatalogRepositoryTrait, CouponRepositoryTrait,
    CustomerRepositoryTrait, OtpRepositoryTrait, SmsLogRepositoryTrait, SyncLogRepositoryTrait,
    TenantDirectoryTrait,
};
use crate::error::{LedgerError, Result};
use crate::models::{
    ActivityFilter, Campaign, CampaignStatus, CampaignType, Coupon, CouponStatus,
    CouponStatusLog, CouponTypeName, Customer, CustomerActivity, CustomerStatus, IdempotencyKey,
    NewActivity, NewOtpCode, NewSmsLog, NewSyncLog, OtpCode, RewardKind, Rule, RuleDirection,
    SmsLog, SyncItemResult, SyncLog, SyncStatus, TenantRecord, TenantScope, TenantStatus,
};

#[derive(Default)]
struct State {
    tenants: Vec<TenantRecord>,
    customers: Vec<Customer>,
    campaigns: Vec<Campaign>,
    rules: Vec<Rule>,
    coupons: Vec<Coupon>,
    coupon_logs: Vec<CouponStatusLog>,
    activities: Vec<CustomerActivity>,
    sync_logs: Vec<SyncLog>,
    sms_logs: Vec<SmsLog>,
    otps: Vec<OtpCode>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_by_key(&self, key: &IdempotencyKey) -> Option<CustomerActivity> {
        self.activities
            .iter()
            .find(|a| {
                a.scope() == key.scope
                    && a.customer_id == key.customer_id
                    && a.order_id.as_deref() == Some(key.order_id.as_str())
                    && a.target_ref == key.target_ref
            })
            .cloned()
    }

    fn balance(&self, scope: TenantScope, customer_id: &str) -> Decimal {
        self.activities
            .iter()
            .filter(|a| a.scope() == scope && a.customer_id == customer_id)
            .map(|a| a.amount)
            .sum()
    }

    /// 唯一索引语义：有订单号且键已存在时返回已有记录
    fn insert_or_existing(&mut self, activity: &NewActivity) -> AppendOutcome {
        if let Some(key) = activity.idempotency_key()
            && let Some(existing) = self.find_by_key(&key)
        {
            return AppendOutcome::Existing(existing);
        }

        let row = CustomerActivity {
            id: self.next_id(),
            tenant_id: activity.scope.tenant_id,
            business_unit_id: activity.scope.business_unit_id,
            customer_id: activity.customer_id.clone(),
            campaign_id: activity.campaign_id,
            coupon_id: activity.coupon_id,
            rule_id: activity.rule_id,
            rule_name: activity.rule_name.clone(),
            order_id: activity.order_id.clone(),
            target_ref: activity.target_ref.clone(),
            amount: activity.amount,
            activity_type: activity.activity_type,
            meta: activity.meta.clone(),
            created_at: Utc::now(),
        };
        self.activities.push(row.clone());
        AppendOutcome::Created(row)
    }

    fn log_coupon(
        &mut self,
        coupon_id: Uuid,
        from: CouponStatus,
        to: CouponStatus,
        order_id: Option<&str>,
        reason: &str,
    ) {
        let id = self.next_id();
        self.coupon_logs.push(CouponStatusLog {
            id,
            coupon_id,
            from_status: from,
            to_status: to,
            order_id: order_id.map(String::from),
            reason: Some(reason.to_string()),
            created_at: Utc::now(),
        });
    }
}

/// 内存仓储
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    /// 接下来 N 次写操作返回瞬时数据库错误
    transient_write_failures: AtomicU32,
    /// 租户目录查询的人为延迟
    lookup_delay: Mutex<Option<Duration>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 故障注入 ====================

    /// 让接下来 `count` 次写操作失败（连接池超时）
    pub fn fail_next_writes(&self, count: u32) {
        self.transient_write_failures.store(count, Ordering::SeqCst);
    }

    /// 让租户目录查询延迟返回
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.lock() = delay;
    }

    fn check_write(&self) -> Result<()> {
        let injected = self
            .transient_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(LedgerError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    // ==================== 数据准备 ====================

    pub fn add_tenant(
        &self,
        label: &str,
        scope: TenantScope,
        status: TenantStatus,
    ) -> TenantRecord {
        let mut state = self.state.lock();
        let record = TenantRecord {
            id: state.next_id(),
            domain_label: label.to_ascii_lowercase(),
            tenant_id: scope.tenant_id,
            business_unit_id: scope.business_unit_id,
            status,
            created_at: Utc::now(),
        };
        state.tenants.push(record.clone());
        record
    }

    pub fn add_customer(
        &self,
        scope: TenantScope,
        customer_id: &str,
        phone_no: &str,
        status: CustomerStatus,
    ) -> Customer {
        let mut state = self.state.lock();
        let now = Utc::now();
        let customer = Customer {
            id: state.next_id(),
            tenant_id: scope.tenant_id,
            business_unit_id: scope.business_unit_id,
            customer_id: customer_id.to_string(),
            phone_no: phone_no.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };
        state.customers.push(customer.clone());
        customer
    }

    pub fn add_campaign(&self, scope: TenantScope, status: CampaignStatus) -> Campaign {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            business_unit_id: scope.business_unit_id,
            name: "campaign".to_string(),
            campaign_type: CampaignType::Points,
            status,
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
        };
        self.upsert_campaign(campaign.clone());
        campaign
    }

    pub fn upsert_campaign(&self, campaign: Campaign) {
        let mut state = self.state.lock();
        state.campaigns.retain(|c| c.id != campaign.id);
        state.campaigns.push(campaign);
    }

    pub fn add_rule(
        &self,
        campaign: &Campaign,
        direction: RuleDirection,
        reward_kind: RewardKind,
        reward_value: Decimal,
    ) -> Rule {
        let mut state = self.state.lock();
        let id = state.next_id();
        let rule = Rule {
            id,
            campaign_id: campaign.id,
            tenant_id: campaign.tenant_id,
            business_unit_id: campaign.business_unit_id,
            name: format!("rule-{}", id),
            direction,
            event_name: None,
            reward_kind,
            reward_value,
            min_order_amount: None,
            enabled: true,
            created_at: Utc::now(),
        };
        state.rules.push(rule.clone());
        rule
    }

    pub fn upsert_rule(&self, rule: Rule) {
        let mut state = self.state.lock();
        state.rules.retain(|r| r.id != rule.id);
        state.rules.push(rule);
    }

    pub fn add_coupon(
        &self,
        scope: TenantScope,
        code: &str,
        coupon_type: CouponTypeName,
        face_value: Decimal,
        customer_id: Option<&str>,
    ) -> Coupon {
        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id,
            business_unit_id: scope.business_unit_id,
            code: code.to_string(),
            coupon_type,
            status: CouponStatus::Issued,
            customer_id: customer_id.map(String::from),
            campaign_id: None,
            face_value,
            expires_at: None,
            reserved_order_id: None,
            redeemed_order_id: None,
            redeemed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.upsert_coupon(coupon.clone());
        coupon
    }

    pub fn upsert_coupon(&self, coupon: Coupon) {
        let mut state = self.state.lock();
        state.coupons.retain(|c| c.id != coupon.id);
        state.coupons.push(coupon);
    }

    // ==================== 状态检查 ====================

    pub fn activities(&self) -> Vec<CustomerActivity> {
        self.state.lock().activities.clone()
    }

    pub fn coupon(&self, scope: TenantScope, code: &str) -> Option<Coupon> {
        self.state
            .lock()
            .coupons
            .iter()
            .find(|c| c.scope() == scope && c.code == code)
            .cloned()
    }

    pub fn coupon_logs(&self, coupon_id: Uuid) -> Vec<CouponStatusLog> {
        self.state
            .lock()
            .coupon_logs
            .iter()
            .filter(|l| l.coupon_id == coupon_id)
            .cloned()
            .collect()
    }

    pub fn sms_logs(&self) -> Vec<SmsLog> {
        self.state.lock().sms_logs.clone()
    }

    pub fn otp_codes(&self) -> Vec<OtpCode> {
        self.state.lock().otps.clone()
    }
}

#[async_trait]
impl TenantDirectoryTrait for InMemoryBackend {
    async fn resolve_by_domain(&self, label: &str) -> Result<Option<TenantRecord>> {
        let delay = *self.lookup_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock();
        Ok(state.tenants.iter().find(|t| t.domain_label == label).cloned())
    }
}

#[async_trait]
impl CatalogRepositoryTrait for InMemoryBackend {
    async fn get_rule(&self, scope: TenantScope, rule_id: i64) -> Result<Option<Rule>> {
        let state = self.state.lock();
        Ok(state
            .rules
            .iter()
            .find(|r| r.id == rule_id && r.scope() == scope)
            .cloned())
    }

    async fn get_campaign(
        &self,
        scope: TenantScope,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>> {
        let state = self.state.lock();
        Ok(state
            .campaigns
            .iter()
            .find(|c| c.id == campaign_id && c.scope() == scope)
            .cloned())
    }

    async fn list_campaign_rules(
        &self,
        scope: TenantScope,
        campaign_id: Uuid,
        direction: RuleDirection,
    ) -> Result<Vec<Rule>> {
        let state = self.state.lock();
        let mut rules: Vec<Rule> = state
            .rules
            .iter()
            .filter(|r| {
                r.campaign_id == campaign_id && r.scope() == scope && r.direction == direction
            })
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn list_rules_by_event(&self, scope: TenantScope, event_name: &str) -> Result<Vec<Rule>> {
        let state = self.state.lock();
        let mut rules: Vec<Rule> = state
            .rules
            .iter()
            .filter(|r| r.scope() == scope && r.event_name.as_deref() == Some(event_name))
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn find_coupon(&self, scope: TenantScope, code: &str) -> Result<Option<Coupon>> {
        Ok(self.coupon(scope, code))
    }
}

#[async_trait]
impl ActivityRepositoryTrait for InMemoryBackend {
    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<CustomerActivity>> {
        Ok(self.state.lock().find_by_key(key))
    }

    async fn append(&self, activity: &NewActivity) -> Result<AppendOutcome> {
        self.check_write()?;
        Ok(self.state.lock().insert_or_existing(activity))
    }

    async fn append_debit(&self, activity: &NewActivity) -> Result<AppendOutcome> {
        self.check_write()?;
        let mut state = self.state.lock();

        if let Some(key) = activity.idempotency_key()
            && let Some(existing) = state.find_by_key(&key)
        {
            return Ok(AppendOutcome::Existing(existing));
        }

        let available = state.balance(activity.scope, &activity.customer_id);
        let required = -activity.amount;
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                required,
                available,
            });
        }

        Ok(state.insert_or_existing(activity))
    }

    async fn balance(&self, scope: TenantScope, customer_id: &str) -> Result<Decimal> {
        Ok(self.state.lock().balance(scope, customer_id))
    }

    async fn list(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CustomerActivity>> {
        let state = self.state.lock();
        let mut rows: Vec<CustomerActivity> = state
            .activities
            .iter()
            .filter(|a| a.scope() == scope && a.customer_id == customer_id && filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
    ) -> Result<i64> {
        let state = self.state.lock();
        Ok(state
            .activities
            .iter()
            .filter(|a| a.scope() == scope && a.customer_id == customer_id && filter.matches(a))
            .count() as i64)
    }
}

#[async_trait]
impl CouponRepositoryTrait for InMemoryBackend {
    async fn redeem(
        &self,
        scope: TenantScope,
        coupon_id: Uuid,
        order_id: &str,
        activity: &NewActivity,
    ) -> Result<AppendOutcome> {
        self.check_write()?;
        let mut state = self.state.lock();
        let now = Utc::now();

        let coupon = state
            .coupons
            .iter_mut()
            .find(|c| c.id == coupon_id && c.scope() == scope)
            .ok_or_else(|| LedgerError::RuleNotApplicable(format!("coupon {}", coupon_id)))?;

        let redeemable = !coupon.is_past_expiry(now)
            && (coupon.status == CouponStatus::Issued
                || (coupon.status == CouponStatus::Reserved
                    && coupon.reserved_order_id.as_deref() == Some(order_id)));

        if !redeemable {
            let snapshot = coupon.clone();
            if snapshot.status == CouponStatus::Redeemed
                && snapshot.redeemed_order_id.as_deref() == Some(order_id)
                && let Some(key) = activity.idempotency_key()
                && let Some(existing) = state.find_by_key(&key)
            {
                return Ok(AppendOutcome::Existing(existing));
            }
            return Err(classify_unavailable(&snapshot, order_id, now));
        }

        let from = coupon.status;
        coupon.status = CouponStatus::Redeemed;
        coupon.redeemed_order_id = Some(order_id.to_string());
        coupon.redeemed_at = Some(now);
        coupon.updated_at = now;

        state.log_coupon(coupon_id, from, CouponStatus::Redeemed, Some(order_id), "redeem");
        Ok(state.insert_or_existing(activity))
    }

    async fn reserve(&self, scope: TenantScope, coupon_id: Uuid, order_id: &str) -> Result<Coupon> {
        self.check_write()?;
        let mut state = self.state.lock();
        let now = Utc::now();

        let coupon = state
            .coupons
            .iter_mut()
            .find(|c| c.id == coupon_id && c.scope() == scope)
            .ok_or_else(|| LedgerError::RuleNotApplicable(format!("coupon {}", coupon_id)))?;

        if coupon.is_past_expiry(now) || coupon.status != CouponStatus::Issued {
            if coupon.status == CouponStatus::Reserved
                && coupon.reserved_order_id.as_deref() == Some(order_id)
                && !coupon.is_past_expiry(now)
            {
                return Ok(coupon.clone());
            }
            return Err(classify_unavailable(coupon, order_id, now));
        }

        coupon.status = CouponStatus::Reserved;
        coupon.reserved_order_id = Some(order_id.to_string());
        coupon.updated_at = now;
        let reserved = coupon.clone();

        state.log_coupon(
            coupon_id,
            CouponStatus::Issued,
            CouponStatus::Reserved,
            Some(order_id),
            "reserve",
        );
        Ok(reserved)
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<u64> {
        self.check_write()?;
        let mut state = self.state.lock();

        let mut due: Vec<(DateTime<Utc>, Uuid)> = state
            .coupons
            .iter()
            .filter(|c| c.status == CouponStatus::Issued)
            .filter_map(|c| c.expires_at.filter(|t| *t <= now).map(|t| (t, c.id)))
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);

        for (_, coupon_id) in &due {
            if let Some(coupon) = state.coupons.iter_mut().find(|c| c.id == *coupon_id) {
                coupon.status = CouponStatus::Expired;
                coupon.updated_at = now;
            }
            state.log_coupon(
                *coupon_id,
                CouponStatus::Issued,
                CouponStatus::Expired,
                None,
                "expired",
            );
        }

        Ok(due.len() as u64)
    }
}

#[async_trait]
impl CustomerRepositoryTrait for InMemoryBackend {
    async fn find_active_by_phone(
        &self,
        scope: TenantScope,
        phone_no: &str,
    ) -> Result<Option<Customer>> {
        let state = self.state.lock();
        Ok(state
            .customers
            .iter()
            .rev()
            .find(|c| c.scope() == scope && c.phone_no == phone_no && c.is_active())
            .cloned())
    }

    async fn get(&self, scope: TenantScope, customer_id: &str) -> Result<Option<Customer>> {
        let state = self.state.lock();
        Ok(state
            .customers
            .iter()
            .find(|c| c.scope() == scope && c.customer_id == customer_id)
            .cloned())
    }
}

#[async_trait]
impl SyncLogRepositoryTrait for InMemoryBackend {
    async fn create(&self, log: &NewSyncLog) -> Result<SyncLog> {
        let mut state = self.state.lock();
        let created = SyncLog {
            id: state.next_id(),
            tenant_id: log.scope.map(|s| s.tenant_id),
            business_unit_id: log.scope.map(|s| s.business_unit_id),
            kind: log.kind,
            status: SyncStatus::Pending,
            total_count: log.total_count,
            success_count: 0,
            failed_count: 0,
            success_items: Json(Vec::new()),
            failed_items: Json(Vec::new()),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.sync_logs.push(created.clone());
        Ok(created)
    }

    async fn record_item(&self, id: i64, item: &SyncItemResult) -> Result<()> {
        let mut state = self.state.lock();
        let log = state
            .sync_logs
            .iter_mut()
            .find(|l| l.id == id && l.status == SyncStatus::Pending)
            .ok_or(LedgerError::SyncLogNotFound(id))?;

        if item.is_success() {
            log.success_count += 1;
            log.success_items.0.push(item.clone());
        } else {
            log.failed_count += 1;
            log.failed_items.0.push(item.clone());
        }
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<SyncLog> {
        let mut state = self.state.lock();
        let log = state
            .sync_logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(LedgerError::SyncLogNotFound(id))?;
        log.status = SyncStatus::Completed;
        log.completed_at = Some(Utc::now());
        Ok(log.clone())
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<SyncLog> {
        let mut state = self.state.lock();
        let log = state
            .sync_logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(LedgerError::SyncLogNotFound(id))?;
        log.status = SyncStatus::Failed;
        log.error_message = Some(error_message.to_string());
        log.completed_at = Some(Utc::now());
        Ok(log.clone())
    }

    async fn get(&self, scope: TenantScope, id: i64) -> Result<Option<SyncLog>> {
        let state = self.state.lock();
        Ok(state
            .sync_logs
            .iter()
            .find(|l| l.id == id && l.scope() == Some(scope))
            .cloned())
    }
}

#[async_trait]
impl SmsLogRepositoryTrait for InMemoryBackend {
    async fn create(&self, log: &NewSmsLog) -> Result<SmsLog> {
        let mut state = self.state.lock();
        let created = SmsLog {
            id: state.next_id(),
            phone_no: log.phone_no.clone(),
            language_code: log.language_code.clone(),
            provider: log.provider.clone(),
            request_payload: log.request_payload.clone(),
            response_payload: log.response_payload.clone(),
            status: log.status,
            error_message: log.error_message.clone(),
            created_at: Utc::now(),
        };
        state.sms_logs.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl OtpRepositoryTrait for InMemoryBackend {
    async fn create(&self, otp: &NewOtpCode) -> Result<OtpCode> {
        let mut state = self.state.lock();
        let created = OtpCode {
            id: state.next_id(),
            tenant_id: otp.scope.tenant_id,
            business_unit_id: otp.scope.business_unit_id,
            phone_no: otp.phone_no.clone(),
            code_hash: otp.code_hash.clone(),
            expires_at: otp.expires_at,
            created_at: Utc::now(),
        };
        state.otps.push(created.clone());
        Ok(created)
    }
}
