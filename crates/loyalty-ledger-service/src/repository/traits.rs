//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试。
//! 所有目录与流水接口都显式接收 `TenantScope`，实现必须按作用域严格过滤。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ActivityFilter, Campaign, Coupon, Customer, CustomerActivity, IdempotencyKey, LedgerReceipt,
    NewActivity, NewOtpCode, NewSmsLog, NewSyncLog, OtpCode, Rule, RuleDirection, SmsLog,
    SyncItemResult, SyncLog, TenantRecord, TenantScope,
};

/// 追加流水的结果
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// 新写入
    Created(CustomerActivity),
    /// 幂等键已存在，返回先写入的那一条
    Existing(CustomerActivity),
}

impl AppendOutcome {
    pub fn activity(&self) -> &CustomerActivity {
        match self {
            Self::Created(a) | Self::Existing(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_receipt(self) -> LedgerReceipt {
        match self {
            Self::Created(a) => LedgerReceipt::created(a),
            Self::Existing(a) => LedgerReceipt::replayed(a),
        }
    }
}

/// 租户目录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantDirectoryTrait: Send + Sync {
    /// 按子域名首段查找租户（不区分状态）
    async fn resolve_by_domain(&self, label: &str) -> Result<Option<TenantRecord>>;
}

/// 活动、规则与优惠券目录接口（只读）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepositoryTrait: Send + Sync {
    async fn get_rule(&self, scope: TenantScope, rule_id: i64) -> Result<Option<Rule>>;
    async fn get_campaign(&self, scope: TenantScope, campaign_id: Uuid)
    -> Result<Option<Campaign>>;
    /// 活动下指定方向的规则，按 id 升序
    async fn list_campaign_rules(
        &self,
        scope: TenantScope,
        campaign_id: Uuid,
        direction: RuleDirection,
    ) -> Result<Vec<Rule>>;
    /// 绑定到事件名的规则，按 id 升序
    async fn list_rules_by_event(&self, scope: TenantScope, event_name: &str) -> Result<Vec<Rule>>;
    async fn find_coupon(&self, scope: TenantScope, code: &str) -> Result<Option<Coupon>>;
}

/// 积分流水仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityRepositoryTrait: Send + Sync {
    async fn find_by_key(&self, key: &IdempotencyKey) -> Result<Option<CustomerActivity>>;

    /// 追加正向流水，幂等键冲突时返回已有记录
    async fn append(&self, activity: &NewActivity) -> Result<AppendOutcome>;

    /// 追加负向流水
    ///
    /// 在客户级事务锁内校验余额，余额不足返回 `InsufficientBalance` 且不写入
    async fn append_debit(&self, activity: &NewActivity) -> Result<AppendOutcome>;

    /// 带符号金额之和
    async fn balance(&self, scope: TenantScope, customer_id: &str) -> Result<Decimal>;

    /// 按 created_at DESC, id DESC 排序分页
    async fn list(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CustomerActivity>>;

    async fn count(
        &self,
        scope: TenantScope,
        customer_id: &str,
        filter: &ActivityFilter,
    ) -> Result<i64>;
}

/// 优惠券状态仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepositoryTrait: Send + Sync {
    /// 核销优惠券
    ///
    /// 状态迁移、审计记录与流水写入在同一事务中完成。
    /// 同一订单的重复核销返回 `Existing`；被其他订单核销返回 `CouponAlreadyRedeemed`。
    async fn redeem(
        &self,
        scope: TenantScope,
        coupon_id: Uuid,
        order_id: &str,
        activity: &NewActivity,
    ) -> Result<AppendOutcome>;

    /// 为订单预留优惠券，同一订单重复预留直接返回
    async fn reserve(&self, scope: TenantScope, coupon_id: Uuid, order_id: &str) -> Result<Coupon>;

    /// 将已过期的 ISSUED 券批量置为 EXPIRED，返回处理条数
    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<u64>;
}

/// 客户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerRepositoryTrait: Send + Sync {
    /// 按规范化手机号查找有效客户
    async fn find_active_by_phone(&self, scope: TenantScope, phone_no: &str)
    -> Result<Option<Customer>>;
    async fn get(&self, scope: TenantScope, customer_id: &str) -> Result<Option<Customer>>;
}

/// 同步日志仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncLogRepositoryTrait: Send + Sync {
    async fn create(&self, log: &NewSyncLog) -> Result<SyncLog>;
    /// 记录单条结果，计数只增不减
    async fn record_item(&self, id: i64, item: &SyncItemResult) -> Result<()>;
    async fn mark_completed(&self, id: i64) -> Result<SyncLog>;
    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<SyncLog>;
    async fn get(&self, scope: TenantScope, id: i64) -> Result<Option<SyncLog>>;
}

/// 短信审计仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsLogRepositoryTrait: Send + Sync {
    async fn create(&self, log: &NewSmsLog) -> Result<SmsLog>;
}

/// OTP 仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OtpRepositoryTrait: Send + Sync {
    async fn create(&self, otp: &NewOtpCode) -> Result<OtpCode>;
}
