//! 活动、规则与优惠券目录实体
//!
//! 目录对账本核心只读，唯一会被账本修改的是优惠券状态

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    CampaignStatus, CampaignType, CouponStatus, CouponTypeName, RewardKind, RuleDirection,
};
use super::activity::round_money;
use super::tenant::TenantScope;

/// 营销活动
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub name: String,
    pub campaign_type: CampaignType,
    pub status: CampaignStatus,
    #[sqlx(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    /// 活动已上线且 now 落在有效期内
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Active
            && self.starts_at.is_none_or(|t| now >= t)
            && self.ends_at.is_none_or(|t| now < t)
    }
}

/// 积分规则
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub campaign_id: Uuid,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub name: String,
    pub direction: RuleDirection,
    /// 事件驱动记账时匹配的事件名
    #[sqlx(default)]
    pub event_name: Option<String>,
    pub reward_kind: RewardKind,
    pub reward_value: Decimal,
    #[sqlx(default)]
    pub min_order_amount: Option<Decimal>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    /// 规则谓词：活动生效、规则启用、方向一致、订单基数达到门槛
    pub fn applies(
        &self,
        campaign: &Campaign,
        direction: RuleDirection,
        base: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        self.enabled
            && self.direction == direction
            && campaign.id == self.campaign_id
            && campaign.is_live(now)
            && self.min_order_amount.is_none_or(|min| base >= min)
    }
}

/// 优惠券
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub code: String,
    pub coupon_type: CouponTypeName,
    pub status: CouponStatus,
    /// 归属客户（为空表示不记名券）
    #[sqlx(default)]
    pub customer_id: Option<String>,
    #[sqlx(default)]
    pub campaign_id: Option<Uuid>,
    pub face_value: Decimal,
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub reserved_order_id: Option<String>,
    #[sqlx(default)]
    pub redeemed_order_id: Option<String>,
    #[sqlx(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    /// 券是否可以被该客户使用（不记名券任何客户可用）
    pub fn belongs_to(&self, customer_id: &str) -> bool {
        self.customer_id.as_deref().is_none_or(|owner| owner == customer_id)
    }

    /// 核销时入账的金额：返现券按面额，其余记 0
    pub fn credit_amount(&self) -> Decimal {
        if self.coupon_type.credits_face_value() {
            round_money(self.face_value)
        } else {
            round_money(Decimal::ZERO)
        }
    }
}

/// 优惠券状态变更审计
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CouponStatusLog {
    pub id: i64,
    pub coupon_id: Uuid,
    pub from_status: CouponStatus,
    pub to_status: CouponStatus,
    #[sqlx(default)]
    pub order_id: Option<String>,
    #[sqlx(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 规则引用：直接指定规则，或指定活动由目录挑选规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "id")]
pub enum RuleRef {
    Rule(i64),
    Campaign(Uuid),
}

impl std::fmt::Display for RuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule(id) => write!(f, "rule:{}", id),
            Self::Campaign(id) => write!(f, "campaign:{}", id),
        }
    }
}
