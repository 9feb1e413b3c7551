//! 账本服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 租户状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    #[default]
    Active,
    /// 已暂停 - 不再解析出作用域
    Suspended,
}

/// 客户状态
///
/// 客户只做软退役，从不物理删除
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    #[default]
    Active,
    Retired,
}

/// 活动类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignType {
    /// 积分活动
    #[default]
    Points,
    /// 优惠券活动
    Coupon,
}

/// 活动状态
///
/// 数据库中以序数存储（SMALLINT 0-3），顺序不可调整
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum CampaignStatus {
    #[default]
    Inactive = 0,
    Active = 1,
    Deleted = 2,
    Suspended = 3,
}

impl CampaignStatus {
    pub fn ordinal(self) -> i16 {
        self as i16
    }

    pub fn from_ordinal(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Inactive),
            1 => Some(Self::Active),
            2 => Some(Self::Deleted),
            3 => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// 规则方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleDirection {
    /// 累积积分（+）
    Earn,
    /// 消耗积分（-）
    Burn,
}

impl RuleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Burn => "burn",
        }
    }
}

/// 奖励计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardKind {
    /// 按订单基数的比例（reward_value 为小数，0.10 表示 10%）
    Percentage,
    /// 固定值
    Fixed,
}

/// 优惠券类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum CouponTypeName {
    Vehicle,
    User,
    Product,
    Geo,
    Service,
    Birthday,
    Referral,
    Tier,
    /// 返现券 - 核销时按面额入账
    Cashback,
    Discount,
}

impl CouponTypeName {
    /// 核销时是否按面额计入积分
    pub fn credits_face_value(&self) -> bool {
        matches!(self, Self::Cashback)
    }
}

/// 优惠券状态
///
/// ISSUED → RESERVED → REDEEMED，或 ISSUED → EXPIRED；REDEEMED 为终态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponStatus {
    #[default]
    Issued,
    Reserved,
    Redeemed,
    Expired,
}

impl CouponStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "ISSUED",
            Self::Reserved => "RESERVED",
            Self::Redeemed => "REDEEMED",
            Self::Expired => "EXPIRED",
        }
    }
}

/// 流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ActivityType {
    /// 直接按规则 ID 记账
    Rule,
    /// 按活动引用选出规则后记账
    Campaign,
    /// 优惠券核销
    Coupon,
}

/// 同步批次类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum SyncKind {
    Coupon,
    Transaction,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coupon => "coupon",
            Self::Transaction => "transaction",
        }
    }
}

/// 同步批次状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    /// 所有条目都已尝试（无论成败）
    Completed,
    /// 批次无法开始
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// 短信发送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum SmsStatus {
    Sent,
    Failed,
}

impl SmsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}
