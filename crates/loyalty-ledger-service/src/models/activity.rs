//! 客户积分流水与订单凭证
//!
//! 流水只追加、不修改；更正通过追加冲正流水完成。
//! 订单快照作为不透明凭证存入 meta，逻辑上只读取其中的类型化子集。

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::ActivityType;
use super::tenant::TenantScope;

/// 凭证信封版本
pub const EVIDENCE_VERSION: u32 = 1;

/// 金额统一保留两位小数，四舍五入（0.125 → 0.13）
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// 客户积分流水
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerActivity {
    pub id: i64,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub customer_id: String,
    #[sqlx(default)]
    pub campaign_id: Option<Uuid>,
    #[sqlx(default)]
    pub coupon_id: Option<Uuid>,
    #[sqlx(default)]
    pub rule_id: Option<i64>,
    #[sqlx(default)]
    pub rule_name: Option<String>,
    #[sqlx(default)]
    pub order_id: Option<String>,
    /// 幂等目标：`rule:<id>` 或 `coupon:<uuid>`
    #[serde(skip)]
    pub target_ref: String,
    /// 带符号金额，消耗为负
    pub amount: Decimal,
    pub activity_type: ActivityType,
    /// 版本化凭证信封
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl CustomerActivity {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    /// 从凭证中提取类型化事实
    pub fn facts(&self) -> EvidenceFacts {
        EvidenceFacts::from_meta(&self.meta)
    }
}

/// 待写入的流水
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub scope: TenantScope,
    pub customer_id: String,
    pub campaign_id: Option<Uuid>,
    pub coupon_id: Option<Uuid>,
    pub rule_id: Option<i64>,
    pub rule_name: Option<String>,
    pub order_id: Option<String>,
    pub target_ref: String,
    pub amount: Decimal,
    pub activity_type: ActivityType,
    pub meta: Value,
}

impl NewActivity {
    pub fn rule_target(rule_id: i64) -> String {
        format!("rule:{}", rule_id)
    }

    pub fn coupon_target(coupon_id: Uuid) -> String {
        format!("coupon:{}", coupon_id)
    }

    /// 幂等键，无订单号时不存在
    pub fn idempotency_key(&self) -> Option<IdempotencyKey> {
        self.order_id.as_ref().map(|order_id| IdempotencyKey {
            scope: self.scope,
            customer_id: self.customer_id.clone(),
            order_id: order_id.clone(),
            target_ref: self.target_ref.clone(),
        })
    }
}

/// (客户, 订单, 规则|优惠券) 幂等键，限定在作用域内
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub scope: TenantScope,
    pub customer_id: String,
    pub order_id: String,
    pub target_ref: String,
}

/// 订单行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
}

/// 订单快照
///
/// 不可变输入，原样存为凭证
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_count: Option<i32>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    pub order_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    /// 只有金额与订单号的最小快照
    pub fn new(order_id: Option<String>, amount: Decimal, order_date: DateTime<Utc>) -> Self {
        Self {
            order_id,
            amount,
            subtotal: None,
            discount: None,
            items_count: None,
            items: Vec::new(),
            status: None,
            payment_method: None,
            order_date,
            delivery_date: None,
        }
    }

    pub fn with_subtotal(mut self, subtotal: Decimal) -> Self {
        self.subtotal = Some(subtotal);
        self
    }

    pub fn facts(&self) -> EvidenceFacts {
        EvidenceFacts {
            amount: Some(self.amount),
            subtotal: self.subtotal,
            order_id: self.order_id.clone(),
        }
    }
}

/// 版本化凭证信封
///
/// 序列化后形如 `{"v":1,"kind":"order","order":{...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub v: u32,
    #[serde(flatten)]
    pub body: EvidenceBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EvidenceBody {
    Order {
        order: OrderSnapshot,
        #[serde(
            default,
            rename = "couponCode",
            skip_serializing_if = "Option::is_none"
        )]
        coupon_code: Option<String>,
    },
    Event {
        #[serde(rename = "eventName")]
        event_name: String,
        metadata: Value,
    },
}

impl Evidence {
    pub fn order(order: &OrderSnapshot) -> Self {
        Self {
            v: EVIDENCE_VERSION,
            body: EvidenceBody::Order {
                order: order.clone(),
                coupon_code: None,
            },
        }
    }

    pub fn coupon(order: &OrderSnapshot, code: &str) -> Self {
        Self {
            v: EVIDENCE_VERSION,
            body: EvidenceBody::Order {
                order: order.clone(),
                coupon_code: Some(code.to_string()),
            },
        }
    }

    pub fn event(event_name: &str, metadata: &Value) -> Self {
        Self {
            v: EVIDENCE_VERSION,
            body: EvidenceBody::Event {
                event_name: event_name.to_string(),
                metadata: metadata.clone(),
            },
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// 从凭证中读取的类型化子集
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceFacts {
    pub amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub order_id: Option<String>,
}

impl EvidenceFacts {
    /// 计算奖励的基数：优先小计，其次总额
    pub fn base(&self) -> Decimal {
        self.subtotal.or(self.amount).unwrap_or(Decimal::ZERO)
    }

    /// 从事件元数据中读取（amount / subtotal / orderId，兼容 order_id）
    pub fn from_event_metadata(metadata: &Value) -> Self {
        Self {
            amount: decimal_field(metadata, "amount"),
            subtotal: decimal_field(metadata, "subtotal"),
            order_id: metadata
                .get("orderId")
                .or_else(|| metadata.get("order_id"))
                .and_then(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
        }
    }

    /// 从已存储的信封中读取，未知版本或格式返回空事实
    pub fn from_meta(meta: &Value) -> Self {
        match serde_json::from_value::<Evidence>(meta.clone()) {
            Ok(Evidence {
                body: EvidenceBody::Order { order, .. },
                ..
            }) => order.facts(),
            Ok(Evidence {
                body: EvidenceBody::Event { metadata, .. },
                ..
            }) => Self::from_event_metadata(&metadata),
            Err(_) => Self::default(),
        }
    }
}

fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 账本操作回执
///
/// 重放时返回原流水且 `replayed = true`，不视为错误
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub activity: CustomerActivity,
    pub replayed: bool,
}

impl LedgerReceipt {
    pub fn created(activity: CustomerActivity) -> Self {
        Self {
            activity,
            replayed: false,
        }
    }

    pub fn replayed(activity: CustomerActivity) -> Self {
        Self {
            activity,
            replayed: true,
        }
    }
}

/// 流水查询过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub activity_type: Option<ActivityType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &CustomerActivity) -> bool {
        self.activity_type.is_none_or(|t| activity.activity_type == t)
            && self.from.is_none_or(|from| activity.created_at >= from)
            && self.to.is_none_or(|to| activity.created_at < to)
    }
}
