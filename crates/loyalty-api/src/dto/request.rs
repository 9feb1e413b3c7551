//! 请求 DTO 定义
//!
//! 每种请求一个 `Validate` 实现，校验逻辑统一委托给账本的 `validation` 模块，
//! 在进入账本之前调用。

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use loyalty_ledger::dto::Pagination;
use loyalty_ledger::validation;
use loyalty_ledger::{
    ActivityFilter, ActivityType, CouponSyncItem, LedgerError, OrderSnapshot, RuleRef,
    TransactionSyncItem,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

/// 收集各字段的校验结果
struct Checks(ValidationErrors);

impl Default for Checks {
    fn default() -> Self {
        Self(ValidationErrors::new())
    }
}

impl Checks {
    fn field<T>(mut self, name: &'static str, result: loyalty_ledger::Result<T>) -> Self {
        if let Err(e) = result {
            let message = match e {
                LedgerError::Validation(msg) => msg,
                other => other.to_string(),
            };
            self.0
                .add(name, ValidationError::new("invalid").with_message(Cow::Owned(message)));
        }
        self
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}

/// 积分累积请求
///
/// ruleId 与 campaignId 必须且只能提供一个
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnRequest {
    pub customer_id: String,
    pub rule_id: Option<i64>,
    pub campaign_id: Option<Uuid>,
    pub order: OrderSnapshot,
}

impl EarnRequest {
    /// 记账目标，校验与处理器共用
    pub fn rule_ref(&self) -> loyalty_ledger::Result<RuleRef> {
        match (self.rule_id, self.campaign_id) {
            (Some(rule_id), None) => Ok(RuleRef::Rule(rule_id)),
            (None, Some(campaign_id)) => Ok(RuleRef::Campaign(campaign_id)),
            _ => Err(LedgerError::Validation(
                "ruleId 与 campaignId 必须且只能提供一个".to_string(),
            )),
        }
    }
}

impl Validate for EarnRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Checks::default()
            .field("customerId", validation::validate_customer_id(&self.customer_id))
            .field("ruleId", self.rule_ref())
            .field("order", validation::validate_order(&self.order))
            .finish()
    }
}

/// 积分消耗请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub customer_id: String,
    pub rule_id: i64,
    pub order: OrderSnapshot,
}

impl Validate for BurnRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Checks::default()
            .field("customerId", validation::validate_customer_id(&self.customer_id))
            .field("order", validation::validate_order(&self.order))
            .finish()
    }
}

/// 事件记账请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub customer_id: String,
    pub event_name: String,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Validate for EventRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Checks::default()
            .field("customerId", validation::validate_customer_id(&self.customer_id))
            .field("eventName", validation::validate_event(&self.event_name, &self.metadata))
            .finish()
    }
}

/// 优惠券核销请求
///
/// 核销必须带订单号
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemCouponRequest {
    pub customer_id: String,
    pub code: String,
    pub order: OrderSnapshot,
}

impl Validate for RedeemCouponRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let order_id = match self.order.order_id.as_deref() {
            Some(_) => validation::validate_order(&self.order),
            None => Err(LedgerError::Validation("核销优惠券必须提供 orderId".to_string())),
        };
        Checks::default()
            .field("customerId", validation::validate_customer_id(&self.customer_id))
            .field("code", validation::validate_coupon_code(&self.code))
            .field("order", order_id)
            .finish()
    }
}

/// 优惠券预留请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveCouponRequest {
    pub customer_id: String,
    pub code: String,
    pub order_id: String,
}

impl Validate for ReserveCouponRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Checks::default()
            .field("customerId", validation::validate_customer_id(&self.customer_id))
            .field("code", validation::validate_coupon_code(&self.code))
            .field("orderId", validation::validate_order_id(&self.order_id))
            .finish()
    }
}

/// 优惠券同步请求
///
/// 条目在批次内逐条校验，空批次与超限批次也要留下失败的同步日志
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSyncRequest {
    pub items: Vec<CouponSyncItem>,
}

/// 交易同步请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSyncRequest {
    pub items: Vec<TransactionSyncItem>,
}

/// 客户流水查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub activity_type: Option<ActivityType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ActivityQuery {
    pub fn filter(&self) -> ActivityFilter {
        ActivityFilter {
            activity_type: self.activity_type,
            from: self.from,
            to: self.to,
        }
    }

    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination::new(
            self.page.unwrap_or(defaults.page),
            self.page_size.unwrap_or(defaults.page_size),
        )
    }
}

/// 验证码下发请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub phone_no: String,
    #[serde(default = "default_language")]
    pub language_code: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl Validate for OtpRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Checks::default()
            .field("phoneNo", validation::normalize_phone(&self.phone_no))
            .field("languageCode", validation::validate_language_code(&self.language_code))
            .finish()
    }
}
