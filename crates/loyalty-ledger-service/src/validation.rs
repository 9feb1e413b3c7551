//! 输入校验
//!
//! 每种输入类型一个显式校验函数，在边界处调用（HTTP DTO、批量同步条目）。
//! 校验失败统一返回 `LedgerError::Validation`。
//!
//! 标识类字段（客户 ID、订单号、券码）校验通过后返回去除首尾空白的值，
//! 幂等键与查询条件只使用规范化后的值。

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::models::{CouponSyncItem, OrderSnapshot, TransactionSyncItem};

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone regex is valid"));

static LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2}([-_][A-Za-z]{2,4})?$").expect("language regex is valid")
});

const MAX_ID_LEN: usize = 100;
const MAX_CUSTOMER_ID_LEN: usize = 64;
const MAX_CODE_LEN: usize = 64;

fn invalid(message: impl Into<String>) -> LedgerError {
    LedgerError::Validation(message.into())
}

fn require_text<'a>(field: &str, value: &'a str, max_len: usize) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{} 不能为空", field)));
    }
    if trimmed.chars().count() > max_len {
        return Err(invalid(format!("{} 长度不能超过 {}", field, max_len)));
    }
    Ok(trimmed)
}

fn require_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid(format!("{} 不能为负数", field)));
    }
    Ok(())
}

/// 规范化手机号
///
/// 去掉空格、横线、点和括号，前导 `00` 视为 `+`，要求 7 到 15 位数字
pub fn normalize_phone(raw: &str) -> Result<String> {
    let mut phone: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if let Some(rest) = phone.strip_prefix("00") {
        phone = format!("+{}", rest);
    }

    if PHONE_RE.is_match(&phone) {
        Ok(phone)
    } else {
        Err(invalid(format!("手机号格式不正确: {}", raw.trim())))
    }
}

/// 校验客户 ID，返回去除首尾空白后的值
pub fn validate_customer_id(customer_id: &str) -> Result<&str> {
    require_text("customerId", customer_id, MAX_CUSTOMER_ID_LEN)
}

pub fn validate_coupon_code(code: &str) -> Result<&str> {
    require_text("code", code, MAX_CODE_LEN)
}

pub fn validate_order_id(order_id: &str) -> Result<&str> {
    require_text("orderId", order_id, MAX_ID_LEN)
}

pub fn validate_language_code(language_code: &str) -> Result<()> {
    if LANGUAGE_RE.is_match(language_code.trim()) {
        Ok(())
    } else {
        Err(invalid(format!("语言代码不正确: {}", language_code)))
    }
}

/// 校验订单快照
pub fn validate_order(order: &OrderSnapshot) -> Result<()> {
    if let Some(order_id) = &order.order_id {
        validate_order_id(order_id)?;
    }
    require_non_negative("amount", order.amount)?;
    if let Some(subtotal) = order.subtotal {
        require_non_negative("subtotal", subtotal)?;
    }
    if let Some(discount) = order.discount {
        require_non_negative("discount", discount)?;
    }
    if let Some(count) = order.items_count
        && count < 0
    {
        return Err(invalid("itemsCount 不能为负数"));
    }
    for (idx, item) in order.items.iter().enumerate() {
        if item.sku.trim().is_empty() {
            return Err(invalid(format!("items[{}].sku 不能为空", idx)));
        }
        if item.quantity <= 0 {
            return Err(invalid(format!("items[{}].quantity 必须大于 0", idx)));
        }
        if let Some(price) = item.unit_price {
            require_non_negative(&format!("items[{}].unitPrice", idx), price)?;
        }
    }
    if let Some(delivery) = order.delivery_date
        && delivery < order.order_date
    {
        return Err(invalid("deliveryDate 不能早于 orderDate"));
    }
    Ok(())
}

/// 校验订单快照，返回订单号规范化后的副本
pub fn normalize_order(order: &OrderSnapshot) -> Result<OrderSnapshot> {
    validate_order(order)?;
    let mut normalized = order.clone();
    normalized.order_id = order.order_id.as_deref().map(|id| id.trim().to_string());
    Ok(normalized)
}

/// 校验事件记账请求
pub fn validate_event(event_name: &str, metadata: &Value) -> Result<()> {
    require_text("eventName", event_name, MAX_ID_LEN)?;
    if !metadata.is_object() {
        return Err(invalid("metadata 必须是 JSON 对象"));
    }
    Ok(())
}

/// 校验优惠券同步条目，返回规范化后的手机号
pub fn validate_coupon_sync_item(item: &CouponSyncItem) -> Result<String> {
    validate_coupon_code(&item.code)?;
    require_text("invoiceNo", &item.invoice_no, MAX_ID_LEN)?;
    normalize_phone(&item.customer_phone_no)
}

/// 校验交易同步条目，返回规范化后的手机号
///
/// rule_id 与 campaign_id 必须恰好提供一个
pub fn validate_transaction_sync_item(item: &TransactionSyncItem) -> Result<String> {
    require_text("invoiceNo", &item.invoice_no, MAX_ID_LEN)?;
    require_non_negative("amount", item.amount)?;
    if let Some(subtotal) = item.subtotal {
        require_non_negative("subtotal", subtotal)?;
    }
    match (item.rule_id, item.campaign_id) {
        (Some(_), None) | (None, Some(_)) => {}
        _ => return Err(invalid("ruleId 与 campaignId 必须且只能提供一个")),
    }
    normalize_phone(&item.customer_phone_no)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+966 50-123.4567").unwrap(), "+966501234567");
        assert_eq!(normalize_phone("00966 (50) 1234567").unwrap(), "+966501234567");
        assert_eq!(normalize_phone("0501234567").unwrap(), "0501234567");
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+1234567890123456").is_err());
        assert!(normalize_phone("abc-def-ghij").is_err());
        assert!(normalize_phone("").is_err());
    }

    #[test]
    fn test_validate_order() {
        let now = Utc::now();
        let ok = OrderSnapshot::new(Some("O-1".into()), "10".parse().unwrap(), now);
        assert!(validate_order(&ok).is_ok());

        let negative = OrderSnapshot::new(None, "-1".parse().unwrap(), now);
        assert!(matches!(
            validate_order(&negative),
            Err(LedgerError::Validation(_))
        ));

        let mut bad_dates = ok.clone();
        bad_dates.delivery_date = Some(now - Duration::days(1));
        assert!(validate_order(&bad_dates).is_err());

        let blank_id = OrderSnapshot::new(Some("  ".into()), "1".parse().unwrap(), now);
        assert!(validate_order(&blank_id).is_err());
    }

    #[test]
    fn test_identifiers_are_trimmed() {
        assert_eq!(validate_customer_id("  cust-1\t").unwrap(), "cust-1");
        assert_eq!(validate_coupon_code(" CB-10 ").unwrap(), "CB-10");
        assert_eq!(validate_order_id("O-1 ").unwrap(), "O-1");
        // 大小写保持原样，标识区分大小写
        assert_eq!(validate_customer_id("Cust-1").unwrap(), "Cust-1");
    }

    #[test]
    fn test_normalize_order_trims_order_id() {
        let order = OrderSnapshot::new(Some(" O-1  ".into()), "10".parse().unwrap(), Utc::now());
        let normalized = normalize_order(&order).unwrap();
        assert_eq!(normalized.order_id.as_deref(), Some("O-1"));
        assert_eq!(normalized.facts().order_id.as_deref(), Some("O-1"));
        assert_eq!(normalized.amount, order.amount);

        let anonymous = OrderSnapshot::new(None, "10".parse().unwrap(), Utc::now());
        assert_eq!(normalize_order(&anonymous).unwrap().order_id, None);
    }

    #[test]
    fn test_validate_event() {
        assert!(validate_event("signup", &json!({})).is_ok());
        assert!(validate_event("", &json!({})).is_err());
        assert!(validate_event("signup", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_validate_transaction_item_requires_one_reference() {
        let mut item = TransactionSyncItem {
            customer_phone_no: "+966501234567".into(),
            invoice_no: "INV-1".into(),
            amount: "100".parse().unwrap(),
            subtotal: None,
            rule_id: None,
            campaign_id: None,
            transaction_time: Utc::now(),
        };
        assert!(validate_transaction_sync_item(&item).is_err());

        item.rule_id = Some(1);
        assert_eq!(validate_transaction_sync_item(&item).unwrap(), "+966501234567");

        item.campaign_id = Some(uuid::Uuid::new_v4());
        assert!(validate_transaction_sync_item(&item).is_err());
    }

    #[test]
    fn test_validate_language_code() {
        assert!(validate_language_code("en").is_ok());
        assert!(validate_language_code("ar-SA").is_ok());
        assert!(validate_language_code("english").is_err());
    }
}
