//! 服务层数据传输对象

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SmsStatus;

/// 单页最大条数
pub const MAX_PAGE_SIZE: i64 = 100;

/// 允许请求的最大页码，offset 最大为 `(MAX_PAGE - 1) * MAX_PAGE_SIZE`
pub const MAX_PAGE: i64 = 100_000;

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// 页码，限制在 1..=MAX_PAGE
    pub fn page(&self) -> i64 {
        self.page.clamp(1, MAX_PAGE)
    }

    /// 请求的页码是否超出上限
    pub fn is_out_of_range(&self) -> bool {
        self.page > MAX_PAGE
    }

    /// 每页条数，限制在 1..=100
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let page_size = pagination.limit();
        Self {
            items,
            total,
            page: pagination.page(),
            page_size,
            total_pages: (total + page_size - 1) / page_size,
        }
    }
}

/// 客户余额
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDto {
    pub customer_id: String,
    pub balance: rust_decimal::Decimal,
}

/// 验证码下发结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssued {
    pub phone_no: String,
    pub expires_at: DateTime<Utc>,
    pub sms_log_id: i64,
    pub sms_status: SmsStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(0, 500);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 100);
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);

        let p = Pagination::new(2, 0);
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 1);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let p = Pagination::new(i64::MAX, 100);
        assert!(p.is_out_of_range());
        assert_eq!(p.page(), MAX_PAGE);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * MAX_PAGE_SIZE);

        let p = Pagination::new(i64::MIN, i64::MAX);
        assert!(!p.is_out_of_range());
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), MAX_PAGE_SIZE);

        assert!(!Pagination::new(MAX_PAGE, 100).is_out_of_range());
    }

    #[test]
    fn test_page_total_pages() {
        let page = Page::new(vec![1, 2, 3], 101, Pagination::new(1, 10));
        assert_eq!(page.total_pages, 11);

        let empty = Page::<i32>::new(vec![], 0, Pagination::default());
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.page_size, 20);
    }
}
