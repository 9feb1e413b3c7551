//! 账本服务领域模型
//!
//! 包含租户、目录、流水、同步日志与短信审计等核心实体

pub mod activity;
pub mod catalog;
pub mod customer;
pub mod enums;
pub mod messaging;
pub mod sync;
pub mod tenant;

pub use activity::{
    ActivityFilter, CustomerActivity, Evidence, EvidenceBody, EvidenceFacts, IdempotencyKey,
    LedgerReceipt, NewActivity, OrderItem, OrderSnapshot, round_money,
};
pub use catalog::{Campaign, Coupon, CouponStatusLog, Rule, RuleRef};
pub use customer::Customer;
pub use enums::{
    ActivityType, CampaignStatus, CampaignType, CouponStatus, CouponTypeName, CustomerStatus,
    RewardKind, RuleDirection, SmsStatus, SyncKind, SyncStatus, TenantStatus,
};
pub use messaging::{NewOtpCode, NewSmsLog, OtpCode, SmsLog};
pub use sync::{CouponSyncItem, NewSyncLog, SyncItemResult, SyncLog, TransactionSyncItem};
pub use tenant::{RequestOrigin, TenantRecord, TenantScope, subdomain_label};
