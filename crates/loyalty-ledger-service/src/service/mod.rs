//! 账本服务层
//!
//! 所有入口都显式携带 `TenantScope`，HTTP 层只负责解析作用域与参数。

pub mod catalog_service;
pub mod dto;
pub mod ledger_service;
pub mod otp_service;
pub mod query_service;
pub mod reconciler;
pub mod reward;
pub mod tenant_resolver;

pub use catalog_service::CatalogService;
pub use dto::{BalanceDto, MAX_PAGE, MAX_PAGE_SIZE, OtpIssued, Page, Pagination};
pub use ledger_service::LedgerService;
pub use otp_service::OtpService;
pub use query_service::QueryService;
pub use reconciler::SyncReconciler;
pub use reward::{compute_reward, signed_amount};
pub use tenant_resolver::TenantResolver;
