//! 数据库仓储层
//!
//! 提供所有实体的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 每个查询都按 `TenantScope` 严格过滤
//! - 需要原子性的写入（优惠券核销、余额校验扣减）在仓储内部开启事务
//! - 定义 trait 接口以支持 mock 测试，`memory` 提供完整的内存实现

mod activity_repo;
mod catalog_repo;
mod coupon_repo;
mod customer_repo;
pub mod memory;
mod messaging_repo;
mod sync_log_repo;
mod tenant_repo;
mod traits;

pub use activity_repo::ActivityRepository;
pub use catalog_repo::CatalogRepository;
pub use coupon_repo::CouponRepository;
pub use customer_repo::CustomerRepository;
pub use memory::InMemoryBackend;
pub use messaging_repo::{OtpRepository, SmsLogRepository};
pub use sync_log_repo::SyncLogRepository;
pub use tenant_repo::TenantDirectoryRepository;
pub use traits::*;
