//! 应用状态定义
//!
//! 服务在启动时按仓储实现（PostgreSQL 或内存）组装一次，handler 间通过 Arc 共享

use std::sync::Arc;
use std::time::Duration;

use loyalty_ledger::notification::{SmsDispatcher, SmsGateway, TemplateEngine};
use loyalty_ledger::repository::{
    ActivityRepository, ActivityRepositoryTrait, CatalogRepository, CatalogRepositoryTrait,
    CouponRepository, CouponRepositoryTrait, CustomerRepository, CustomerRepositoryTrait,
    InMemoryBackend, OtpRepository, OtpRepositoryTrait, SmsLogRepository, SmsLogRepositoryTrait,
    SyncLogRepository, SyncLogRepositoryTrait, TenantDirectoryRepository, TenantDirectoryTrait,
};
use loyalty_ledger::service::{
    CatalogService, LedgerService, OtpService, QueryService, SyncReconciler, TenantResolver,
};
use loyalty_shared::config::AppConfig;
use loyalty_shared::database::Database;
use sqlx::PgPool;

/// 各仓储的具体实现
#[derive(Clone)]
pub struct Repositories {
    pub tenants: Arc<dyn TenantDirectoryTrait>,
    pub catalog: Arc<dyn CatalogRepositoryTrait>,
    pub activities: Arc<dyn ActivityRepositoryTrait>,
    pub coupons: Arc<dyn CouponRepositoryTrait>,
    pub customers: Arc<dyn CustomerRepositoryTrait>,
    pub sync_logs: Arc<dyn SyncLogRepositoryTrait>,
    pub sms_logs: Arc<dyn SmsLogRepositoryTrait>,
    pub otps: Arc<dyn OtpRepositoryTrait>,
}

impl Repositories {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            tenants: Arc::new(TenantDirectoryRepository::new(pool.clone())),
            catalog: Arc::new(CatalogRepository::new(pool.clone())),
            activities: Arc::new(ActivityRepository::new(pool.clone())),
            coupons: Arc::new(CouponRepository::new(pool.clone())),
            customers: Arc::new(CustomerRepository::new(pool.clone())),
            sync_logs: Arc::new(SyncLogRepository::new(pool.clone())),
            sms_logs: Arc::new(SmsLogRepository::new(pool.clone())),
            otps: Arc::new(OtpRepository::new(pool.clone())),
        }
    }

    pub fn in_memory(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            tenants: backend.clone(),
            catalog: backend.clone(),
            activities: backend.clone(),
            coupons: backend.clone(),
            customers: backend.clone(),
            sync_logs: backend.clone(),
            sms_logs: backend.clone(),
            otps: backend,
        }
    }
}

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    pub ledger: Arc<LedgerService>,
    pub reconciler: Arc<SyncReconciler>,
    pub query: Arc<QueryService>,
    pub otp: Arc<OtpService>,
    /// 历史遗留的租户标识请求头名称（小写）
    pub tenant_header: Arc<str>,
    /// 内存模式下为空，就绪探针跳过数据库检查
    pub database: Option<Database>,
}

impl AppState {
    /// 按配置组装全部服务
    pub fn build(
        repos: &Repositories,
        config: &AppConfig,
        sms_gateway: Arc<dyn SmsGateway>,
    ) -> Self {
        let resolver = Arc::new(TenantResolver::new(repos.tenants.clone(), &config.tenant));
        let catalog = Arc::new(CatalogService::new(
            repos.catalog.clone(),
            Duration::from_millis(config.ledger.lookup_timeout_ms),
        ));
        let ledger = Arc::new(LedgerService::new(
            catalog,
            repos.activities.clone(),
            repos.coupons.clone(),
            &config.ledger,
        ));
        let reconciler = Arc::new(SyncReconciler::new(
            ledger.clone(),
            repos.customers.clone(),
            repos.sync_logs.clone(),
            resolver.clone(),
            &config.ledger,
        ));
        let query = Arc::new(QueryService::new(
            repos.activities.clone(),
            repos.sync_logs.clone(),
        ));

        let dispatcher = SmsDispatcher::new(
            sms_gateway,
            repos.sms_logs.clone(),
            Arc::new(TemplateEngine::with_defaults()),
            config.sms.sender_id.clone(),
        )
        .with_validity_minutes((config.otp.ttl_seconds + 59) / 60);
        let otp = Arc::new(OtpService::new(
            repos.otps.clone(),
            Arc::new(dispatcher),
            &config.otp,
        ));

        Self {
            resolver,
            ledger,
            reconciler,
            query,
            otp,
            tenant_header: Arc::from(config.tenant.header_name.to_ascii_lowercase()),
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}
