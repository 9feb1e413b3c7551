//! 租户解析
//!
//! 请求来源 → 子域名首段（或历史请求头）→ 租户目录 → `TenantScope`。
//! 缺失标识、未知标识、租户已暂停、目录查询超时都返回 `UnauthorizedScope`。
//!
//! `tenant.cache_ttl_secs` 为 0（默认）时每次都查询目录，暂停立即生效。
//! 大于 0 时解析成功的结果在本地缓存该时长，暂停最多延迟一个 TTL 才生效。

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use loyalty_shared::config::TenantConfig;
use tracing::{debug, error, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::models::{RequestOrigin, TenantScope};
use crate::repository::TenantDirectoryTrait;

pub struct TenantResolver {
    directory: Arc<dyn TenantDirectoryTrait>,
    lookup_timeout: Duration,
    cache_ttl: Duration,
    cache: DashMap<String, (TenantScope, Instant)>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectoryTrait>, config: &TenantConfig) -> Self {
        Self {
            directory,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: DashMap::new(),
        }
    }

    /// 解析请求来源
    pub async fn resolve(&self, origin: &RequestOrigin) -> Result<TenantScope> {
        let Some(label) = origin.tenant_label() else {
            debug!(host = ?origin.host, "请求未携带租户标识");
            return Err(LedgerError::UnauthorizedScope);
        };
        self.resolve_label(&label).await
    }

    #[instrument(skip(self))]
    pub async fn resolve_label(&self, label: &str) -> Result<TenantScope> {
        if let Some(scope) = self.cached(label) {
            return Ok(scope);
        }

        let lookup = self.directory.resolve_by_domain(label);
        let record = match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Err(_) => {
                warn!(
                    label,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "租户目录查询超时"
                );
                return Err(LedgerError::UnauthorizedScope);
            }
            Ok(Err(e)) => {
                error!(label, error = %e, "租户目录查询失败");
                return Err(LedgerError::LedgerUnavailable);
            }
            Ok(Ok(record)) => record,
        };

        match record {
            Some(record) if record.is_active() => {
                let scope = record.scope();
                if !self.cache_ttl.is_zero() {
                    self.cache.insert(label.to_string(), (scope, Instant::now()));
                }
                debug!(label, scope = %scope, "租户解析成功");
                Ok(scope)
            }
            Some(_) => {
                warn!(label, "租户已暂停");
                Err(LedgerError::UnauthorizedScope)
            }
            None => {
                debug!(label, "未知的租户标识");
                Err(LedgerError::UnauthorizedScope)
            }
        }
    }

    fn cached(&self, label: &str) -> Option<TenantScope> {
        let (scope, cached_at) = *self.cache.get(label)?;
        if cached_at.elapsed() < self.cache_ttl {
            Some(scope)
        } else {
            self.cache.remove(label);
            None
        }
    }
}
