//! 租户作用域相关实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::TenantStatus;

/// 租户作用域
///
/// 每个账本与目录调用都显式携带，请求解析后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantScope {
    pub tenant_id: i64,
    pub business_unit_id: i64,
}

impl TenantScope {
    pub fn new(tenant_id: i64, business_unit_id: i64) -> Self {
        Self {
            tenant_id,
            business_unit_id,
        }
    }
}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.business_unit_id)
    }
}

/// 租户目录记录
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: i64,
    /// 子域名首段，全局唯一
    pub domain_label: String,
    pub tenant_id: i64,
    pub business_unit_id: i64,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.tenant_id, self.business_unit_id)
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}

/// 请求来源
///
/// 从 HTTP 请求中提取的原始租户线索，尚未经过目录解析
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    /// Host 头（可能带端口）
    pub host: Option<String>,
    /// 历史遗留的租户标识请求头
    pub tenant_header: Option<String>,
}

impl RequestOrigin {
    pub fn new(host: Option<String>, tenant_header: Option<String>) -> Self {
        Self {
            host,
            tenant_header,
        }
    }

    /// 提取租户标识：子域名首段优先，其次请求头
    pub fn tenant_label(&self) -> Option<String> {
        self.host
            .as_deref()
            .and_then(subdomain_label)
            .or_else(|| {
                self.tenant_header
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_ascii_lowercase)
            })
    }
}

/// 从 Host 中取出子域名首段
///
/// 去掉端口并转小写；至少三段且不是 IP 地址时才返回首段
pub fn subdomain_label(host: &str) -> Option<String> {
    let host = host.trim();
    if host.starts_with('[') {
        // IPv6 字面量
        return None;
    }
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();
    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(labels[0].to_string())
}
