//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时（如单元测试）所有记录函数都是空操作。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "ledger_operations_total",
        "Ledger operations by operation and outcome"
    );
    metrics::describe_histogram!(
        "ledger_operation_duration_seconds",
        "Ledger operation duration in seconds"
    );

    metrics::describe_counter!("sync_batches_total", "Reconciliation batches by kind and status");
    metrics::describe_counter!("sync_items_total", "Reconciliation items by kind and outcome");

    metrics::describe_counter!("sms_sends_total", "SMS dispatch attempts by provider and status");
    metrics::describe_counter!("coupons_expired_total", "Coupons moved to EXPIRED by the worker");
    metrics::describe_gauge!("worker_last_run_timestamp", "Unix timestamp of the last worker run");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录账本操作
///
/// outcome 取值：created / replayed / 错误码
#[inline]
pub fn record_ledger_operation(operation: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "ledger_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "ledger_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// 记录同步批次结果
#[inline]
pub fn record_sync_batch(kind: &str, status: &str, success: u64, failed: u64) {
    metrics::counter!(
        "sync_batches_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::counter!(
        "sync_items_total",
        "kind" => kind.to_string(),
        "outcome" => "success"
    )
    .increment(success);

    metrics::counter!(
        "sync_items_total",
        "kind" => kind.to_string(),
        "outcome" => "failed"
    )
    .increment(failed);
}

/// 记录短信发送
#[inline]
pub fn record_sms_send(provider: &str, status: &str) {
    metrics::counter!(
        "sms_sends_total",
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录过期的优惠券数量
#[inline]
pub fn record_coupons_expired(count: u64) {
    metrics::counter!("coupons_expired_total").increment(count);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_ledger_operation("earn", "created", 0.01);
        record_sync_batch("coupon", "completed", 3, 1);
        record_sms_send("simulated", "sent");
        record_coupons_expired(2);
        set_worker_last_run("coupon_expiry_worker");
        assert!(get_handle().is_none());
    }
}
