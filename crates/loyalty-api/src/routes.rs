//! 路由配置模块
//!
//! 业务接口挂在 `/api/v1` 下，健康检查在根路径

use std::time::Duration;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use loyalty_shared::config::ServerConfig;
use loyalty_shared::observability::middleware as obs_middleware;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::handlers::{coupon, customer, health, ledger, otp, sync};
use crate::state::AppState;

/// 积分记账路由
fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/ledger/earn", post(ledger::earn))
        .route("/ledger/burn", post(ledger::burn))
        .route("/ledger/events", post(ledger::record_event))
}

/// 优惠券路由
fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/coupons/redeem", post(coupon::redeem))
        .route("/coupons/reserve", post(coupon::reserve))
}

/// 批量同步路由
fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/coupons", post(sync::sync_coupons))
        .route("/sync/transactions", post(sync::sync_transactions))
        .route("/sync/logs/{id}", get(sync::get_sync_log))
}

/// 客户查询与验证码路由
fn customer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/customers/{customer_id}/activities",
            get(customer::list_activities),
        )
        .route("/customers/{customer_id}/balance", get(customer::get_balance))
        .route("/otp", post(otp::issue_otp))
}

/// 构建所有 API 路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(ledger_routes())
        .merge(coupon_routes())
        .merge(sync_routes())
        .merge(customer_routes())
}

/// 按配置的来源列表构建 CORS
pub fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// 组装完整应用
pub fn app(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_seconds.max(1),
        )))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&server.cors_allowed_origins))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
