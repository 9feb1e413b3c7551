//! 积分账本 HTTP 服务入口
//!
//! 启动顺序：配置 → 可观测性 → 数据库与迁移 → 服务组装 → 后台任务 → HTTP

use std::sync::Arc;

use loyalty_api::worker::CouponExpiryWorker;
use loyalty_api::{AppState, Repositories, app};
use loyalty_ledger::notification::build_gateway;
use loyalty_ledger::{MIGRATOR, NotificationSender, NotificationService};
use loyalty_shared::config::AppConfig;
use loyalty_shared::database::Database;
use loyalty_shared::observability;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(loyalty_api::handlers::health::SERVICE_NAME)?;

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        "Starting loyalty-api on {}",
        config.server_addr()
    );

    if config.is_production() && config.server.cors_allowed_origins.trim() == "*" {
        warn!("server.cors_allowed_origins=\"*\" 在生产环境中不安全，请设置为具体域名");
    }
    if config.is_production() && config.sms.provider == "simulated" {
        warn!("生产环境使用模拟短信网关，验证码不会真正发出");
    }

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations(&MIGRATOR).await?;
    }

    let repos = Repositories::postgres(db.pool());
    let sms_gateway = build_gateway(&config.sms)?;
    let state = AppState::build(&repos, &config, sms_gateway).with_database(db.clone());

    // 流水提交后的客户通知，失败只记日志
    let notification_service = Arc::new(NotificationService::with_defaults());
    state
        .ledger
        .set_notification_sender(Arc::new(NotificationSender::new(notification_service)))
        .await;

    if config.coupon_expiry.enabled {
        let worker = CouponExpiryWorker::new(
            repos.coupons.clone(),
            config.coupon_expiry.poll_interval_secs,
            config.coupon_expiry.batch_size,
        );
        tokio::spawn(async move { worker.run().await });
        info!("CouponExpiryWorker spawned");
    }

    let router = app(state, &config.server);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 收到 SIGTERM 或 Ctrl+C 后停止接收新连接，等待已有请求处理完毕
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("注册 Ctrl+C 处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("注册 SIGTERM 处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
