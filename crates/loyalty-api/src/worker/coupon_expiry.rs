//! 优惠券过期处理 Worker
//!
//! 定期把已过期但仍为 issued 的优惠券标记为 expired，
//! 每张券的状态变更都写入 coupon_status_logs。
//! 仓储按批加锁（`FOR UPDATE SKIP LOCKED`），多实例部署时不会重复处理。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loyalty_ledger::Result;
use loyalty_ledger::repository::CouponRepositoryTrait;
use loyalty_shared::observability::metrics;
use tracing::{error, info};

/// 单轮最多连续处理的批次数，剩余的留到下一轮
const MAX_BATCHES_PER_RUN: usize = 50;

pub struct CouponExpiryWorker {
    coupons: Arc<dyn CouponRepositoryTrait>,
    poll_interval: Duration,
    batch_size: i64,
}

impl CouponExpiryWorker {
    pub fn new(
        coupons: Arc<dyn CouponRepositoryTrait>,
        poll_interval_secs: u64,
        batch_size: i64,
    ) -> Self {
        Self {
            coupons,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            batch_size: batch_size.max(1),
        }
    }

    /// 主循环：持续处理直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "CouponExpiryWorker 已启动"
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "处理过期优惠券出错");
            }

            metrics::set_worker_last_run("coupon_expiry_worker");

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 处理一轮，返回本轮过期的优惠券数量
    pub async fn run_once(&self) -> Result<u64> {
        let now = Utc::now();
        let mut total = 0u64;

        for _ in 0..MAX_BATCHES_PER_RUN {
            let expired = self.coupons.expire_due(now, self.batch_size).await?;
            total += expired;
            if expired < self.batch_size as u64 {
                break;
            }
        }

        if total > 0 {
            metrics::record_coupons_expired(total);
            info!(count = total, "已过期优惠券处理完成");
        }
        Ok(total)
    }
}
