//! App Push 通知渠道
//!
//! 模拟实现：记录日志并返回生成的消息 ID，不接入真实推送服务。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChannelConfig, NotificationChannel};
use crate::error::{LedgerError, Result};
use crate::notification::types::{ChannelResult, ChannelType, Notification};

pub struct AppPushChannel {
    config: ChannelConfig,
}

impl AppPushChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChannelConfig::new(true).with_timeout(3000))
    }

    async fn push(&self, notification: &Notification) -> Result<String> {
        debug!(
            notification_id = %notification.notification_id,
            customer_id = %notification.customer_id,
            title = %notification.title,
            "App Push 发送中..."
        );

        let simulated = tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            tokio::time::sleep(Duration::from_millis(5)),
        )
        .await;
        if simulated.is_err() {
            return Err(LedgerError::Internal("App Push 发送超时".to_string()));
        }

        let message_id = format!("push_{}", Uuid::new_v4());
        info!(
            notification_id = %notification.notification_id,
            message_id = %message_id,
            "App Push 发送成功"
        );
        Ok(message_id)
    }
}

#[async_trait]
impl NotificationChannel for AppPushChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::AppPush
    }

    fn name(&self) -> &str {
        "App Push"
    }

    async fn is_available(&self, notification: &Notification) -> bool {
        if !self.config.enabled {
            warn!(
                notification_id = %notification.notification_id,
                "App Push 渠道已禁用"
            );
            return false;
        }
        true
    }

    async fn send(&self, notification: &Notification) -> Result<ChannelResult> {
        let start = Instant::now();

        if !self.is_available(notification).await {
            return Ok(ChannelResult::skipped(self.channel_type(), "渠道不可用或已禁用"));
        }

        match self.push(notification).await {
            Ok(message_id) => Ok(ChannelResult::success(
                self.channel_type(),
                Some(message_id),
                start.elapsed().as_millis() as u64,
            )),
            Err(e) => Ok(ChannelResult::failed(
                self.channel_type(),
                e.to_string(),
                start.elapsed().as_millis() as u64,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TenantScope;
    use crate::notification::types::{NotificationKind, SendStatus};
    use std::collections::HashMap;

    fn notification() -> Notification {
        Notification::new(
            TenantScope::new(1, 1),
            "cust-1",
            NotificationKind::PointsEarned,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn test_app_push_success() {
        let channel = AppPushChannel::with_defaults();
        let result = channel.send(&notification()).await.unwrap();
        assert_eq!(result.status, SendStatus::Success);
        assert!(result.message_id.unwrap().starts_with("push_"));
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped() {
        let channel = AppPushChannel::new(ChannelConfig::new(false));
        let result = channel.send(&notification()).await.unwrap();
        assert_eq!(result.status, SendStatus::Skipped);
    }
}
