//! 通知渠道
//!
//! 目前只有模拟的 App Push 渠道。短信不走这里，见 `notification::sms`。

mod app_push;

pub use app_push::AppPushChannel;

use async_trait::async_trait;

use super::types::{ChannelResult, ChannelType, Notification};
use crate::error::Result;

/// 通知渠道 trait
///
/// 发送失败应返回 `ChannelResult::failed` 而非 Err，Err 只用于渠道自身异常
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> ChannelType;

    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    async fn is_available(&self, notification: &Notification) -> bool;

    async fn send(&self, notification: &Notification) -> Result<ChannelResult>;
}

/// 渠道配置
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl ChannelConfig {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timeout_ms: 5000,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}
