//! 通知服务
//!
//! 先用模板引擎渲染，再并行发送到通知指定的各个渠道。
//! 单个渠道失败只体现在结果里，不影响其他渠道。

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use super::channels::{AppPushChannel, NotificationChannel};
use super::template::TemplateEngine;
use super::types::{ChannelResult, Notification, NotificationResult};
use crate::error::Result;

pub struct NotificationService {
    channels: Vec<Arc<dyn NotificationChannel>>,
    template_engine: Arc<TemplateEngine>,
}

impl NotificationService {
    pub fn new(template_engine: Arc<TemplateEngine>) -> Self {
        Self {
            channels: Vec::new(),
            template_engine,
        }
    }

    /// 默认模板 + App Push 渠道
    pub fn with_defaults() -> Self {
        let mut service = Self::new(Arc::new(TemplateEngine::with_defaults()));
        service.register_channel(Arc::new(AppPushChannel::with_defaults()));
        service
    }

    pub fn register_channel(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(
            channel_type = ?channel.channel_type(),
            channel_name = channel.name(),
            "注册通知渠道"
        );
        self.channels.push(channel);
    }

    pub fn template_engine(&self) -> Arc<TemplateEngine> {
        self.template_engine.clone()
    }

    #[instrument(
        skip(self, notification),
        fields(
            notification_id = %notification.notification_id,
            customer_id = %notification.customer_id,
            kind = ?notification.kind
        )
    )]
    pub async fn send(&self, notification: Notification) -> Result<NotificationResult> {
        let start = Instant::now();
        let rendered = self.render(notification);

        let targets: Vec<_> = self
            .channels
            .iter()
            .filter(|c| rendered.channels.contains(&c.channel_type()))
            .cloned()
            .collect();

        if targets.is_empty() {
            warn!("没有匹配的渠道可用");
            return Ok(NotificationResult::new(
                rendered.notification_id,
                vec![],
                start.elapsed().as_millis() as u64,
            ));
        }

        debug!(target_channel_count = targets.len(), "找到匹配的渠道");

        let sends = targets.iter().map(|channel| {
            let notification = &rendered;
            async move { (channel.channel_type(), channel.send(notification).await) }
        });

        let channel_results: Vec<ChannelResult> = join_all(sends)
            .await
            .into_iter()
            .map(|(channel_type, result)| match result {
                Ok(r) => r,
                Err(e) => {
                    error!(channel = ?channel_type, error = %e, "渠道发送异常");
                    ChannelResult::failed(channel_type, e.to_string(), 0)
                }
            })
            .collect();

        Ok(NotificationResult::new(
            rendered.notification_id,
            channel_results,
            start.elapsed().as_millis() as u64,
        ))
    }

    fn render(&self, mut notification: Notification) -> Notification {
        match self
            .template_engine
            .render_push(notification.kind, &notification.payload)
        {
            Some((title, body)) => {
                notification.title = title;
                notification.body = body;
            }
            None => warn!(kind = ?notification.kind, "通知模板未注册，按原文发送"),
        }
        notification
    }
}
