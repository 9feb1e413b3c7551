//! 通知发送器
//!
//! 注入到账本服务中，在流水提交之后发送通知。
//! 发送在独立任务中进行，结果只记录日志，从不影响账本。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::service::NotificationService;
use super::types::{Notification, NotificationKind};
use crate::models::{CustomerActivity, TenantScope};

#[derive(Clone)]
pub struct NotificationSender {
    service: Arc<NotificationService>,
}

impl NotificationSender {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    /// 发送通知（fire-and-forget），返回时通知可能尚未送达
    pub fn send(
        &self,
        scope: TenantScope,
        customer_id: &str,
        kind: NotificationKind,
        payload: HashMap<String, String>,
    ) {
        let notification = Notification::new(scope, customer_id, kind, payload);
        let service = self.service.clone();
        let notification_id = notification.notification_id.clone();
        let customer_id = notification.customer_id.clone();
        let kind = notification.kind;

        tokio::spawn(async move {
            match service.send(notification).await {
                Ok(result) if result.success => {
                    info!(
                        notification_id = %notification_id,
                        customer_id = %customer_id,
                        kind = kind.as_str(),
                        "通知发送成功"
                    );
                }
                Ok(result) => {
                    warn!(
                        notification_id = %notification_id,
                        customer_id = %customer_id,
                        success_count = result.success_count(),
                        failure_count = result.failure_count(),
                        "通知未全部送达"
                    );
                }
                Err(e) => {
                    error!(
                        notification_id = %notification_id,
                        customer_id = %customer_id,
                        error = %e,
                        "通知发送异常"
                    );
                }
            }
        });
    }
}
