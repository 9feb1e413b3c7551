//! 通知类型定义

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CustomerActivity, TenantScope};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PointsEarned,
    PointsBurned,
    CouponRedeemed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointsEarned => "points_earned",
            Self::PointsBurned => "points_burned",
            Self::CouponRedeemed => "coupon_redeemed",
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    AppPush,
}

/// 通知请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: String,
    pub scope: TenantScope,
    pub customer_id: String,
    pub kind: NotificationKind,
    /// 标题（渲染前为模板）
    pub title: String,
    /// 正文（渲染前为模板）
    pub body: String,
    pub channels: Vec<ChannelType>,
    /// 模板变量，同时作为推送的业务数据
    pub payload: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        scope: TenantScope,
        customer_id: impl Into<String>,
        kind: NotificationKind,
        payload: HashMap<String, String>,
    ) -> Self {
        Self {
            notification_id: Uuid::now_v7().to_string(),
            scope,
            customer_id: customer_id.into(),
            kind,
            title: String::new(),
            body: String::new(),
            channels: vec![ChannelType::AppPush],
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelType>) -> Self {
        self.channels = channels;
        self
    }

    /// 流水通知的模板变量
    pub fn activity_payload(activity: &CustomerActivity) -> HashMap<String, String> {
        let mut payload = HashMap::new();
        payload.insert("amount".to_string(), activity.amount.abs().to_string());
        payload.insert("activity_id".to_string(), activity.id.to_string());
        if let Some(rule_name) = &activity.rule_name {
            payload.insert("rule_name".to_string(), rule_name.clone());
        }
        if let Some(order_id) = &activity.order_id {
            payload.insert("order_id".to_string(), order_id.clone());
        }
        payload
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// 渠道发送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Success,
    Failed,
    Skipped,
}

/// 单渠道发送结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResult {
    pub channel: ChannelType,
    pub status: SendStatus,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ChannelResult {
    pub fn success(channel: ChannelType, message_id: Option<String>, duration_ms: u64) -> Self {
        Self {
            channel,
            status: SendStatus::Success,
            message_id,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(channel: ChannelType, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            channel,
            status: SendStatus::Failed,
            message_id: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn skipped(channel: ChannelType, reason: impl Into<String>) -> Self {
        Self {
            channel,
            status: SendStatus::Skipped,
            message_id: None,
            error: Some(reason.into()),
            duration_ms: 0,
        }
    }
}

/// 通知发送结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResult {
    pub notification_id: String,
    /// 所有渠道都成功
    pub success: bool,
    pub channel_results: Vec<ChannelResult>,
    pub duration_ms: u64,
    pub sent_at: DateTime<Utc>,
}

impl NotificationResult {
    pub fn new(
        notification_id: String,
        channel_results: Vec<ChannelResult>,
        duration_ms: u64,
    ) -> Self {
        let success = channel_results
            .iter()
            .all(|r| r.status == SendStatus::Success);
        Self {
            notification_id,
            success,
            channel_results,
            duration_ms,
            sent_at: Utc::now(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.channel_results
            .iter()
            .filter(|r| r.status == SendStatus::Success)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.channel_results
            .iter()
            .filter(|r| r.status == SendStatus::Failed)
            .count()
    }

    pub fn is_partial_success(&self) -> bool {
        self.success_count() > 0 && self.failure_count() > 0
    }
}
