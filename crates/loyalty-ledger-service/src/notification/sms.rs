//! 短信发送
//!
//! `SmsDispatcher::send_sms` 渲染本地化模板，交给网关发送，
//! 无论成功与否都写一条 `sms_logs` 审计记录（验证码打码）。
//!
//! 网关：
//! - `simulated`：只记日志
//! - `http`：POST JSON 到配置的地址，Bearer 鉴权，带超时

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loyalty_shared::config::SmsConfig;
use loyalty_shared::observability::metrics as app_metrics;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::template::TemplateEngine;
use crate::error::{LedgerError, Result};
use crate::models::{NewSmsLog, SmsLog, SmsStatus};
use crate::repository::SmsLogRepositoryTrait;

/// 发送给网关的短信
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub to: String,
    pub from: String,
    pub language: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SmsGatewayError {
    #[error("短信网关请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("短信网关拒绝请求: HTTP {status}")]
    Rejected { status: u16, body: Value },

    #[error("短信网关不可用: {0}")]
    Unavailable(String),
}

impl SmsGatewayError {
    fn response_body(&self) -> Option<Value> {
        match self {
            Self::Rejected { body, .. } => Some(body.clone()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    fn provider(&self) -> &str;

    /// 成功时返回网关响应体
    async fn deliver(&self, message: &SmsMessage) -> std::result::Result<Value, SmsGatewayError>;
}

/// 模拟网关
pub struct SimulatedSmsGateway {
    failure: Option<String>,
}

impl SimulatedSmsGateway {
    pub fn new() -> Self {
        Self { failure: None }
    }

    /// 每次发送都失败的网关
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
        }
    }
}

impl Default for SimulatedSmsGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SmsGateway for SimulatedSmsGateway {
    fn provider(&self) -> &str {
        "simulated"
    }

    async fn deliver(&self, message: &SmsMessage) -> std::result::Result<Value, SmsGatewayError> {
        if let Some(reason) = &self.failure {
            return Err(SmsGatewayError::Unavailable(reason.clone()));
        }
        info!(to = %message.to, language = %message.language, "模拟短信已发送");
        Ok(json!({ "messageId": format!("sim_{}", uuid::Uuid::new_v4()) }))
    }
}

/// HTTP 网关
pub struct HttpSmsGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSmsGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Internal(format!("创建短信 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    fn provider(&self) -> &str {
        "http"
    }

    async fn deliver(&self, message: &SmsMessage) -> std::result::Result<Value, SmsGatewayError> {
        let mut request = self.client.post(&self.endpoint).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        if status.is_success() {
            Ok(body)
        } else {
            Err(SmsGatewayError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// 按配置创建网关
pub fn build_gateway(config: &SmsConfig) -> Result<Arc<dyn SmsGateway>> {
    match config.provider.as_str() {
        "simulated" => Ok(Arc::new(SimulatedSmsGateway::new())),
        "http" => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| LedgerError::Internal("sms.endpoint 未配置".to_string()))?;
            Ok(Arc::new(HttpSmsGateway::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        other => Err(LedgerError::Internal(format!("未知的短信网关: {}", other))),
    }
}

/// 短信分发器
pub struct SmsDispatcher {
    gateway: Arc<dyn SmsGateway>,
    logs: Arc<dyn SmsLogRepositoryTrait>,
    templates: Arc<TemplateEngine>,
    sender_id: String,
    validity_minutes: i64,
}

impl SmsDispatcher {
    pub fn new(
        gateway: Arc<dyn SmsGateway>,
        logs: Arc<dyn SmsLogRepositoryTrait>,
        templates: Arc<TemplateEngine>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            logs,
            templates,
            sender_id: sender_id.into(),
            validity_minutes: 5,
        }
    }

    /// 短信中展示的验证码有效期
    pub fn with_validity_minutes(mut self, minutes: i64) -> Self {
        self.validity_minutes = minutes.max(1);
        self
    }

    /// 发送验证码短信并写审计记录
    ///
    /// 网关失败不返回错误，而是体现在 `SmsLog.status` 上；
    /// 只有审计记录写入失败才返回 Err
    #[instrument(skip(self, otp), fields(provider = self.gateway.provider()))]
    pub async fn send_sms(&self, phone_no: &str, otp: &str, language_code: &str) -> Result<SmsLog> {
        let mut variables = HashMap::new();
        variables.insert("otp".to_string(), otp.to_string());
        variables.insert("minutes".to_string(), self.validity_minutes.to_string());
        let (language, text) = self.templates.render_sms(language_code, &variables);

        let message = SmsMessage {
            to: phone_no.to_string(),
            from: self.sender_id.clone(),
            language,
            text,
        };
        let request_payload = masked_payload(&message, otp);

        let provider = self.gateway.provider().to_string();
        let entry = match self.gateway.deliver(&message).await {
            Ok(response) => NewSmsLog {
                phone_no: phone_no.to_string(),
                language_code: message.language.clone(),
                provider: provider.clone(),
                request_payload,
                response_payload: Some(response),
                status: SmsStatus::Sent,
                error_message: None,
            },
            Err(e) => {
                warn!(phone_no = %phone_no, error = %e, "短信发送失败");
                NewSmsLog {
                    phone_no: phone_no.to_string(),
                    language_code: message.language.clone(),
                    provider: provider.clone(),
                    request_payload,
                    response_payload: e.response_body(),
                    status: SmsStatus::Failed,
                    error_message: Some(e.to_string()),
                }
            }
        };

        app_metrics::record_sms_send(&provider, entry.status.as_str());

        self.logs.create(&entry).await.inspect_err(|e| {
            error!(phone_no = %phone_no, error = %e, "短信审计记录写入失败");
        })
    }
}

fn masked_payload(message: &SmsMessage, otp: &str) -> Value {
    let text = if otp.is_empty() {
        message.text.clone()
    } else {
        message.text.replace(otp, &"*".repeat(otp.chars().count()))
    };
    json!({
        "to": message.to,
        "from": message.from,
        "language": message.language,
        "text": text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockSmsLogRepositoryTrait;
    use chrono::Utc;

    fn echo_log_repo() -> MockSmsLogRepositoryTrait {
        let mut repo = MockSmsLogRepositoryTrait::new();
        repo.expect_create().times(1).returning(|log| {
            Ok(SmsLog {
                id: 1,
                phone_no: log.phone_no.clone(),
                language_code: log.language_code.clone(),
                provider: log.provider.clone(),
                request_payload: log.request_payload.clone(),
                response_payload: log.response_payload.clone(),
                status: log.status,
                error_message: log.error_message.clone(),
                created_at: Utc::now(),
            })
        });
        repo
    }

    fn dispatcher(gateway: SimulatedSmsGateway) -> SmsDispatcher {
        SmsDispatcher::new(
            Arc::new(gateway),
            Arc::new(echo_log_repo()),
            Arc::new(TemplateEngine::with_defaults()),
            "LOYALTY",
        )
    }

    #[tokio::test]
    async fn test_send_sms_masks_otp() {
        let log = dispatcher(SimulatedSmsGateway::new())
            .send_sms("+966501234567", "482913", "ar")
            .await
            .unwrap();

        assert_eq!(log.status, SmsStatus::Sent);
        assert_eq!(log.language_code, "ar");
        let text = log.request_payload["text"].as_str().unwrap();
        assert!(!text.contains("482913"));
        assert!(text.contains("******"));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_logged_not_returned() {
        let log = dispatcher(SimulatedSmsGateway::failing("provider down"))
            .send_sms("+966501234567", "111222", "de")
            .await
            .unwrap();

        assert_eq!(log.status, SmsStatus::Failed);
        assert_eq!(log.language_code, "en");
        assert!(log.error_message.unwrap().contains("provider down"));
    }

    #[test]
    fn test_build_gateway() {
        let mut config = SmsConfig::default();
        assert_eq!(build_gateway(&config).unwrap().provider(), "simulated");

        config.provider = "http".into();
        assert!(build_gateway(&config).is_err());

        config.endpoint = Some("http://localhost:9000/sms".into());
        assert_eq!(build_gateway(&config).unwrap().provider(), "http");

        config.provider = "carrier-pigeon".into();
        assert!(build_gateway(&config).is_err());
    }
}
