//! 验证码下发
//!
//! 1. 规范化手机号、校验语言代码
//! 2. 生成数字验证码，只保存 sha256 摘要
//! 3. 通过短信网关下发，无论成功与否都有审计记录
//!
//! 验证码校验不在本服务范围内。

use std::sync::Arc;

use chrono::{Duration, Utc};
use loyalty_shared::config::OtpConfig;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use super::dto::OtpIssued;
use crate::error::Result;
use crate::models::{NewOtpCode, TenantScope};
use crate::notification::SmsDispatcher;
use crate::repository::OtpRepositoryTrait;
use crate::validation;

pub struct OtpService {
    otps: Arc<dyn OtpRepositoryTrait>,
    dispatcher: Arc<SmsDispatcher>,
    ttl: Duration,
    code_length: u32,
}

impl OtpService {
    pub fn new(
        otps: Arc<dyn OtpRepositoryTrait>,
        dispatcher: Arc<SmsDispatcher>,
        config: &OtpConfig,
    ) -> Self {
        Self {
            otps,
            dispatcher,
            ttl: Duration::seconds(config.ttl_seconds.max(1)),
            code_length: config.code_length.clamp(4, 10),
        }
    }

    #[instrument(skip_all, fields(scope = %scope, language_code = %language_code))]
    pub async fn issue_otp(
        &self,
        scope: TenantScope,
        phone_no: &str,
        language_code: &str,
    ) -> Result<OtpIssued> {
        let phone_no = validation::normalize_phone(phone_no)?;
        validation::validate_language_code(language_code)?;

        let code = generate_code(self.code_length);
        let expires_at = Utc::now() + self.ttl;
        let otp = self
            .otps
            .create(&NewOtpCode {
                scope,
                phone_no: phone_no.clone(),
                code_hash: hash_code(&code),
                expires_at,
            })
            .await?;

        let sms = self
            .dispatcher
            .send_sms(&phone_no, &code, language_code.trim())
            .await?;

        info!(
            otp_id = otp.id,
            sms_log_id = sms.id,
            status = sms.status.as_str(),
            "验证码已下发"
        );

        Ok(OtpIssued {
            phone_no,
            expires_at: otp.expires_at,
            sms_log_id: sms.id,
            sms_status: sms.status,
        })
    }
}

fn generate_code(length: u32) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// 验证码摘要（小写十六进制）
pub fn hash_code(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OtpCode, SmsLog, SmsStatus};
    use crate::notification::{SimulatedSmsGateway, TemplateEngine};
    use crate::repository::{MockOtpRepositoryTrait, MockSmsLogRepositoryTrait};

    fn sms_logs() -> MockSmsLogRepositoryTrait {
        let mut repo = MockSmsLogRepositoryTrait::new();
        repo.expect_create().times(1).returning(|log| {
            Ok(SmsLog {
                id: 9,
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

    fn dispatcher(gateway: SimulatedSmsGateway) -> Arc<SmsDispatcher> {
        Arc::new(SmsDispatcher::new(
            Arc::new(gateway),
            Arc::new(sms_logs()),
            Arc::new(TemplateEngine::with_defaults()),
            "LOYALTY",
        ))
    }

    fn otp_repo() -> MockOtpRepositoryTrait {
        let mut repo = MockOtpRepositoryTrait::new();
        repo.expect_create()
            .times(1)
            .withf(|otp| otp.phone_no == "+971501234567" && otp.code_hash.len() == 64)
            .returning(|otp| {
                Ok(OtpCode {
                    id: 1,
                    tenant_id: otp.scope.tenant_id,
                    business_unit_id: otp.scope.business_unit_id,
                    phone_no: otp.phone_no.clone(),
                    code_hash: otp.code_hash.clone(),
                    expires_at: otp.expires_at,
                    created_at: Utc::now(),
                })
            });
        repo
    }

    #[test]
    fn test_generate_code_is_numeric() {
        let code = generate_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_hash_code_is_sha256_hex() {
        assert_eq!(
            hash_code("123456"),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[tokio::test]
    async fn test_issue_otp_normalizes_phone() {
        let service = OtpService::new(
            Arc::new(otp_repo()),
            dispatcher(SimulatedSmsGateway::new()),
            &OtpConfig::default(),
        );

        let issued = service
            .issue_otp(TenantScope::new(1, 2), "00971 50-123-4567", "ar")
            .await
            .unwrap();

        assert_eq!(issued.phone_no, "+971501234567");
        assert_eq!(issued.sms_status, SmsStatus::Sent);
        assert!(issued.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_gateway_failure_still_issues() {
        let service = OtpService::new(
            Arc::new(otp_repo()),
            dispatcher(SimulatedSmsGateway::failing("gateway down")),
            &OtpConfig::default(),
        );

        let issued = service
            .issue_otp(TenantScope::new(1, 2), "+971501234567", "en")
            .await
            .unwrap();
        assert_eq!(issued.sms_status, SmsStatus::Failed);
    }

    #[tokio::test]
    async fn test_invalid_phone_is_rejected_before_persisting() {
        let mut otps = MockOtpRepositoryTrait::new();
        otps.expect_create().never();
        let service = OtpService::new(
            Arc::new(otps),
            Arc::new(SmsDispatcher::new(
                Arc::new(SimulatedSmsGateway::new()),
                Arc::new(MockSmsLogRepositoryTrait::new()),
                Arc::new(TemplateEngine::with_defaults()),
                "LOYALTY",
            )),
            &OtpConfig::default(),
        );

        let result = service.issue_otp(TenantScope::new(1, 2), "12", "en").await;
        assert!(matches!(result, Err(crate::error::LedgerError::Validation(_))));
    }
}
