//! 验证码下发测试（内存仓储）
//!
//! 网关失败时仍然写入审计记录，且记录中的验证码已打码。

use std::sync::Arc;

use fake::Fake;
use fake::faker::number::en::NumberWithFormat;
use loyalty_ledger::models::{SmsStatus, TenantScope};
use loyalty_ledger::notification::{SimulatedSmsGateway, SmsDispatcher, TemplateEngine};
use loyalty_ledger::repository::InMemoryBackend;
use loyalty_ledger::service::OtpService;
use loyalty_shared::config::OtpConfig;

fn otp_service(backend: &Arc<InMemoryBackend>, gateway: SimulatedSmsGateway) -> OtpService {
    let dispatcher = SmsDispatcher::new(
        Arc::new(gateway),
        backend.clone(),
        Arc::new(TemplateEngine::with_defaults()),
        "LOYALTY",
    );
    OtpService::new(backend.clone(), Arc::new(dispatcher), &OtpConfig::default())
}

#[tokio::test]
async fn test_gateway_failure_is_audited() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = otp_service(&backend, SimulatedSmsGateway::failing("provider returned 503"));

    let issued = tokio_test::assert_ok!(
        service
            .issue_otp(TenantScope::new(1, 1), "+971 50 123 4567", "ar-AE")
            .await
    );
    assert_eq!(issued.sms_status, SmsStatus::Failed);

    let logs = backend.sms_logs();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.status, SmsStatus::Failed);
    assert_eq!(log.language_code, "ar");
    assert!(log.error_message.as_deref().unwrap_or_default().contains("503"));

    let text = log.request_payload["text"].as_str().unwrap_or_default();
    assert!(text.contains("******"));
}

#[tokio::test]
async fn test_only_hash_is_stored() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = otp_service(&backend, SimulatedSmsGateway::new());

    let issued = service
        .issue_otp(TenantScope::new(1, 1), "+971501234567", "fr")
        .await
        .unwrap();
    assert_eq!(issued.sms_status, SmsStatus::Sent);

    let codes = backend.otp_codes();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].code_hash.len(), 64);
    assert!(codes[0].code_hash.chars().all(|c| c.is_ascii_hexdigit()));

    // 未注册的语言回退到英文模板
    assert_eq!(backend.sms_logs()[0].language_code, "en");
}

#[tokio::test]
async fn test_each_issue_writes_its_own_audit_row() {
    let backend = Arc::new(InMemoryBackend::new());
    let service = otp_service(&backend, SimulatedSmsGateway::new());

    let phones: Vec<String> = (0..5)
        .map(|_| NumberWithFormat("+96650#######").fake())
        .collect();
    for phone in &phones {
        tokio_test::assert_ok!(service.issue_otp(TenantScope::new(1, 1), phone, "en").await);
    }

    let logs = backend.sms_logs();
    assert_eq!(logs.len(), phones.len());
    for (log, phone) in logs.iter().zip(&phones) {
        assert_eq!(&log.phone_no, phone);
        assert_eq!(log.status, SmsStatus::Sent);
    }
    assert_eq!(backend.otp_codes().len(), phones.len());
}
