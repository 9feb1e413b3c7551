//! 短信审计与 OTP 仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::{OtpRepositoryTrait, SmsLogRepositoryTrait};
use crate::error::Result;
use crate::models::{NewOtpCode, NewSmsLog, OtpCode, SmsLog};

pub struct SmsLogRepository {
    pool: PgPool,
}

impl SmsLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SmsLogRepositoryTrait for SmsLogRepository {
    async fn create(&self, log: &NewSmsLog) -> Result<SmsLog> {
        let created = sqlx::query_as::<_, SmsLog>(
            r#"
            INSERT INTO sms_logs
                (phone_no, language_code, provider, request_payload, response_payload,
                 status, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, phone_no, language_code, provider, request_payload, response_payload,
                      status, error_message, created_at
            "#,
        )
        .bind(&log.phone_no)
        .bind(&log.language_code)
        .bind(&log.provider)
        .bind(&log.request_payload)
        .bind(&log.response_payload)
        .bind(log.status)
        .bind(&log.error_message)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}

pub struct OtpRepository {
    pool: PgPool,
}

impl OtpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpRepositoryTrait for OtpRepository {
    async fn create(&self, otp: &NewOtpCode) -> Result<OtpCode> {
        let created = sqlx::query_as::<_, OtpCode>(
            r#"
            INSERT INTO otp_codes
                (tenant_id, business_unit_id, phone_no, code_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, tenant_id, business_unit_id, phone_no, code_hash, expires_at, created_at
            "#,
        )
        .bind(otp.scope.tenant_id)
        .bind(otp.scope.business_unit_id)
        .bind(&otp.phone_no)
        .bind(&otp.code_hash)
        .bind(otp.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }
}
