//! 验证码下发 API 处理器

use axum::extract::State;
use axum::Json;
use loyalty_ledger::dto::OtpIssued;
use validator::Validate;

use crate::dto::{ApiResponse, OtpRequest};
use crate::error::Result;
use crate::extract::{ApiJson, Scope};
use crate::state::AppState;

/// 下发验证码短信
///
/// POST /api/v1/otp
///
/// 网关失败不影响响应状态，体现在 `smsStatus` 上
pub async fn issue_otp(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OtpRequest>,
) -> Result<Json<ApiResponse<OtpIssued>>> {
    req.validate()?;

    let issued = state
        .otp
        .issue_otp(scope, &req.phone_no, &req.language_code)
        .await?;
    Ok(Json(ApiResponse::success(issued)))
}
