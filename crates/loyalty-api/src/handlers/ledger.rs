//! 积分记账 API 处理器
//!
//! 重复提交同一 (客户, 订单, 规则) 时返回原流水，`replayed = true`

use axum::extract::State;
use axum::Json;
use loyalty_ledger::LedgerReceipt;
use tracing::info;
use validator::Validate;

use crate::dto::{ApiResponse, BurnRequest, EarnRequest, EventRequest};
use crate::error::Result;
use crate::extract::{ApiJson, Scope};
use crate::state::AppState;

/// 累积积分
///
/// POST /api/v1/ledger/earn
pub async fn earn(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EarnRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>> {
    req.validate()?;

    // validate 已保证 ruleId 与 campaignId 恰好一个，这里只做类型转换
    let receipt = state
        .ledger
        .earn(scope, &req.customer_id, req.rule_ref()?, &req.order)
        .await?;

    info!(
        scope = %scope,
        activity_id = receipt.activity.id,
        replayed = receipt.replayed,
        "Earn recorded"
    );
    Ok(Json(ApiResponse::success(receipt)))
}

/// 消耗积分
///
/// POST /api/v1/ledger/burn
pub async fn burn(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BurnRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>> {
    req.validate()?;

    let receipt = state
        .ledger
        .burn(scope, &req.customer_id, req.rule_id, &req.order)
        .await?;

    info!(
        scope = %scope,
        activity_id = receipt.activity.id,
        replayed = receipt.replayed,
        "Burn recorded"
    );
    Ok(Json(ApiResponse::success(receipt)))
}

/// 按事件名记账
///
/// POST /api/v1/ledger/events
pub async fn record_event(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EventRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>> {
    req.validate()?;

    let receipt = state
        .ledger
        .earn_or_burn_by_event(scope, &req.customer_id, &req.event_name, &req.metadata)
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}
