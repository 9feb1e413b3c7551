//! 批量同步 API 处理器
//!
//! 作用域在对账器内解析：无法解析时仍会写一条失败的同步日志，再返回 401

use axum::extract::{Path, State};
use axum::Json;
use loyalty_ledger::{LedgerError, SyncLog, SyncStatus};
use tracing::info;

use crate::dto::{ApiResponse, CouponSyncRequest, TransactionSyncRequest};
use crate::error::Result;
use crate::extract::{ApiJson, Origin, Scope};
use crate::state::AppState;

/// 同步优惠券核销记录
///
/// POST /api/v1/sync/coupons
pub async fn sync_coupons(
    Origin(origin): Origin,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CouponSyncRequest>,
) -> Result<Json<ApiResponse<SyncLog>>> {
    let log = state.reconciler.reconcile_for_origin(&origin, req.items).await?;
    into_response(log)
}

/// 同步交易记录
///
/// POST /api/v1/sync/transactions
pub async fn sync_transactions(
    Origin(origin): Origin,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TransactionSyncRequest>,
) -> Result<Json<ApiResponse<SyncLog>>> {
    let log = state
        .reconciler
        .reconcile_transactions_for_origin(&origin, req.items)
        .await?;
    into_response(log)
}

/// 查询同步日志
///
/// GET /api/v1/sync/logs/{id}
pub async fn get_sync_log(
    Scope(scope): Scope,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SyncLog>>> {
    let log = state.query.get_sync_log(scope, id).await?;
    Ok(Json(ApiResponse::success(log)))
}

/// 没有作用域的失败批次对调用方表现为 401；其余批次无论成败都返回日志
fn into_response(log: SyncLog) -> Result<Json<ApiResponse<SyncLog>>> {
    if log.status == SyncStatus::Failed && log.scope().is_none() {
        info!(sync_log_id = log.id, "同步请求未解析到租户作用域");
        return Err(LedgerError::UnauthorizedScope.into());
    }
    Ok(Json(ApiResponse::success(log)))
}
