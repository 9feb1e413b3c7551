//! 客户查询 API 处理器

use axum::extract::{Path, State};
use axum::Json;
use loyalty_ledger::CustomerActivity;
use loyalty_ledger::dto::BalanceDto;

use crate::dto::{ActivityQuery, ApiResponse, PageResponse};
use crate::error::Result;
use crate::extract::{ApiQuery, Scope};
use crate::state::AppState;

/// 分页查询客户流水
///
/// GET /api/v1/customers/{customerId}/activities
pub async fn list_activities(
    Scope(scope): Scope,
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<Json<ApiResponse<PageResponse<CustomerActivity>>>> {
    let page = state
        .query
        .list_activities(scope, &customer_id, &query.filter(), query.pagination())
        .await?;
    Ok(Json(ApiResponse::success(page.into())))
}

/// 查询客户余额
///
/// GET /api/v1/customers/{customerId}/balance
pub async fn get_balance(
    Scope(scope): Scope,
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<ApiResponse<BalanceDto>>> {
    let balance = state.query.balance(scope, &customer_id).await?;
    Ok(Json(ApiResponse::success(balance)))
}
