//! 优惠券 API 处理器

use axum::extract::State;
use axum::Json;
use loyalty_ledger::{Coupon, LedgerReceipt};
use validator::Validate;

use crate::dto::{ApiResponse, RedeemCouponRequest, ReserveCouponRequest};
use crate::error::Result;
use crate::extract::{ApiJson, Scope};
use crate::state::AppState;

/// 核销优惠券
///
/// POST /api/v1/coupons/redeem
pub async fn redeem(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RedeemCouponRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>> {
    req.validate()?;

    let receipt = state
        .ledger
        .redeem_coupon(scope, &req.customer_id, &req.code, &req.order)
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}

/// 为订单预留优惠券
///
/// POST /api/v1/coupons/reserve
pub async fn reserve(
    Scope(scope): Scope,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ReserveCouponRequest>,
) -> Result<Json<ApiResponse<Coupon>>> {
    req.validate()?;

    let coupon = state
        .ledger
        .reserve_coupon(scope, &req.customer_id, &req.code, &req.order_id)
        .await?;
    Ok(Json(ApiResponse::success(coupon)))
}
