//! 自定义提取器
//!
//! - `Scope`：按 Host 子域名（其次历史请求头）解析租户作用域，失败返回 401
//! - `Origin`：只收集原始租户线索，由同步对账自行解析并落失败日志
//! - `ApiJson` / `ApiQuery`：解析失败时返回统一错误响应体

use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::Json;
use loyalty_ledger::{RequestOrigin, TenantScope};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::state::AppState;

/// 已解析的租户作用域
#[derive(Debug, Clone, Copy)]
pub struct Scope(pub TenantScope);

impl FromRequestParts<AppState> for Scope {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let origin = request_origin(parts, &state.tenant_header);
        let scope = state.resolver.resolve(&origin).await?;
        Ok(Self(scope))
    }
}

/// 未解析的请求来源
#[derive(Debug, Clone)]
pub struct Origin(pub RequestOrigin);

impl FromRequestParts<AppState> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(request_origin(parts, &state.tenant_header)))
    }
}

/// 从请求头收集租户线索
///
/// HTTP/2 请求没有 Host 头时使用 URI 中的 authority
pub fn request_origin(parts: &Parts, tenant_header: &str) -> RequestOrigin {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()));
    let header = parts
        .headers
        .get(tenant_header)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    RequestOrigin::new(host, header)
}

/// JSON 请求体
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

/// 查询参数
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}
