//! 健康检查

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{Value, json};

use crate::state::AppState;

pub const SERVICE_NAME: &str = "loyalty-api";

/// 存活探针
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：检查数据库连接是否可用
///
/// 内存仓储模式下没有数据库，直接视为就绪
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = match &state.database {
        Some(db) => db.health_check().await.is_ok(),
        None => true,
    };
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "service": SERVICE_NAME,
            "checks": {
                "database": if db_ok { "ok" } else { "fail" }
            }
        })),
    )
}
