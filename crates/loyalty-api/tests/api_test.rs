//! HTTP 路由测试（内存仓储）
//!
//! 通过 `tower::ServiceExt::oneshot` 直接驱动完整的 Router，
//! 覆盖租户解析、请求校验、错误映射与统一响应体。

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fake::Fake;
use fake::faker::company::en::CatchPhrase;
use http_body_util::BodyExt;
use loyalty_api::{AppState, Repositories, app};
use loyalty_ledger::notification::SimulatedSmsGateway;
use loyalty_ledger::{
    CampaignStatus, CouponTypeName, CustomerStatus, InMemoryBackend, RewardKind, Rule,
    RuleDirection, TenantScope, TenantStatus,
};
use loyalty_shared::config::AppConfig;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

const ACME_HOST: &str = "acme.loyalty.io";
const GLOBEX_HOST: &str = "globex.loyalty.io";
const CUSTOMER: &str = "cust-001";
const PHONE: &str = "+971501234567";

struct TestApp {
    router: Router,
    backend: Arc<InMemoryBackend>,
    earn_rule: Rule,
    burn_rule: Rule,
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn acme() -> TenantScope {
    TenantScope::new(100, 1)
}

fn test_app() -> TestApp {
    let backend = Arc::new(InMemoryBackend::new());
    backend.add_tenant("acme", acme(), TenantStatus::Active);
    backend.add_tenant("globex", TenantScope::new(200, 1), TenantStatus::Active);
    backend.add_customer(acme(), CUSTOMER, PHONE, CustomerStatus::Active);

    let campaign = backend.add_campaign(acme(), CampaignStatus::Active);
    let earn_rule =
        backend.add_rule(&campaign, RuleDirection::Earn, RewardKind::Percentage, dec("0.10"));
    let burn_rule = backend.add_rule(&campaign, RuleDirection::Burn, RewardKind::Fixed, dec("50"));
    backend.add_coupon(acme(), "CB-10", CouponTypeName::Cashback, dec("10"), Some(CUSTOMER));

    let mut config = AppConfig::default();
    config.ledger.retry_delay_ms = 1;

    let repos = Repositories::in_memory(backend.clone());
    let state = AppState::build(&repos, &config, Arc::new(SimulatedSmsGateway::new()));

    TestApp {
        router: app(state, &config.server),
        backend,
        earn_rule,
        burn_rule,
    }
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    host: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", host)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn post(router: &Router, uri: &str, host: &str, body: Value) -> (StatusCode, Value) {
    send(router, "POST", uri, host, Some(body)).await
}

async fn get(router: &Router, uri: &str, host: &str) -> (StatusCode, Value) {
    send(router, "GET", uri, host, None).await
}

fn earn_body(rule_id: i64, order_id: &str, amount: &str) -> Value {
    json!({ "customerId": CUSTOMER, "ruleId": rule_id, "order": order(order_id, amount) })
}

fn coupon_item(code: &str, invoice_no: &str) -> Value {
    json!({
        "code": code,
        "customerPhoneNo": PHONE,
        "invoiceNo": invoice_no,
        "usedTime": "2026-03-01T10:00:00Z"
    })
}

fn order(order_id: &str, amount: &str) -> Value {
    json!({
        "orderId": order_id,
        "amount": amount,
        "orderDate": "2026-03-01T10:00:00Z"
    })
}

// ==================== 健康检查与租户解析 ====================

#[tokio::test]
async fn test_health_and_readiness() {
    let app = test_app();

    let (status, body) = send(&app.router, "GET", "/health", "localhost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app.router, "GET", "/ready", "localhost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"], "ok");
}

#[tokio::test]
async fn test_request_without_tenant_is_unauthorized() {
    let app = test_app();
    let body = earn_body(app.earn_rule.id, "ORD-1", "200");

    let (status, json) = post(&app.router, "/api/v1/ledger/earn", "localhost:8080", body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "UNAUTHORIZED_SCOPE");
    assert!(app.backend.activities().is_empty());
}

#[tokio::test]
async fn test_legacy_tenant_header_is_accepted() {
    let app = test_app();
    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/customers/{}/balance", CUSTOMER))
        .header("host", "localhost:8080")
        .header("x-tenant-id", "ACME")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

// ==================== 记账 ====================

#[tokio::test]
async fn test_earn_then_replay() {
    let app = test_app();
    let body = earn_body(app.earn_rule.id, "ORD-1", "200");

    let (status, first) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["activity"]["amount"], "20.00");
    assert_eq!(first["data"]["replayed"], false);

    let (status, second) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(second["data"]["activity"]["id"], first["data"]["activity"]["id"]);
    assert_eq!(app.backend.activities().len(), 1);

    let uri = format!("/api/v1/customers/{}/balance", CUSTOMER);
    let (status, balance) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["data"]["balance"], "20.00");
}

#[tokio::test]
async fn test_padded_ids_replay_over_http() {
    let app = test_app();
    let (status, first) = post(
        &app.router,
        "/api/v1/ledger/earn",
        ACME_HOST,
        earn_body(app.earn_rule.id, "ORD-1", "200"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let padded = json!({
        "customerId": format!("  {}", CUSTOMER),
        "ruleId": app.earn_rule.id,
        "order": order("ORD-1 ", "200"),
    });
    let (status, second) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, padded).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["replayed"], true);
    assert_eq!(second["data"]["activity"]["id"], first["data"]["activity"]["id"]);
    assert_eq!(app.backend.activities().len(), 1);

    let uri = format!("/api/v1/customers/{}/balance", CUSTOMER);
    let (_, balance) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(balance["data"]["balance"], "20.00");
}

#[tokio::test]
async fn test_burn_over_balance_is_conflict() {
    let app = test_app();
    let body = earn_body(app.burn_rule.id, "ORD-2", "80");

    let (status, json) = post(&app.router, "/api/v1/ledger/burn", ACME_HOST, body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INSUFFICIENT_BALANCE");
    assert!(app.backend.activities().is_empty());
}

#[tokio::test]
async fn test_rule_from_other_tenant_is_not_applicable() {
    let app = test_app();
    let body = earn_body(app.earn_rule.id, "ORD-3", "200");

    let (status, json) = post(&app.router, "/api/v1/ledger/earn", GLOBEX_HOST, body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "RULE_NOT_APPLICABLE");
}

#[tokio::test]
async fn test_invalid_requests_are_bad_request() {
    let app = test_app();

    let both_targets = json!({
        "customerId": CUSTOMER,
        "ruleId": app.earn_rule.id,
        "campaignId": app.earn_rule.campaign_id,
        "order": order("ORD-4", "200"),
    });
    let (status, json) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, both_targets).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let negative = earn_body(app.earn_rule.id, "ORD-4", "-5");
    let (status, json) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, negative).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let missing_order = json!({ "customerId": CUSTOMER });
    let (status, json) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, missing_order).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    assert!(app.backend.activities().is_empty());
}

#[tokio::test]
async fn test_order_lines_are_kept_as_evidence() {
    let app = test_app();
    let item_name: String = CatchPhrase().fake();
    let quantity: i32 = (1..10).fake();
    let body = json!({
        "customerId": CUSTOMER,
        "ruleId": app.earn_rule.id,
        "order": {
            "orderId": "ORD-E1",
            "amount": "200",
            "subtotal": "150",
            "items": [{
                "sku": "SKU-1",
                "name": item_name,
                "quantity": quantity,
                "unitPrice": "150"
            }],
            "paymentMethod": "card",
            "orderDate": "2026-03-01T10:00:00Z"
        }
    });

    let (status, json) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, body).await;

    assert_eq!(status, StatusCode::OK);
    let activity = &json["data"]["activity"];
    assert_eq!(activity["amount"], "15.00");
    assert_eq!(activity["meta"]["v"], 1);
    assert_eq!(activity["meta"]["kind"], "order");
    assert_eq!(activity["meta"]["order"]["items"][0]["name"], item_name.as_str());
    assert_eq!(activity["meta"]["order"]["items"][0]["quantity"], quantity);
    assert_eq!(activity["meta"]["order"]["paymentMethod"], "card");
}

// ==================== 优惠券 ====================

#[tokio::test]
async fn test_coupon_redeemed_once() {
    let app = test_app();
    let redeem = |order_id: &str| {
        json!({ "customerId": CUSTOMER, "code": "CB-10", "order": order(order_id, "50") })
    };

    let (status, json) =
        post(&app.router, "/api/v1/coupons/redeem", ACME_HOST, redeem("ORD-10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["activity"]["amount"], "10.00");
    assert_eq!(json["data"]["activity"]["activityType"], "coupon");

    let (status, json) =
        post(&app.router, "/api/v1/coupons/redeem", ACME_HOST, redeem("ORD-11")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "COUPON_ALREADY_REDEEMED");
}

#[tokio::test]
async fn test_reserved_coupon_blocks_other_orders() {
    let app = test_app();
    let reserve = json!({ "customerId": CUSTOMER, "code": "CB-10", "orderId": "ORD-20" });

    let (status, json) = post(&app.router, "/api/v1/coupons/reserve", ACME_HOST, reserve).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["reservedOrderId"], "ORD-20");

    let other = json!({ "customerId": CUSTOMER, "code": "CB-10", "order": order("ORD-21", "50") });
    let (status, json) = post(&app.router, "/api/v1/coupons/redeem", ACME_HOST, other).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "COUPON_RESERVED");
}

// ==================== 批量同步 ====================

#[tokio::test]
async fn test_coupon_sync_partial_failure() {
    let app = test_app();
    let body = json!({ "items": [coupon_item("CB-10", "I1"), coupon_item("BAD", "I2")] });

    let (status, json) = post(&app.router, "/api/v1/sync/coupons", ACME_HOST, body).await;
    assert_eq!(status, StatusCode::OK);
    let log = &json["data"];
    assert_eq!(log["status"], "completed");
    assert_eq!(log["totalCount"], 2);
    assert_eq!(log["successCount"], 1);
    assert_eq!(log["failedCount"], 1);
    assert_eq!(log["failedItems"][0]["errorCode"], "RULE_NOT_APPLICABLE");

    let uri = format!("/api/v1/sync/logs/{}", log["id"]);
    let (status, fetched) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["id"], log["id"]);

    let (status, json) = get(&app.router, &uri, GLOBEX_HOST).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SYNC_LOG_NOT_FOUND");
}

#[tokio::test]
async fn test_transaction_sync_and_empty_batch() {
    let app = test_app();
    let body = json!({
        "items": [{
            "customerPhoneNo": PHONE,
            "invoiceNo": "T1",
            "amount": "300",
            "ruleId": app.earn_rule.id,
            "transactionTime": "2026-03-01T10:00:00Z"
        }]
    });

    let (status, json) = post(&app.router, "/api/v1/sync/transactions", ACME_HOST, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["successCount"], 1);
    assert_eq!(app.backend.activities()[0].amount, dec("30.00"));

    let empty = json!({ "items": [] });
    let (status, json) = post(&app.router, "/api/v1/sync/transactions", ACME_HOST, empty).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "failed");
}

#[tokio::test]
async fn test_sync_without_tenant_is_unauthorized() {
    let app = test_app();
    let body = json!({ "items": [coupon_item("CB-10", "I1")] });

    let (status, json) =
        post(&app.router, "/api/v1/sync/coupons", "unknown.loyalty.io", body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED_SCOPE");
    assert!(app.backend.activities().is_empty());
}

// ==================== 查询 ====================

#[tokio::test]
async fn test_activity_paging_and_filter() {
    let app = test_app();
    for i in 0..3 {
        let body = earn_body(app.earn_rule.id, &format!("ORD-P{}", i), "100");
        let (status, _) = post(&app.router, "/api/v1/ledger/earn", ACME_HOST, body).await;
        assert_eq!(status, StatusCode::OK);
    }
    let coupon = json!({ "customerId": CUSTOMER, "code": "CB-10", "order": order("ORD-C", "10") });
    post(&app.router, "/api/v1/coupons/redeem", ACME_HOST, coupon).await;

    let uri = format!("/api/v1/customers/{}/activities?page=2&pageSize=3", CUSTOMER);
    let (status, json) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 4);
    assert_eq!(json["data"]["totalPages"], 2);
    assert_eq!(json["data"]["items"].as_array().unwrap().len(), 1);

    let uri = format!("/api/v1/customers/{}/activities?activityType=coupon", CUSTOMER);
    let (_, json) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(json["data"]["total"], 1);

    let uri = format!("/api/v1/customers/{}/activities?pageSize=abc", CUSTOMER);
    let (status, json) = get(&app.router, &uri, ACME_HOST).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_huge_page_number_is_rejected() {
    let app = test_app();

    let uri = format!("/api/v1/customers/{}/activities?page={}", CUSTOMER, i64::MAX);
    let (status, json) = get(&app.router, &uri, ACME_HOST).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ==================== 验证码 ====================

#[tokio::test]
async fn test_issue_otp() {
    let app = test_app();
    let body = json!({ "phoneNo": "00971 50 123 4567", "languageCode": "ar" });

    let (status, json) = post(&app.router, "/api/v1/otp", ACME_HOST, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["phoneNo"], PHONE);
    assert_eq!(json["data"]["smsStatus"], "sent");
    assert_eq!(app.backend.sms_logs().len(), 1);
    assert_eq!(app.backend.otp_codes().len(), 1);
}
