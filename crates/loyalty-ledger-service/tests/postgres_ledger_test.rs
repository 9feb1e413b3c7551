//! PostgreSQL 仓储集成测试
//!
//! 唯一索引、条件更新和咨询锁只能在真实数据库上验证。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test postgres_ledger_test -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loyalty_ledger::error::LedgerError;
use loyalty_ledger::models::{OrderSnapshot, RuleRef, TenantScope};
use loyalty_ledger::repository::{
    ActivityRepository, ActivityRepositoryTrait, CatalogRepository, CouponRepository,
};
use loyalty_ledger::service::{CatalogService, LedgerService};
use loyalty_shared::config::LedgerConfig;
use loyalty_shared::test_utils::{test_customer_id, test_order_id, unique_id};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

// ==================== 辅助函数 ====================

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup_pool() -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url())
        .await
        .expect("连接数据库失败");
    loyalty_ledger::MIGRATOR.run(&pool).await.expect("执行迁移失败");
    pool
}

/// 每个测试使用独立的随机作用域，互不干扰
fn random_scope() -> TenantScope {
    TenantScope::new(unique_id(), 1)
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ledger(pool: &PgPool) -> Arc<LedgerService> {
    let catalog = Arc::new(CatalogService::new(
        Arc::new(CatalogRepository::new(pool.clone())),
        Duration::from_secs(2),
    ));
    Arc::new(LedgerService::new(
        catalog,
        Arc::new(ActivityRepository::new(pool.clone())),
        Arc::new(CouponRepository::new(pool.clone())),
        &LedgerConfig::default(),
    ))
}

async fn seed_campaign(pool: &PgPool, scope: TenantScope) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO campaigns (id, tenant_id, business_unit_id, name, campaign_type, status)
        VALUES ($1, $2, $3, 'IntegTest Campaign', 'POINTS', 1)
        "#,
    )
    .bind(id)
    .bind(scope.tenant_id)
    .bind(scope.business_unit_id)
    .execute(pool)
    .await
    .expect("插入测试活动失败");
    id
}

async fn seed_rule(
    pool: &PgPool,
    scope: TenantScope,
    campaign_id: Uuid,
    direction: &str,
    reward_kind: &str,
    reward_value: Decimal,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO rules (campaign_id, tenant_id, business_unit_id, name, direction,
                           reward_kind, reward_value)
        VALUES ($1, $2, $3, 'IntegTest Rule', $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(campaign_id)
    .bind(scope.tenant_id)
    .bind(scope.business_unit_id)
    .bind(direction)
    .bind(reward_kind)
    .bind(reward_value)
    .fetch_one(pool)
    .await
    .expect("插入测试规则失败")
}

async fn seed_coupon(pool: &PgPool, scope: TenantScope, code: &str, customer_id: &str) {
    sqlx::query(
        r#"
        INSERT INTO coupons
            (id, tenant_id, business_unit_id, code, coupon_type, customer_id, face_value)
        VALUES ($1, $2, $3, $4, 'cashback', $5, 10)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(scope.tenant_id)
    .bind(scope.business_unit_id)
    .bind(code)
    .bind(customer_id)
    .execute(pool)
    .await
    .expect("插入测试优惠券失败");
}

fn order(order_id: &str, amount: &str) -> OrderSnapshot {
    OrderSnapshot::new(Some(order_id.to_string()), dec(amount), Utc::now())
}

// ==================== 测试用例 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL，设置 DATABASE_URL 后使用 --ignored 运行"]
async fn test_concurrent_earn_same_order_creates_one_row() {
    let pool = setup_pool().await;
    let scope = random_scope();
    let campaign_id = seed_campaign(&pool, scope).await;
    let rule_id = seed_rule(&pool, scope, campaign_id, "EARN", "PERCENTAGE", dec("0.10")).await;
    let ledger = ledger(&pool);
    let customer_id = test_customer_id();
    let order_id = test_order_id();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let ledger = ledger.clone();
            let customer_id = customer_id.clone();
            let snapshot = order(&order_id, "200");
            tokio::spawn(async move {
                ledger
                    .earn(scope, &customer_id, RuleRef::Rule(rule_id), &snapshot)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().activity.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);

    let activities = ActivityRepository::new(pool.clone());
    assert_eq!(activities.balance(scope, &customer_id).await.unwrap(), dec("20.00"));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL，设置 DATABASE_URL 后使用 --ignored 运行"]
async fn test_concurrent_burns_never_overdraw() {
    let pool = setup_pool().await;
    let scope = random_scope();
    let campaign_id = seed_campaign(&pool, scope).await;
    let earn = seed_rule(&pool, scope, campaign_id, "EARN", "FIXED", dec("100")).await;
    let burn = seed_rule(&pool, scope, campaign_id, "BURN", "FIXED", dec("30")).await;
    let ledger = ledger(&pool);

    ledger
        .earn(scope, "pg-cust", RuleRef::Rule(earn), &order("PG-E", "1"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let snapshot = order(&format!("PG-B-{}", i), "0");
                ledger.burn(scope, "pg-cust", burn, &snapshot).await
            })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(ok, 3);

    let activities = ActivityRepository::new(pool.clone());
    assert_eq!(activities.balance(scope, "pg-cust").await.unwrap(), dec("10.00"));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL，设置 DATABASE_URL 后使用 --ignored 运行"]
async fn test_coupon_redeemed_once() {
    let pool = setup_pool().await;
    let scope = random_scope();
    seed_coupon(&pool, scope, "PG-ONCE", "pg-cust").await;
    let ledger = ledger(&pool);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let snapshot = order(&format!("PG-R-{}", i), "10");
                ledger
                    .redeem_coupon(scope, "pg-cust", "PG-ONCE", &snapshot)
                    .await
            })
        })
        .collect();

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                won += 1;
                assert_eq!(receipt.activity.amount, dec("10.00"));
            }
            Err(LedgerError::CouponAlreadyRedeemed { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(won, 1);
}
