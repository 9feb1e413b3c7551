//! 规则与优惠券目录查询
//!
//! 所有查询按 `TenantScope` 过滤并带超时，超时返回 `LedgerUnavailable`。
//! 任何"找不到"或"不适用"都归并为同一个 `RuleNotApplicable`。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{Campaign, Coupon, EvidenceFacts, Rule, RuleDirection, RuleRef, TenantScope};
use crate::repository::CatalogRepositoryTrait;

pub struct CatalogService {
    repo: Arc<dyn CatalogRepositoryTrait>,
    lookup_timeout: Duration,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepositoryTrait>, lookup_timeout: Duration) -> Self {
        Self {
            repo,
            lookup_timeout,
        }
    }

    async fn bounded<T>(&self, what: &str, lookup: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    lookup = what,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "目录查询超时"
                );
                Err(LedgerError::LedgerUnavailable)
            }
        }
    }

    async fn campaign(&self, scope: TenantScope, campaign_id: Uuid) -> Result<Option<Campaign>> {
        self.bounded("campaign", self.repo.get_campaign(scope, campaign_id))
            .await
    }

    /// 按规则或活动引用找出适用的规则
    ///
    /// 活动引用取该方向下谓词成立的第一条规则（按 id 升序）
    #[instrument(skip_all, fields(scope = %scope, rule_ref = %rule_ref))]
    pub async fn find_applicable_rule(
        &self,
        scope: TenantScope,
        rule_ref: RuleRef,
        direction: RuleDirection,
        facts: &EvidenceFacts,
        now: DateTime<Utc>,
    ) -> Result<Rule> {
        let base = facts.base();
        let not_applicable = || {
            LedgerError::RuleNotApplicable(format!("{} ({})", rule_ref, direction.as_str()))
        };

        match rule_ref {
            RuleRef::Rule(rule_id) => {
                let rule = self
                    .bounded("rule", self.repo.get_rule(scope, rule_id))
                    .await?
                    .ok_or_else(not_applicable)?;
                let campaign = self
                    .campaign(scope, rule.campaign_id)
                    .await?
                    .ok_or_else(not_applicable)?;

                if rule.applies(&campaign, direction, base, now) {
                    Ok(rule)
                } else {
                    debug!(rule_id, "规则谓词不成立");
                    Err(not_applicable())
                }
            }
            RuleRef::Campaign(campaign_id) => {
                let campaign = self
                    .campaign(scope, campaign_id)
                    .await?
                    .ok_or_else(not_applicable)?;
                let rules = self
                    .bounded(
                        "campaign_rules",
                        self.repo.list_campaign_rules(scope, campaign_id, direction),
                    )
                    .await?;

                rules
                    .into_iter()
                    .find(|rule| rule.applies(&campaign, direction, base, now))
                    .ok_or_else(not_applicable)
            }
        }
    }

    /// 按事件名找出适用的规则，方向由规则自身决定
    #[instrument(skip_all, fields(scope = %scope, event_name = %event_name))]
    pub async fn find_rule_for_event(
        &self,
        scope: TenantScope,
        event_name: &str,
        facts: &EvidenceFacts,
        now: DateTime<Utc>,
    ) -> Result<Rule> {
        let rules = self
            .bounded("event_rules", self.repo.list_rules_by_event(scope, event_name))
            .await?;

        let base = facts.base();
        let mut campaigns: Vec<Campaign> = Vec::new();
        for rule in rules {
            let campaign = match campaigns.iter().find(|c| c.id == rule.campaign_id) {
                Some(c) => c.clone(),
                None => match self.campaign(scope, rule.campaign_id).await? {
                    Some(c) => {
                        campaigns.push(c.clone());
                        c
                    }
                    None => continue,
                },
            };
            if rule.applies(&campaign, rule.direction, base, now) {
                return Ok(rule);
            }
        }

        Err(LedgerError::RuleNotApplicable(format!("event {}", event_name)))
    }

    /// 按券码查找优惠券（券码在作用域内唯一）
    pub async fn find_coupon(&self, scope: TenantScope, code: &str) -> Result<Coupon> {
        self.bounded("coupon", self.repo.find_coupon(scope, code))
            .await?
            .ok_or_else(|| LedgerError::RuleNotApplicable(format!("coupon {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::fixtures::{campaign, rule};
    use crate::models::{CampaignStatus, RewardKind};
    use crate::repository::MockCatalogRepositoryTrait;
    use rust_decimal::Decimal;

    fn scope() -> TenantScope {
        TenantScope::new(1, 1)
    }

    fn facts(base: &str) -> EvidenceFacts {
        EvidenceFacts {
            amount: Some(base.parse().unwrap()),
            subtotal: None,
            order_id: None,
        }
    }

    fn service(repo: MockCatalogRepositoryTrait) -> CatalogService {
        CatalogService::new(Arc::new(repo), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_rule_ref_with_live_campaign() {
        let c = campaign(scope(), CampaignStatus::Active);
        let r = rule(&c, 5, RuleDirection::Earn, RewardKind::Percentage, "0.10");

        let mut repo = MockCatalogRepositoryTrait::new();
        let rc = r.clone();
        repo.expect_get_rule().returning(move |_, _| Ok(Some(rc.clone())));
        let cc = c.clone();
        repo.expect_get_campaign().returning(move |_, _| Ok(Some(cc.clone())));

        let found = service(repo)
            .find_applicable_rule(
                scope(),
                RuleRef::Rule(5),
                RuleDirection::Earn,
                &facts("10"),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(found.id, 5);
    }

    #[tokio::test]
    async fn test_wrong_direction_is_not_applicable() {
        let c = campaign(scope(), CampaignStatus::Active);
        let r = rule(&c, 5, RuleDirection::Earn, RewardKind::Fixed, "1");

        let mut repo = MockCatalogRepositoryTrait::new();
        repo.expect_get_rule().returning(move |_, _| Ok(Some(r.clone())));
        repo.expect_get_campaign().returning(move |_, _| Ok(Some(c.clone())));

        let result = service(repo)
            .find_applicable_rule(
                scope(),
                RuleRef::Rule(5),
                RuleDirection::Burn,
                &facts("10"),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::RuleNotApplicable(_))));
    }

    #[tokio::test]
    async fn test_campaign_ref_picks_first_applicable_rule() {
        let c = campaign(scope(), CampaignStatus::Active);
        let mut gated = rule(&c, 3, RuleDirection::Earn, RewardKind::Fixed, "50");
        gated.min_order_amount = Some(Decimal::from(1000));
        let open = rule(&c, 4, RuleDirection::Earn, RewardKind::Fixed, "5");

        let mut repo = MockCatalogRepositoryTrait::new();
        let cc = c.clone();
        repo.expect_get_campaign().returning(move |_, _| Ok(Some(cc.clone())));
        repo.expect_list_campaign_rules()
            .returning(move |_, _, _| Ok(vec![gated.clone(), open.clone()]));

        let found = service(repo)
            .find_applicable_rule(
                scope(),
                RuleRef::Campaign(c.id),
                RuleDirection::Earn,
                &facts("200"),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(found.id, 4);
    }

    #[tokio::test]
    async fn test_inactive_campaign_is_not_applicable() {
        let c = campaign(scope(), CampaignStatus::Suspended);
        let r = rule(&c, 8, RuleDirection::Earn, RewardKind::Fixed, "1");

        let mut repo = MockCatalogRepositoryTrait::new();
        repo.expect_get_rule().returning(move |_, _| Ok(Some(r.clone())));
        repo.expect_get_campaign().returning(move |_, _| Ok(Some(c.clone())));

        let result = service(repo)
            .find_applicable_rule(
                scope(),
                RuleRef::Rule(8),
                RuleDirection::Earn,
                &facts("1"),
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::RuleNotApplicable(_))));
    }

    #[tokio::test]
    async fn test_missing_coupon_is_rule_not_applicable() {
        let mut repo = MockCatalogRepositoryTrait::new();
        repo.expect_find_coupon().returning(|_, _| Ok(None));

        let result = service(repo).find_coupon(scope(), "NOPE").await;
        assert!(matches!(result, Err(LedgerError::RuleNotApplicable(_))));
    }

    #[tokio::test]
    async fn test_event_rule_uses_rule_direction() {
        let c = campaign(scope(), CampaignStatus::Active);
        let mut r = rule(&c, 9, RuleDirection::Burn, RewardKind::Fixed, "20");
        r.event_name = Some("redeem_gift".into());

        let mut repo = MockCatalogRepositoryTrait::new();
        repo.expect_list_rules_by_event()
            .returning(move |_, _| Ok(vec![r.clone()]));
        repo.expect_get_campaign()
            .times(1)
            .returning(move |_, _| Ok(Some(c.clone())));

        let found = service(repo)
            .find_rule_for_event(scope(), "redeem_gift", &EvidenceFacts::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(found.direction, RuleDirection::Burn);
    }
}
