//! 奖励计算
//!
//! 百分比规则：`round_half_up(base * reward_value, 2)`，reward_value 为小数（0.10 = 10%），
//! base 优先取小计。固定规则直接取 reward_value。消耗方向存为负数。

use rust_decimal::Decimal;

use crate::models::{EvidenceFacts, RewardKind, Rule, RuleDirection, round_money};

/// 奖励绝对值，不小于 0
pub fn compute_reward(rule: &Rule, facts: &EvidenceFacts) -> Decimal {
    let raw = match rule.reward_kind {
        RewardKind::Percentage => facts.base() * rule.reward_value,
        RewardKind::Fixed => rule.reward_value,
    };
    round_money(raw.max(Decimal::ZERO))
}

/// 写入流水的带符号金额
pub fn signed_amount(rule: &Rule, facts: &EvidenceFacts) -> Decimal {
    let reward = compute_reward(rule, facts);
    match rule.direction {
        RuleDirection::Earn => reward,
        RuleDirection::Burn => -reward,
    }
}
