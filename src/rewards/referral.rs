//! Referral Graph
//!
//! A referee has at most one referrer. The direct referrer earns whatever the
//! `refer_user` rule pays; up to two further ancestors earn flat bonuses
//! through `multi_level_referral`. Traversal is depth-bounded, so cycles in
//! the stored edges cannot loop it.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{RewardsStore, StoreError};
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{ReferralEdge, ReferralLink, ReferralStatus};
use crate::rewards::processor::{AwardRequest, RewardProcessor};

pub const REFER_USER: &str = "refer_user";
pub const MULTI_LEVEL_REFERRAL: &str = "multi_level_referral";
pub const MAX_REFERRAL_DEPTH: i32 = 3;

/// Flat bonus for an ancestor at `level` (2 or 3)
pub fn ancestor_bonus(level: i32) -> Option<Decimal> {
    match level {
        2 => Some(dec!(100)),
        3 => Some(dec!(50)),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub referral: ReferralEdge,
    pub reward: Decimal,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReward {
    pub level: i32,
    pub amount: Decimal,
    pub user_id: String,
}

pub struct ReferralGraph {
    store: Arc<dyn RewardsStore>,
    processor: Arc<RewardProcessor>,
}

impl ReferralGraph {
    pub fn new(store: Arc<dyn RewardsStore>, processor: Arc<RewardProcessor>) -> Self {
        Self { store, processor }
    }

    /// Register a referral code for a user; a random code is generated when none is given
    pub async fn create_referral_link(
        &self,
        user_id: &str,
        code: Option<String>,
    ) -> RewardsResult<ReferralLink> {
        if user_id.trim().is_empty() {
            return Err(RewardsError::InvalidInput("user_id cannot be empty".to_string()));
        }
        let referral_code = match code {
            Some(code) if code.trim().is_empty() => {
                return Err(RewardsError::InvalidInput("referral code cannot be empty".to_string()));
            }
            Some(code) => code.trim().to_string(),
            None => Uuid::new_v4().simple().to_string()[..10].to_uppercase(),
        };

        let link = ReferralLink {
            referral_code,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_referral_link(&link).await.map_err(|e| match e {
            StoreError::Conflict(msg) => RewardsError::InvalidInput(msg),
            other => other.into(),
        })?;

        info!(user_id = %user_id, code = %link.referral_code, "Referral link created");
        Ok(link)
    }

    pub async fn process_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        referral_code: &str,
    ) -> RewardsResult<ReferralOutcome> {
        if referrer_id.trim().is_empty() || referee_id.trim().is_empty() {
            return Err(RewardsError::InvalidInput("referrer and referee are required".to_string()));
        }
        if referrer_id == referee_id {
            return Err(RewardsError::InvalidInput("users cannot refer themselves".to_string()));
        }

        if self.store.find_referral_link(referral_code).await?.is_none() {
            return Err(RewardsError::NotFound(format!("Referral code {}", referral_code)));
        }
        if self.store.find_referral_for_referee(referee_id).await?.is_some() {
            return Err(RewardsError::DuplicateReferral);
        }

        let edge = ReferralEdge {
            id: Uuid::new_v4(),
            referrer_id: referrer_id.to_string(),
            referee_id: referee_id.to_string(),
            referral_code: referral_code.to_string(),
            status: ReferralStatus::Pending,
            depth: 1,
            reward_earned: Decimal::ZERO,
            created_at: Utc::now(),
            verified_at: None,
        };
        self.store.insert_referral(&edge).await.map_err(|e| match e {
            StoreError::Conflict(_) => RewardsError::DuplicateReferral,
            other => other.into(),
        })?;

        // The edge stays pending when the referrer cannot be paid
        let award = self
            .processor
            .award(AwardRequest::new(
                referrer_id,
                REFER_USER,
                json!({ "refereeId": referee_id, "referralCode": referral_code }),
            ))
            .await?;

        let completed = self
            .store
            .complete_referral(edge.id, award.amount, Utc::now())
            .await?;

        info!(
            referrer_id = %referrer_id,
            referee_id = %referee_id,
            reward = %award.amount,
            "Referral completed"
        );
        Ok(ReferralOutcome {
            referral: completed,
            reward: award.amount,
            message: format!("Referral successful! Earned {} ELO", award.amount.normalize()),
        })
    }

    /// Direct referral plus ancestor bonuses. A failed direct referral is an
    /// error; ancestor levels are best-effort and stop at the first failure.
    pub async fn process_multi_level_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        referral_code: &str,
    ) -> RewardsResult<Vec<LevelReward>> {
        let direct = self
            .process_referral(referrer_id, referee_id, referral_code)
            .await?;
        let mut rewards = vec![LevelReward {
            level: 1,
            amount: direct.reward,
            user_id: referrer_id.to_string(),
        }];

        let mut current = referrer_id.to_string();
        for level in 2..=MAX_REFERRAL_DEPTH {
            let upstream = match self.store.find_referral_for_referee(&current).await {
                Ok(Some(edge)) => edge,
                Ok(None) => break,
                Err(e) => {
                    warn!(user_id = %current, error = %e, "Failed to look up upstream referrer");
                    break;
                }
            };
            let ancestor = upstream.referrer_id;
            if ancestor == referee_id {
                break;
            }
            let Some(bonus) = ancestor_bonus(level) else { break };

            let request = AwardRequest::new(
                ancestor.as_str(),
                MULTI_LEVEL_REFERRAL,
                json!({
                    "refereeId": referee_id,
                    "referralCode": referral_code,
                    "level": level,
                    "baseReward": bonus,
                }),
            )
            .fixed(bonus);
            match self.processor.award(request).await {
                Ok(outcome) => rewards.push(LevelReward {
                    level,
                    amount: outcome.amount,
                    user_id: ancestor.clone(),
                }),
                Err(e) => {
                    warn!(user_id = %ancestor, level, error = %e, "Ancestor referral bonus not awarded");
                    break;
                }
            }
            current = ancestor;
        }

        Ok(rewards)
    }

    pub async fn get_user_referrals(&self, user_id: &str) -> RewardsResult<Vec<ReferralEdge>> {
        Ok(self.store.list_referrals_by_referrer(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LedgerRepository, MemoryStore, RuleRepository};
    use crate::rewards::models::RewardRule;

    async fn graph() -> (Arc<MemoryStore>, ReferralGraph) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_rule(&RewardRule::new(REFER_USER, dec!(500)))
            .await
            .unwrap();
        store
            .upsert_rule(&RewardRule::new(MULTI_LEVEL_REFERRAL, dec!(1)))
            .await
            .unwrap();
        let processor = Arc::new(RewardProcessor::new(store.clone()));
        let graph = ReferralGraph::new(store.clone(), processor);
        (store, graph)
    }

    #[test]
    fn test_ancestor_bonus_table() {
        assert_eq!(ancestor_bonus(1), None);
        assert_eq!(ancestor_bonus(2), Some(dec!(100)));
        assert_eq!(ancestor_bonus(3), Some(dec!(50)));
        assert_eq!(ancestor_bonus(4), None);
    }

    #[tokio::test]
    async fn test_invalid_code_and_self_referral() {
        let (_, graph) = graph().await;
        let err = graph.process_referral("a", "b", "NOPE").await.unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));

        graph.create_referral_link("a", Some("CODE_A".to_string())).await.unwrap();
        let err = graph.process_referral("a", "a", "CODE_A").await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_direct_referral_and_duplicate() {
        let (store, graph) = graph().await;
        graph.create_referral_link("a", Some("CODE_A".to_string())).await.unwrap();

        let outcome = graph.process_referral("a", "b", "CODE_A").await.unwrap();
        // trust 50 → silver multiplier 1.2
        assert_eq!(outcome.reward, dec!(600));
        assert_eq!(outcome.referral.status, ReferralStatus::Completed);
        assert_eq!(store.get_account("a").await.unwrap().unwrap().referral_count, 1);

        let err = graph.process_referral("a", "b", "CODE_A").await.unwrap_err();
        assert!(matches!(err, RewardsError::DuplicateReferral));
        assert_eq!(graph.get_user_referrals("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cascade_is_capped_at_three_levels() {
        let (_, graph) = graph().await;
        graph.create_referral_link("d", Some("CODE_D".to_string())).await.unwrap();
        graph.create_referral_link("c", Some("CODE_C".to_string())).await.unwrap();
        graph.create_referral_link("a", Some("CODE_A".to_string())).await.unwrap();
        graph.create_referral_link("z", Some("CODE_Z".to_string())).await.unwrap();

        // z → d → c → a → b
        graph.process_referral("z", "d", "CODE_Z").await.unwrap();
        graph.process_referral("d", "c", "CODE_D").await.unwrap();
        graph.process_referral("c", "a", "CODE_C").await.unwrap();

        let rewards = graph
            .process_multi_level_referral("a", "b", "CODE_A")
            .await
            .unwrap();
        let levels: Vec<(i32, &str)> = rewards.iter().map(|r| (r.level, r.user_id.as_str())).collect();
        assert_eq!(levels, vec![(1, "a"), (2, "c"), (3, "d")]);
        assert_eq!(rewards[1].amount, dec!(100));
        assert_eq!(rewards[2].amount, dec!(50));
    }

    #[tokio::test]
    async fn test_generated_codes_are_unique() {
        let (_, graph) = graph().await;
        let first = graph.create_referral_link("a", None).await.unwrap();
        let second = graph.create_referral_link("a", None).await.unwrap();
        assert_eq!(first.referral_code.len(), 10);
        assert_ne!(first.referral_code, second.referral_code);

        let err = graph
            .create_referral_link("b", Some(first.referral_code.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));
    }
}
