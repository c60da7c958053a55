//! Eloits Engine
//!
//! Single entry point over the rewards services. Route handlers and other
//! callers talk to this type only; every operation returns a
//! [`RewardsResult`] and storage failures are logged here before they leave.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::database::{MemoryStore, RewardsStore};
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{
    Account, Redemption, RedemptionStatus, RedemptionUpdate, ReferralEdge, ReferralLink,
    RewardRule, RewardTransaction, SpamDetection, TrustDecayEntry, TrustHistoryEntry,
};
use crate::rewards::processor::{AwardOutcome, RewardProcessor};
use crate::rewards::redemption::{RedemptionProcessor, RedemptionReceipt, RedemptionRequest};
use crate::rewards::referral::{LevelReward, ReferralGraph, ReferralOutcome};
use crate::rewards::settings::{ConfigStore, SystemConfig};
use crate::rewards::spam::{SpamCheck, SpamGuard};
use crate::rewards::tier::{Tier, TierCatalog, TierConfig, trust_level_for_score, trust_multiplier};
use crate::rewards::trust::TrustEngine;

pub const DEFAULT_TRANSACTION_LIMIT: i64 = 50;
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;

pub struct EloitsEngine {
    store: Arc<dyn RewardsStore>,
    config: ConfigStore,
    processor: Arc<RewardProcessor>,
    trust: TrustEngine,
    spam: SpamGuard,
    referrals: ReferralGraph,
    redemptions: RedemptionProcessor,
}

impl EloitsEngine {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        let processor = Arc::new(RewardProcessor::new(store.clone()));
        Self {
            config: ConfigStore::new(store.clone()),
            trust: TrustEngine::new(store.clone()),
            spam: SpamGuard::new(store.clone()),
            referrals: ReferralGraph::new(store.clone(), processor.clone()),
            redemptions: RedemptionProcessor::new(store.clone()),
            processor,
            store,
        }
    }

    /// Engine over a fresh [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> Arc<dyn RewardsStore> {
        self.store.clone()
    }

    // Settings

    pub async fn get_system_config(&self) -> SystemConfig {
        self.config.get_system_config().await
    }

    pub async fn update_system_config(&self, entries: HashMap<String, String>) -> RewardsResult<()> {
        logged("update_system_config", self.config.update_system_config(entries).await)
    }

    // Accounts

    pub async fn get_user_eloits_data(&self, user_id: &str) -> RewardsResult<Option<Account>> {
        logged("get_user_eloits_data", self.processor.get_account(user_id).await)
    }

    pub async fn initialize_user_eloits_data(&self, user_id: &str) -> RewardsResult<Account> {
        logged("initialize_user_eloits_data", self.processor.ensure_account(user_id).await)
    }

    pub async fn get_transaction_history(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RewardsResult<Vec<RewardTransaction>> {
        let limit = limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT).clamp(1, 500);
        let offset = offset.unwrap_or(0).max(0);
        let result = self
            .store
            .list_transactions(user_id, limit, offset)
            .await
            .map_err(RewardsError::from);
        logged("get_transaction_history", result)
    }

    // Rules

    pub async fn get_reward_rules(&self) -> RewardsResult<Vec<RewardRule>> {
        logged("get_reward_rules", self.processor.rules().list_rules(true).await)
    }

    /// Every rule, inactive ones included
    pub async fn list_all_reward_rules(&self) -> RewardsResult<Vec<RewardRule>> {
        logged("list_all_reward_rules", self.processor.rules().list_rules(false).await)
    }

    pub async fn get_reward_rule_by_action(&self, action_type: &str) -> RewardsResult<Option<RewardRule>> {
        logged(
            "get_reward_rule_by_action",
            self.processor.rules().rule_for_action(action_type).await,
        )
    }

    pub async fn upsert_reward_rule(&self, rule: RewardRule) -> RewardsResult<RewardRule> {
        logged("upsert_reward_rule", self.processor.rules().upsert_rule(rule).await)
    }

    // Awards

    pub async fn award_points(
        &self,
        user_id: &str,
        action_type: &str,
        metadata: Value,
    ) -> RewardsResult<AwardOutcome> {
        self.processor.award_points(user_id, action_type, metadata).await
    }

    pub async fn handle_marketplace_purchase_reward(
        &self,
        user_id: &str,
        purchase_amount: Decimal,
        product_id: &str,
    ) -> RewardsResult<AwardOutcome> {
        self.processor
            .handle_marketplace_purchase_reward(user_id, purchase_amount, product_id)
            .await
    }

    pub async fn handle_product_sold_reward(&self, user_id: &str, product_id: &str) -> RewardsResult<AwardOutcome> {
        self.processor.handle_product_sold_reward(user_id, product_id).await
    }

    // Trust

    pub async fn update_trust_score(
        &self,
        user_id: &str,
        delta: i32,
        reason: &str,
        activity_type: Option<&str>,
    ) -> RewardsResult<Option<TrustHistoryEntry>> {
        self.trust
            .update_trust_score(user_id, delta, reason, activity_type)
            .await
    }

    pub fn get_trust_level(&self, score: i32) -> Tier {
        trust_level_for_score(score)
    }

    pub fn get_trust_multiplier(&self, level: Tier) -> Decimal {
        trust_multiplier(level)
    }

    pub async fn get_trust_history(&self, user_id: &str, limit: Option<i64>) -> RewardsResult<Vec<TrustHistoryEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        logged("get_trust_history", self.trust.get_trust_history(user_id, limit).await)
    }

    pub async fn get_trust_decay_history(
        &self,
        user_id: &str,
        limit: Option<i64>,
    ) -> RewardsResult<Vec<TrustDecayEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        logged(
            "get_trust_decay_history",
            self.trust.get_trust_decay_history(user_id, limit).await,
        )
    }

    pub async fn apply_inactivity_decay(&self, user_id: &str) -> RewardsResult<Option<TrustDecayEntry>> {
        logged("apply_inactivity_decay", self.trust.apply_inactivity_decay(user_id).await)
    }

    pub async fn apply_spam_decay(
        &self,
        user_id: &str,
        reason: &str,
        activity_type: Option<&str>,
    ) -> RewardsResult<Option<TrustDecayEntry>> {
        logged(
            "apply_spam_decay",
            self.trust.apply_spam_decay(user_id, reason, activity_type).await,
        )
    }

    // Tiers

    pub fn get_user_tier(&self, total_earned: Decimal) -> Tier {
        TierCatalog::tier_for_points(total_earned)
    }

    pub fn get_tier_config(&self, tier: Tier) -> &'static TierConfig {
        TierCatalog::config(tier)
    }

    pub fn get_all_tiers(&self) -> &'static [TierConfig] {
        TierCatalog::all()
    }

    // Spam

    pub async fn check_for_spam(&self, user_id: &str, action_type: &str) -> SpamCheck {
        self.spam.check_for_spam(user_id, action_type).await
    }

    pub async fn get_user_spam_records(&self, user_id: &str, limit: Option<i64>) -> RewardsResult<Vec<SpamDetection>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
        logged("get_user_spam_records", self.spam.get_user_spam_records(user_id, limit).await)
    }

    // Referrals

    pub async fn create_referral_link(&self, user_id: &str, code: Option<String>) -> RewardsResult<ReferralLink> {
        logged("create_referral_link", self.referrals.create_referral_link(user_id, code).await)
    }

    pub async fn process_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        referral_code: &str,
    ) -> RewardsResult<ReferralOutcome> {
        logged(
            "process_referral",
            self.referrals
                .process_referral(referrer_id, referee_id, referral_code)
                .await,
        )
    }

    pub async fn process_multi_level_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
        referral_code: &str,
    ) -> RewardsResult<Vec<LevelReward>> {
        logged(
            "process_multi_level_referral",
            self.referrals
                .process_multi_level_referral(referrer_id, referee_id, referral_code)
                .await,
        )
    }

    pub async fn get_user_referrals(&self, user_id: &str) -> RewardsResult<Vec<ReferralEdge>> {
        logged("get_user_referrals", self.referrals.get_user_referrals(user_id).await)
    }

    // Redemptions

    pub async fn calculate_cash_value(&self, points: Decimal) -> Decimal {
        self.redemptions.calculate_cash_value(points).await
    }

    pub async fn request_redemption(
        &self,
        user_id: &str,
        request: RedemptionRequest,
    ) -> RewardsResult<RedemptionReceipt> {
        logged(
            "request_redemption",
            self.redemptions.request_redemption(user_id, request).await,
        )
    }

    pub async fn get_redemptions(
        &self,
        user_id: &str,
        status: Option<RedemptionStatus>,
    ) -> RewardsResult<Vec<Redemption>> {
        logged("get_redemptions", self.redemptions.get_redemptions(user_id, status).await)
    }

    pub async fn list_all_redemptions(&self, status: Option<RedemptionStatus>) -> RewardsResult<Vec<Redemption>> {
        logged("list_all_redemptions", self.redemptions.list_all_redemptions(status).await)
    }

    pub async fn update_redemption_status(&self, update: RedemptionUpdate) -> RewardsResult<Redemption> {
        logged(
            "update_redemption_status",
            self.redemptions.update_redemption_status(update).await,
        )
    }
}

/// Log storage failures at the boundary; domain outcomes pass through quietly
fn logged<T>(operation: &str, result: RewardsResult<T>) -> RewardsResult<T> {
    if let Err(RewardsError::Persistence(ref e)) = result {
        error!(operation = %operation, error = %e, "Rewards operation failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let engine = EloitsEngine::in_memory();
        assert!(engine.get_user_eloits_data("user_1").await.unwrap().is_none());

        let first = engine.initialize_user_eloits_data("user_1").await.unwrap();
        let second = engine.initialize_user_eloits_data("user_1").await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.trust_score, 50);
        assert_eq!(second.tier, Tier::Bronze);
    }

    #[tokio::test]
    async fn test_award_then_history() {
        let engine = EloitsEngine::in_memory();
        engine
            .upsert_reward_rule(RewardRule::new("post_content", dec!(100)))
            .await
            .unwrap();

        let outcome = engine
            .award_points("user_1", "post_content", json!({ "postId": "p1" }))
            .await
            .unwrap();
        assert_eq!(outcome.amount, dec!(120));

        let history = engine.get_transaction_history("user_1", None, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].metadata["postId"], "p1");
    }

    #[tokio::test]
    async fn test_inactive_rule_is_hidden() {
        let engine = EloitsEngine::in_memory();
        let mut rule = RewardRule::new("like_post", dec!(5));
        rule.is_active = false;
        engine.upsert_reward_rule(rule).await.unwrap();

        assert!(engine.get_reward_rules().await.unwrap().is_empty());
        assert_eq!(engine.list_all_reward_rules().await.unwrap().len(), 1);
        assert!(engine.get_reward_rule_by_action("like_post").await.unwrap().is_none());

        let err = engine.award_points("user_1", "like_post", json!({})).await.unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));
    }

    #[test]
    fn test_tier_lookups() {
        let engine = EloitsEngine::in_memory();
        assert_eq!(engine.get_user_tier(dec!(20001)), Tier::Gold);
        assert_eq!(engine.get_tier_config(Tier::Gold).multiplier, dec!(1.5));
        assert_eq!(engine.get_all_tiers().len(), 5);
        assert_eq!(engine.get_trust_level(95), Tier::Diamond);
        assert_eq!(engine.get_trust_multiplier(Tier::Platinum), dec!(2.0));
    }
}
