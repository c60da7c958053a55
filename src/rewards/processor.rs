//! Reward Processor
//!
//! Validates, prices and credits one reward-eligible action:
//!
//! ```text
//! account ─► rule ─► trust gate ─► frequency caps ─► amount × multipliers × decay
//!                                                         │
//!                                  credit + transaction + daily counter (one unit)
//! ```
//!
//! Fixed-economics awards (marketplace purchase, product sold, ancestor
//! referral bonuses) go through the same gates but credit a precomputed amount.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::RewardsStore;
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{Account, LedgerEntry};
use crate::rewards::rules::{RuleEngine, activity_caps};
use crate::rewards::tier::{TierCatalog, trust_multiplier};

pub const PURCHASE_PRODUCT: &str = "purchase_product";
pub const MARKETPLACE_PURCHASE: &str = "marketplace_purchase";
pub const PRODUCT_SOLD: &str = "product_sold";

const PURCHASE_BASE_REWARD: Decimal = dec!(10);
const PURCHASE_REWARD_RATE: Decimal = dec!(0.01);
const PURCHASE_REWARD_CAP: Decimal = dec!(200);
const PRODUCT_SOLD_BASE_REWARD: Decimal = dec!(750);
const MARKETPLACE_TRUST_IMPACT: Decimal = dec!(0.1);
const PRODUCT_SOLD_TRUST_IMPACT: Decimal = dec!(0.5);

/// Round a point amount to 2 decimal places, half away from zero
pub fn round_points(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn amount_overflow() -> RewardsError {
    RewardsError::InvalidInput("award amount is out of range".to_string())
}

/// How the credited amount is priced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AwardBasis {
    /// Rule base × trust multiplier × personal multiplier × decay
    RuleBased,
    /// Precomputed amount, credited without further multipliers
    Fixed(Decimal),
}

#[derive(Debug, Clone)]
pub struct AwardRequest {
    pub user_id: String,
    pub action_type: String,
    pub metadata: Value,
    pub basis: AwardBasis,
    pub trust_score_impact: Decimal,
    pub description: Option<String>,
}

impl AwardRequest {
    pub fn new(user_id: impl Into<String>, action_type: impl Into<String>, metadata: Value) -> Self {
        Self {
            user_id: user_id.into(),
            action_type: action_type.into(),
            metadata,
            basis: AwardBasis::RuleBased,
            trust_score_impact: Decimal::ZERO,
            description: None,
        }
    }

    pub fn fixed(mut self, amount: Decimal) -> Self {
        self.basis = AwardBasis::Fixed(amount);
        self
    }

    pub fn with_trust_impact(mut self, impact: Decimal) -> Self {
        self.trust_score_impact = impact;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub multiplier_applied: Decimal,
    pub decay_factor: Decimal,
    pub transaction_id: Uuid,
    pub message: String,
}

pub struct RewardProcessor {
    store: Arc<dyn RewardsStore>,
    rules: RuleEngine,
}

impl RewardProcessor {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self {
            rules: RuleEngine::new(store.clone()),
            store,
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub async fn get_account(&self, user_id: &str) -> RewardsResult<Option<Account>> {
        Ok(self.store.get_account(user_id).await?)
    }

    /// Load the account, creating it with defaults on first use
    pub async fn ensure_account(&self, user_id: &str) -> RewardsResult<Account> {
        if user_id.trim().is_empty() {
            return Err(RewardsError::InvalidInput("user_id cannot be empty".to_string()));
        }
        if let Some(account) = self.store.get_account(user_id).await? {
            return Ok(account);
        }
        let account = self.store.insert_account_if_absent(&Account::new(user_id)).await?;
        info!(user_id = %user_id, "Rewards account initialized");
        Ok(account)
    }

    pub async fn award_points(
        &self,
        user_id: &str,
        action_type: &str,
        metadata: Value,
    ) -> RewardsResult<AwardOutcome> {
        self.award(AwardRequest::new(user_id, action_type, metadata)).await
    }

    pub async fn award(&self, request: AwardRequest) -> RewardsResult<AwardOutcome> {
        let now = Utc::now();
        let result = self.award_at(&request, now).await;
        if let Err(RewardsError::Persistence(ref e)) = result {
            warn!(
                user_id = %request.user_id,
                action_type = %request.action_type,
                error = %e,
                "Failed to award points"
            );
        }
        result
    }

    async fn award_at(&self, request: &AwardRequest, now: DateTime<Utc>) -> RewardsResult<AwardOutcome> {
        let account = self.ensure_account(&request.user_id).await?;

        let rule = self
            .rules
            .rule_for_action(&request.action_type)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("Reward rule for {}", request.action_type)))?;

        if account.trust_score < rule.minimum_trust_score {
            return Err(RewardsError::NotEligible(format!(
                "Trust score too low. Required: {}, Current: {}",
                rule.minimum_trust_score, account.trust_score
            )));
        }

        if !self.rules.can_complete(&account.user_id, &rule, now).await? {
            return Err(RewardsError::NotEligible("Activity limit reached".to_string()));
        }

        let (raw_amount, multiplier, decay) = match request.basis {
            AwardBasis::RuleBased => {
                let multiplier = trust_multiplier(account.trust_level)
                    .checked_mul(account.reward_multiplier)
                    .ok_or_else(amount_overflow)?;
                let decay = self.rules.decay_factor(&account.user_id, &rule, now).await?;
                let raw = rule
                    .base_eloits
                    .checked_mul(multiplier)
                    .and_then(|amount| amount.checked_mul(decay))
                    .ok_or_else(amount_overflow)?;
                (raw, multiplier, decay)
            }
            AwardBasis::Fixed(amount) => (amount, Decimal::ONE, Decimal::ONE),
        };
        let amount = round_points(raw_amount);
        if amount < Decimal::ZERO {
            return Err(RewardsError::InvalidInput("award amount cannot be negative".to_string()));
        }

        let mut entry = LedgerEntry::new(
            &rule.action_type,
            amount,
            request.description.clone().unwrap_or_else(|| rule.description.clone()),
        )
        .with_metadata(request.metadata.clone())
        .with_caps(activity_caps(&rule, now));
        entry.multiplier_applied = multiplier;
        entry.decay_factor = decay;
        entry.trust_score_impact = request.trust_score_impact;

        let (updated, transaction) = self
            .store
            .credit_account(&account.user_id, entry, now)
            .await?;

        info!(
            user_id = %updated.user_id,
            action_type = %rule.action_type,
            amount = %amount,
            multiplier = %multiplier,
            decay = %decay,
            balance = %updated.current_balance,
            "Points awarded"
        );

        Ok(AwardOutcome {
            amount,
            balance_after: updated.current_balance,
            multiplier_applied: multiplier,
            decay_factor: decay,
            transaction_id: transaction.id,
            message: format!("Successfully earned {} ELO points!", amount.normalize()),
        })
    }

    /// `min(10 + 1% of the purchase, 200)` points, plus a zero-amount
    /// `marketplace_purchase` audit row carrying a small trust impact
    pub async fn handle_marketplace_purchase_reward(
        &self,
        user_id: &str,
        purchase_amount: Decimal,
        product_id: &str,
    ) -> RewardsResult<AwardOutcome> {
        if purchase_amount < Decimal::ZERO {
            return Err(RewardsError::InvalidInput(
                "purchase amount cannot be negative".to_string(),
            ));
        }
        let reward = round_points(
            (PURCHASE_BASE_REWARD + purchase_amount * PURCHASE_REWARD_RATE).min(PURCHASE_REWARD_CAP),
        );

        let request = AwardRequest::new(
            user_id,
            PURCHASE_PRODUCT,
            json!({
                "purchaseAmount": purchase_amount,
                "productId": product_id,
                "calculatedReward": reward,
            }),
        )
        .fixed(reward);
        let mut outcome = self.award(request).await?;

        let audit = LedgerEntry::new(
            MARKETPLACE_PURCHASE,
            Decimal::ZERO,
            format!("Marketplace purchase reward for ${}", purchase_amount),
        )
        .with_metadata(json!({
            "productId": product_id,
            "purchaseAmount": purchase_amount,
            "rewardType": "purchase",
            "reward": outcome.amount,
            "rewardTransactionId": outcome.transaction_id,
        }));
        let audit = LedgerEntry {
            trust_score_impact: MARKETPLACE_TRUST_IMPACT,
            ..audit
        };
        if let Err(e) = self.store.append_transaction(user_id, audit, Utc::now()).await {
            warn!(user_id = %user_id, product_id = %product_id, error = %e, "Failed to log marketplace purchase row");
        }

        outcome.message = format!(
            "Successfully earned {} ELO for marketplace purchase!",
            outcome.amount.normalize()
        );
        Ok(outcome)
    }

    /// 750 points scaled by the seller's point tier multiplier
    pub async fn handle_product_sold_reward(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> RewardsResult<AwardOutcome> {
        let account = self
            .get_account(user_id)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("Account {}", user_id)))?;
        let tier_multiplier = TierCatalog::multiplier_for(account.tier);
        let reward = round_points(PRODUCT_SOLD_BASE_REWARD * tier_multiplier);
        debug!(user_id = %user_id, tier = %account.tier, reward = %reward, "Pricing product sold reward");

        let request = AwardRequest::new(
            user_id,
            PRODUCT_SOLD,
            json!({
                "productId": product_id,
                "rewardType": "product_sold",
                "baseReward": PRODUCT_SOLD_BASE_REWARD,
                "tierMultiplier": tier_multiplier,
                "calculatedReward": reward,
            }),
        )
        .fixed(reward)
        .with_trust_impact(PRODUCT_SOLD_TRUST_IMPACT)
        .with_description("Product sold reward");

        let mut outcome = self.award(request).await?;
        outcome.multiplier_applied = tier_multiplier;
        outcome.message = format!(
            "Successfully earned {} ELO for selling product!",
            outcome.amount.normalize()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LedgerRepository, MemoryStore, RuleRepository};
    use crate::rewards::models::RewardRule;
    use crate::rewards::tier::Tier;

    async fn processor_with(rules: Vec<RewardRule>) -> (Arc<MemoryStore>, RewardProcessor) {
        let store = Arc::new(MemoryStore::new());
        for rule in rules {
            store.upsert_rule(&rule).await.unwrap();
        }
        let processor = RewardProcessor::new(store.clone());
        (store, processor)
    }

    #[test]
    fn test_round_points_half_up() {
        assert_eq!(round_points(dec!(1.005)), dec!(1.01));
        assert_eq!(round_points(dec!(1.004)), dec!(1.00));
        assert_eq!(round_points(dec!(12)), dec!(12));
    }

    #[tokio::test]
    async fn test_award_applies_trust_and_personal_multiplier() {
        let (store, processor) = processor_with(vec![RewardRule::new("post_content", dec!(10))]).await;
        let mut account = Account::new("user_1");
        account.reward_multiplier = dec!(1.5);
        store.seed_account(account).await;

        // trust 50 → silver → 1.2
        let outcome = processor
            .award_points("user_1", "post_content", json!({}))
            .await
            .unwrap();
        assert_eq!(outcome.amount, dec!(18));
        assert_eq!(outcome.multiplier_applied, dec!(1.8));
        assert_eq!(outcome.balance_after, dec!(18));
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_are_rejected() {
        let (store, processor) = processor_with(vec![
            RewardRule::new("big", Decimal::MAX),
            RewardRule::new("post_content", dec!(10)),
        ])
        .await;

        let err = processor.award_points("user_1", "big", json!({})).await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));
        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, Decimal::ZERO);

        let mut rich = Account::new("rich");
        rich.current_balance = Decimal::MAX;
        rich.total_earned = Decimal::MAX;
        store.seed_account(rich).await;
        let err = processor.award_points("rich", "post_content", json!({})).await.unwrap_err();
        assert!(matches!(err, RewardsError::InvalidInput(_)));
        assert!(store.list_transactions("rich", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_rule_has_no_side_effects_beyond_init() {
        let (store, processor) = processor_with(vec![]).await;
        let err = processor
            .award_points("user_1", "post_content", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));
        assert!(store.list_transactions("user_1", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trust_gate() {
        let rule = RewardRule::new("post_content", dec!(10)).with_minimum_trust(60);
        let (store, processor) = processor_with(vec![rule]).await;
        store.seed_account(Account::new("user_1")).await;

        let err = processor
            .award_points("user_1", "post_content", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Trust score too low. Required: 60, Current: 50");
        let account = store.get_account("user_1").await.unwrap().unwrap();
        assert_eq!(account.current_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_fixed_award_skips_multipliers() {
        let (store, processor) = processor_with(vec![RewardRule::new(PRODUCT_SOLD, dec!(1))]).await;
        let mut account = Account::new("seller");
        account.total_earned = dec!(30000);
        account.tier = Tier::Gold;
        account.trust_score = 95;
        account.trust_level = Tier::Diamond;
        store.seed_account(account).await;

        let outcome = processor
            .handle_product_sold_reward("seller", "prod_1")
            .await
            .unwrap();
        assert_eq!(outcome.amount, dec!(1125));
        assert_eq!(outcome.multiplier_applied, dec!(1.5));

        let rows = store.list_transactions("seller", 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trust_score_impact, dec!(0.5));
    }

    #[tokio::test]
    async fn test_product_sold_requires_account() {
        let (_, processor) = processor_with(vec![RewardRule::new(PRODUCT_SOLD, dec!(1))]).await;
        let err = processor
            .handle_product_sold_reward("ghost", "prod_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_marketplace_reward_is_capped_and_reconciles() {
        let (store, processor) = processor_with(vec![RewardRule::new(PURCHASE_PRODUCT, dec!(1))]).await;

        let small = processor
            .handle_marketplace_purchase_reward("buyer", dec!(250), "prod_1")
            .await
            .unwrap();
        assert_eq!(small.amount, dec!(12.50));

        let large = processor
            .handle_marketplace_purchase_reward("buyer", dec!(1000000), "prod_2")
            .await
            .unwrap();
        assert_eq!(large.amount, dec!(200));

        let rows = store.list_transactions("buyer", 10, 0).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows.iter().filter(|tx| tx.action_type == MARKETPLACE_PURCHASE).count(),
            2
        );
        let ledger_sum: Decimal = rows.iter().map(|tx| tx.amount).sum();
        let account = store.get_account("buyer").await.unwrap().unwrap();
        assert_eq!(ledger_sum, account.total_earned - account.total_spent);
    }
}
