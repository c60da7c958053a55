//! Trust Engine
//!
//! Integer trust score in 0..=100, adjusted by deltas, decayed by inactivity
//! and spam. Every change appends a history row; decays also land in the
//! decay audit log.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{RewardsStore, StoreError};
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{DecayReason, TrustDecayEntry, TrustHistoryEntry};
use crate::rewards::tier::{Tier, trust_level_for_score};

pub const INACTIVITY_GRACE_DAYS: i64 = 7;
pub const INACTIVITY_POINTS_PER_DAY: i64 = 2;
pub const MAX_INACTIVITY_DECAY: i64 = 10;
pub const SPAM_DECAY_POINTS: i32 = 5;
pub const INACTIVITY_ACTIVITY: &str = "inactivity_decay";

/// Trust points removed after `days_inactive` whole days without activity
pub fn inactivity_decay_points(days_inactive: i64) -> i32 {
    if days_inactive <= INACTIVITY_GRACE_DAYS {
        return 0;
    }
    let over = days_inactive - INACTIVITY_GRACE_DAYS;
    over.saturating_mul(INACTIVITY_POINTS_PER_DAY).min(MAX_INACTIVITY_DECAY) as i32
}

pub struct TrustEngine {
    store: Arc<dyn RewardsStore>,
}

impl TrustEngine {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self { store }
    }

    pub fn trust_level_for_score(score: i32) -> Tier {
        trust_level_for_score(score)
    }

    /// Clamped update plus history row. `Ok(None)` when the account is missing.
    pub async fn update_trust_score(
        &self,
        user_id: &str,
        delta: i32,
        reason: &str,
        activity_type: Option<&str>,
    ) -> RewardsResult<Option<TrustHistoryEntry>> {
        match self
            .store
            .adjust_trust_score(user_id, delta, reason, activity_type, Utc::now())
            .await
        {
            Ok(entry) => {
                info!(
                    user_id = %user_id,
                    previous = entry.previous_score,
                    new = entry.new_score,
                    reason = %reason,
                    "Trust score updated"
                );
                Ok(Some(entry))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to update trust score");
                Err(e.into())
            }
        }
    }

    pub async fn apply_inactivity_decay(&self, user_id: &str) -> RewardsResult<Option<TrustDecayEntry>> {
        self.apply_inactivity_decay_at(user_id, Utc::now()).await
    }

    /// Decay applied, if any. Accounts with no recorded activity are skipped.
    pub async fn apply_inactivity_decay_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> RewardsResult<Option<TrustDecayEntry>> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("Account {}", user_id)))?;
        let Some(last_activity) = account.last_activity_date else {
            return Ok(None);
        };

        let days_inactive = (now - last_activity).num_days();
        let points = inactivity_decay_points(days_inactive);
        if points == 0 {
            return Ok(None);
        }

        let reason = format!("Inactivity decay: {} days since last activity", days_inactive);
        self.decay(
            user_id,
            points,
            &reason,
            DecayReason::Inactivity,
            Some(INACTIVITY_ACTIVITY),
            json!({ "daysInactive": days_inactive }),
        )
        .await
    }

    /// Fixed spam penalty with an audit row
    pub async fn apply_spam_decay(
        &self,
        user_id: &str,
        reason: &str,
        activity_type: Option<&str>,
    ) -> RewardsResult<Option<TrustDecayEntry>> {
        self.decay(
            user_id,
            SPAM_DECAY_POINTS,
            &format!("Spam decay: {}", reason),
            DecayReason::Spam,
            activity_type,
            json!({ "reason": reason }),
        )
        .await
    }

    async fn decay(
        &self,
        user_id: &str,
        points: i32,
        reason: &str,
        decay_reason: DecayReason,
        activity_type: Option<&str>,
        metadata: serde_json::Value,
    ) -> RewardsResult<Option<TrustDecayEntry>> {
        let Some(history) = self
            .update_trust_score(user_id, -points, reason, activity_type)
            .await?
        else {
            return Err(RewardsError::NotFound(format!("Account {}", user_id)));
        };

        let entry = TrustDecayEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            previous_score: history.previous_score,
            new_score: history.new_score,
            decay_reason,
            decay_amount: points,
            activity_type: activity_type.map(str::to_string),
            metadata,
            created_at: history.created_at,
        };
        // The score change is already committed; a lost audit row is only logged
        if let Err(e) = self.store.append_decay_log(&entry).await {
            warn!(user_id = %user_id, error = %e, "Failed to write trust decay log");
        }

        info!(
            user_id = %user_id,
            reason = %decay_reason,
            points,
            new_score = entry.new_score,
            "Trust decay applied"
        );
        Ok(Some(entry))
    }

    pub async fn get_trust_history(&self, user_id: &str, limit: i64) -> RewardsResult<Vec<TrustHistoryEntry>> {
        Ok(self.store.list_trust_history(user_id, limit).await?)
    }

    pub async fn get_trust_decay_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> RewardsResult<Vec<TrustDecayEntry>> {
        Ok(self.store.list_decay_log(user_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::rewards::models::Account;
    use chrono::Duration;

    async fn engine_with(account: Account) -> TrustEngine {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(account).await;
        TrustEngine::new(store)
    }

    #[test]
    fn test_inactivity_points() {
        assert_eq!(inactivity_decay_points(0), 0);
        assert_eq!(inactivity_decay_points(7), 0);
        assert_eq!(inactivity_decay_points(8), 2);
        assert_eq!(inactivity_decay_points(10), 6);
        assert_eq!(inactivity_decay_points(12), 10);
        assert_eq!(inactivity_decay_points(400), 10);
    }

    #[tokio::test]
    async fn test_score_clamps_at_both_ends() {
        let engine = engine_with(Account::new("user_1")).await;

        let up = engine
            .update_trust_score("user_1", 1_000, "bonus", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(up.new_score, 100);

        let down = engine
            .update_trust_score("user_1", -1_000, "penalty", Some("spam"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(down.previous_score, 100);
        assert_eq!(down.new_score, 0);
    }

    #[tokio::test]
    async fn test_missing_account_fails_silently() {
        let store = Arc::new(MemoryStore::new());
        let engine = TrustEngine::new(store);
        assert!(engine.update_trust_score("ghost", 5, "x", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactivity_decay() {
        let now = Utc::now();
        let mut account = Account::new("user_1");
        account.last_activity_date = Some(now - Duration::days(10));
        let engine = engine_with(account).await;

        let entry = engine
            .apply_inactivity_decay_at("user_1", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.decay_amount, 6);
        assert_eq!(entry.new_score, 44);
        assert_eq!(entry.decay_reason, DecayReason::Inactivity);

        let history = engine.get_trust_history("user_1", 20).await.unwrap();
        assert_eq!(history[0].change_reason, "Inactivity decay: 10 days since last activity");
        assert_eq!(engine.get_trust_decay_history("user_1", 20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inactivity_decay_skips_recent_and_unknown_activity() {
        let now = Utc::now();
        let engine = engine_with(Account::new("fresh")).await;
        assert!(engine.apply_inactivity_decay_at("fresh", now).await.unwrap().is_none());

        let mut recent = Account::new("recent");
        recent.last_activity_date = Some(now - Duration::days(3));
        let engine = engine_with(recent).await;
        assert!(engine.apply_inactivity_decay_at("recent", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spam_decay() {
        let engine = engine_with(Account::new("user_1")).await;
        let entry = engine
            .apply_spam_decay("user_1", "duplicate posts", Some("post_content"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.previous_score, 50);
        assert_eq!(entry.new_score, 45);
        assert_eq!(entry.metadata["reason"], "duplicate posts");

        let err = engine.apply_spam_decay("ghost", "x", None).await.unwrap_err();
        assert!(matches!(err, RewardsError::NotFound(_)));
    }
}
