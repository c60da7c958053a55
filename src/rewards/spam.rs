//! Spam Guard
//!
//! Hourly rate check per action type. A positive result records a detection
//! and costs 2 trust points, but never blocks the award itself; callers decide.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::database::RewardsStore;
use crate::rewards::error::RewardsResult;
use crate::rewards::models::SpamDetection;
use crate::rewards::trust::TrustEngine;

pub const SPAM_TRUST_PENALTY: i32 = 2;
const DEFAULT_THRESHOLD: i64 = 10;

/// Maximum actions of a type allowed in the trailing hour
pub fn spam_threshold(action_type: &str) -> i64 {
    match action_type {
        "like_post" => 30,
        "comment_post" => 20,
        "share_content" => 10,
        "post_content" => 5,
        _ => DEFAULT_THRESHOLD,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpamCheck {
    pub is_spam: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SpamCheck {
    fn clean() -> Self {
        Self {
            is_spam: false,
            reason: None,
        }
    }
}

pub struct SpamGuard {
    store: Arc<dyn RewardsStore>,
    trust: TrustEngine,
}

impl SpamGuard {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self {
            trust: TrustEngine::new(store.clone()),
            store,
        }
    }

    pub async fn check_for_spam(&self, user_id: &str, action_type: &str) -> SpamCheck {
        self.check_for_spam_at(user_id, action_type, Utc::now()).await
    }

    /// Storage failures are logged and reported as a clean check
    pub async fn check_for_spam_at(
        &self,
        user_id: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> SpamCheck {
        match self.evaluate(user_id, action_type, now).await {
            Ok(check) => check,
            Err(e) => {
                error!(user_id = %user_id, action_type = %action_type, error = %e, "Spam check failed");
                SpamCheck::clean()
            }
        }
    }

    async fn evaluate(
        &self,
        user_id: &str,
        action_type: &str,
        now: DateTime<Utc>,
    ) -> RewardsResult<SpamCheck> {
        let count = self
            .store
            .count_transactions_since(user_id, action_type, now - Duration::hours(1))
            .await?;
        let threshold = spam_threshold(action_type);
        if count <= threshold {
            return Ok(SpamCheck::clean());
        }

        let reason = format!(
            "Excessive {} activity ({} in the last hour)",
            action_type, count
        );
        let detection = SpamDetection {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            action_type: action_type.to_string(),
            is_spam: true,
            spam_reason: reason.clone(),
            detected_by: "system".to_string(),
            created_at: now,
        };
        self.store.record_spam_detection(&detection).await?;

        self.trust
            .update_trust_score(
                user_id,
                -SPAM_TRUST_PENALTY,
                &format!("Spam detection: Excessive {} activity", action_type),
                Some(action_type),
            )
            .await?;

        warn!(user_id = %user_id, action_type = %action_type, count, threshold, "Spam activity detected");
        Ok(SpamCheck {
            is_spam: true,
            reason: Some(reason),
        })
    }

    pub async fn get_user_spam_records(&self, user_id: &str, limit: i64) -> RewardsResult<Vec<SpamDetection>> {
        Ok(self.store.list_spam_detections(user_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LedgerRepository, MemoryStore};
    use crate::rewards::models::{Account, LedgerEntry};
    use rust_decimal_macros::dec;

    async fn store_with_actions(action_type: &str, count: usize, at: DateTime<Utc>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(Account::new("user_1")).await;
        for _ in 0..count {
            let tx = LedgerEntry::new(action_type, dec!(1), "seed").into_transaction("user_1", dec!(1), dec!(1), at);
            store.insert_transaction(tx).await;
        }
        store
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(spam_threshold("like_post"), 30);
        assert_eq!(spam_threshold("comment_post"), 20);
        assert_eq!(spam_threshold("share_content"), 10);
        assert_eq!(spam_threshold("post_content"), 5);
        assert_eq!(spam_threshold("anything_else"), 10);
    }

    #[tokio::test]
    async fn test_at_threshold_is_clean() {
        let now = Utc::now();
        let store = store_with_actions("post_content", 5, now).await;
        let guard = SpamGuard::new(store.clone());
        assert!(!guard.check_for_spam_at("user_1", "post_content", now).await.is_spam);
        assert!(guard.get_user_spam_records("user_1", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_old_activity_is_outside_the_window() {
        let now = Utc::now();
        let store = store_with_actions("post_content", 20, now - Duration::hours(2)).await;
        let guard = SpamGuard::new(store);
        assert!(!guard.check_for_spam_at("user_1", "post_content", now).await.is_spam);
    }

    #[tokio::test]
    async fn test_excess_records_detection_and_penalty() {
        let now = Utc::now();
        let store = store_with_actions("post_content", 6, now).await;
        let guard = SpamGuard::new(store.clone());

        let check = guard.check_for_spam_at("user_1", "post_content", now).await;
        assert!(check.is_spam);
        assert_eq!(
            check.reason.as_deref(),
            Some("Excessive post_content activity (6 in the last hour)")
        );

        let records = guard.get_user_spam_records("user_1", 20).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detected_by, "system");
        assert_eq!(store.get_account("user_1").await.unwrap().unwrap().trust_score, 48);
    }
}
