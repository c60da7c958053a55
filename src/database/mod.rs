//! Rewards Persistence
//!
//! Repository traits consumed by the rewards services, with a PostgreSQL
//! implementation on [`DatabasePool`] and an in-process [`MemoryStore`].
//!
//! Every balance or trust mutation is a single repository call so that the
//! account update and its audit row commit together.

pub mod ledger;
pub mod memory;
pub mod pool;
pub mod redemptions;
pub mod referrals;
pub mod settings;
pub mod trust;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::rewards::models::{
    Account, LedgerEntry, Redemption, RedemptionFilter, RedemptionUpdate, ReferralEdge,
    ReferralLink, RewardRule, RewardTransaction, SpamDetection, TrustDecayEntry,
    TrustHistoryEntry,
};

pub use memory::MemoryStore;
pub use pool::DatabasePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },

    #[error("Activity limit reached")]
    LimitReached,

    #[error("{0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted overrides of the system settings
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn load_config_overrides(&self) -> StoreResult<HashMap<String, String>>;

    async fn upsert_config(&self, entries: &[(String, String)]) -> StoreResult<()>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<RewardRule>>;

    /// Rule for the action regardless of its active flag
    async fn find_rule(&self, action_type: &str) -> StoreResult<Option<RewardRule>>;

    async fn upsert_rule(&self, rule: &RewardRule) -> StoreResult<RewardRule>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn get_account(&self, user_id: &str) -> StoreResult<Option<Account>>;

    /// Insert the account unless one exists; returns the stored row either way
    async fn insert_account_if_absent(&self, account: &Account) -> StoreResult<Account>;

    /// Atomic credit: balance, totals, tier, streak and activity date move
    /// together with the transaction append and the daily counter increment.
    async fn credit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)>;

    /// Atomic debit with a negative transaction. Fails with
    /// [`StoreError::InsufficientBalance`] without writing anything.
    async fn debit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)>;

    /// Append an audit-only row; the balance is not touched
    async fn append_transaction(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RewardTransaction>;

    async fn count_transactions_since(
        &self,
        user_id: &str,
        action_type: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;

    async fn daily_action_count(
        &self,
        user_id: &str,
        action_type: &str,
        day: NaiveDate,
    ) -> StoreResult<i32>;

    /// Newest first
    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RewardTransaction>>;
}

#[async_trait]
pub trait TrustRepository: Send + Sync {
    /// Clamped update of the trust score plus the history append. Fails with
    /// [`StoreError::NotFound`] when the account does not exist.
    async fn adjust_trust_score(
        &self,
        user_id: &str,
        delta: i32,
        reason: &str,
        activity_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<TrustHistoryEntry>;

    async fn append_decay_log(&self, entry: &TrustDecayEntry) -> StoreResult<()>;

    async fn record_spam_detection(&self, detection: &SpamDetection) -> StoreResult<()>;

    async fn list_trust_history(&self, user_id: &str, limit: i64)
    -> StoreResult<Vec<TrustHistoryEntry>>;

    async fn list_decay_log(&self, user_id: &str, limit: i64) -> StoreResult<Vec<TrustDecayEntry>>;

    async fn list_spam_detections(&self, user_id: &str, limit: i64)
    -> StoreResult<Vec<SpamDetection>>;
}

#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the code is taken
    async fn create_referral_link(&self, link: &ReferralLink) -> StoreResult<()>;

    async fn find_referral_link(&self, code: &str) -> StoreResult<Option<ReferralLink>>;

    async fn find_referral_for_referee(&self, referee_id: &str) -> StoreResult<Option<ReferralEdge>>;

    /// Fails with [`StoreError::Conflict`] when the referee already has an edge
    async fn insert_referral(&self, edge: &ReferralEdge) -> StoreResult<()>;

    /// Marks the edge completed and bumps the referrer's referral count
    async fn complete_referral(
        &self,
        edge_id: Uuid,
        reward_earned: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<ReferralEdge>;

    async fn list_referrals_by_referrer(&self, referrer_id: &str) -> StoreResult<Vec<ReferralEdge>>;
}

#[async_trait]
pub trait RedemptionRepository: Send + Sync {
    /// Insert the redemption. With a settlement entry the balance is debited
    /// in the same unit and `debited_at` is stamped.
    async fn create_redemption(
        &self,
        redemption: &Redemption,
        settlement: Option<LedgerEntry>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)>;

    async fn get_redemption(&self, id: Uuid) -> StoreResult<Option<Redemption>>;

    /// Newest first
    async fn list_redemptions(&self, filter: &RedemptionFilter) -> StoreResult<Vec<Redemption>>;

    /// Apply a status transition. The settlement entry is debited only when
    /// the target status requires it and the redemption was never debited.
    async fn update_redemption_status(
        &self,
        update: &RedemptionUpdate,
        settlement: Option<LedgerEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)>;
}

/// Everything the rewards engine needs from storage
pub trait RewardsStore:
    ConfigRepository
    + RuleRepository
    + LedgerRepository
    + TrustRepository
    + ReferralRepository
    + RedemptionRepository
{
}

impl<T> RewardsStore for T where
    T: ConfigRepository
        + RuleRepository
        + LedgerRepository
        + TrustRepository
        + ReferralRepository
        + RedemptionRepository
{
}

/// Shared transition rule for both stores
pub(crate) fn check_redemption_transition(
    current: &Redemption,
    update: &RedemptionUpdate,
) -> StoreResult<()> {
    if current.status.is_terminal() {
        return Err(StoreError::Invalid(format!(
            "Redemption {} is already {}",
            current.id, current.status
        )));
    }
    if update.status == crate::rewards::models::RedemptionStatus::Pending {
        return Err(StoreError::Invalid(
            "Redemption cannot be moved back to pending".to_string(),
        ));
    }
    Ok(())
}

/// Stamp approval, processing and rejection fields for a transition
pub(crate) fn stamp_redemption(
    redemption: &mut Redemption,
    update: &RedemptionUpdate,
    now: DateTime<Utc>,
) {
    use crate::rewards::models::RedemptionStatus;

    redemption.status = update.status;
    match update.status {
        RedemptionStatus::Approved => {
            redemption.approved_by = update.approved_by.clone();
            redemption.approved_at = Some(now);
        }
        RedemptionStatus::Processed => {
            if redemption.approved_at.is_none() {
                redemption.approved_by = update.approved_by.clone();
                redemption.approved_at = Some(now);
            }
            redemption.processed_at = Some(now);
        }
        RedemptionStatus::Rejected => {
            redemption.rejection_reason = update.rejection_reason.clone();
        }
        RedemptionStatus::Pending | RedemptionStatus::Processing => {}
    }
    redemption.updated_at = now;
}
