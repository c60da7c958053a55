//! In-process store used by tests and when PostgreSQL is disabled
//!
//! All tables live behind one `RwLock`; every atomic unit runs under a single
//! write guard.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::{
    ConfigRepository, LedgerRepository, RedemptionRepository, ReferralRepository,
    RuleRepository, StoreError, StoreResult, TrustRepository, check_redemption_transition,
    stamp_redemption,
};
use crate::rewards::models::{
    Account, LedgerEntry, Redemption, RedemptionFilter, RedemptionUpdate, ReferralEdge,
    ReferralLink, ReferralStatus, RewardRule, RewardTransaction, SpamDetection, TrustDecayEntry,
    TrustHistoryEntry, activity_day,
};

type DailyKey = (String, String, NaiveDate);

#[derive(Default)]
struct MemoryState {
    config: HashMap<String, String>,
    rules: HashMap<String, RewardRule>,
    accounts: HashMap<String, Account>,
    transactions: Vec<RewardTransaction>,
    daily_counts: HashMap<DailyKey, i32>,
    trust_history: Vec<TrustHistoryEntry>,
    decay_log: Vec<TrustDecayEntry>,
    spam_detections: Vec<SpamDetection>,
    referral_links: HashMap<String, ReferralLink>,
    referrals: Vec<ReferralEdge>,
    redemptions: Vec<Redemption>,
}

impl MemoryState {
    fn account_mut(&mut self, user_id: &str) -> StoreResult<&mut Account> {
        self.accounts
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("Account {}", user_id)))
    }

    fn count_since(&self, user_id: &str, action_type: &str, since: DateTime<Utc>) -> i64 {
        self.transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.action_type == action_type)
            .filter(|tx| tx.created_at >= since)
            .count() as i64
    }

    fn credit(
        &mut self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        if entry.amount < Decimal::ZERO {
            return Err(StoreError::Invalid("credit amount cannot be negative".to_string()));
        }
        if entry
            .caps
            .iter()
            .any(|cap| self.count_since(user_id, &entry.action_type, cap.since) >= cap.limit)
        {
            return Err(StoreError::LimitReached);
        }
        let account = self.account_mut(user_id)?;
        account
            .apply_credit(entry.amount, now)
            .map_err(StoreError::Invalid)?;
        let account = account.clone();

        *self
            .daily_counts
            .entry((user_id.to_string(), entry.action_type.clone(), activity_day(now)))
            .or_insert(0) += 1;

        let amount = entry.amount;
        let tx = entry.into_transaction(user_id, amount, account.current_balance, now);
        self.transactions.push(tx.clone());
        Ok((account, tx))
    }

    fn debit(
        &mut self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        if entry.amount < Decimal::ZERO {
            return Err(StoreError::Invalid("debit amount cannot be negative".to_string()));
        }
        let account = self.account_mut(user_id)?;
        account
            .apply_debit(entry.amount, now)
            .map_err(|available| StoreError::InsufficientBalance {
                requested: entry.amount,
                available,
            })?;
        let account = account.clone();

        let amount = -entry.amount;
        let tx = entry.into_transaction(user_id, amount, account.current_balance, now);
        self.transactions.push(tx.clone());
        Ok((account, tx))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account as-is
    pub async fn seed_account(&self, account: Account) {
        let mut state = self.state.write().await;
        state.accounts.insert(account.user_id.clone(), account);
    }

    /// Append a transaction row without touching balances or counters
    pub async fn insert_transaction(&self, tx: RewardTransaction) {
        self.state.write().await.transactions.push(tx);
    }
}

fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool, offset: i64, limit: i64) -> Vec<T> {
    rows.iter()
        .rev()
        .filter(|row| keep(*row))
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn load_config_overrides(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.state.read().await.config.clone())
    }

    async fn upsert_config(&self, entries: &[(String, String)]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for (key, value) in entries {
            state.config.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<RewardRule>> {
        let state = self.state.read().await;
        let mut rules: Vec<RewardRule> = state
            .rules
            .values()
            .filter(|rule| !active_only || rule.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.action_type.cmp(&b.action_type));
        Ok(rules)
    }

    async fn find_rule(&self, action_type: &str) -> StoreResult<Option<RewardRule>> {
        Ok(self.state.read().await.rules.get(action_type).cloned())
    }

    async fn upsert_rule(&self, rule: &RewardRule) -> StoreResult<RewardRule> {
        let mut state = self.state.write().await;
        state.rules.insert(rule.action_type.clone(), rule.clone());
        Ok(rule.clone())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn get_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(user_id).cloned())
    }

    async fn insert_account_if_absent(&self, account: &Account) -> StoreResult<Account> {
        let mut state = self.state.write().await;
        let stored = state
            .accounts
            .entry(account.user_id.clone())
            .or_insert_with(|| account.clone());
        Ok(stored.clone())
    }

    async fn credit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        self.state.write().await.credit(user_id, entry, now)
    }

    async fn debit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        self.state.write().await.debit(user_id, entry, now)
    }

    async fn append_transaction(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RewardTransaction> {
        let mut state = self.state.write().await;
        let balance = state.account_mut(user_id)?.current_balance;
        let amount = entry.amount;
        let tx = entry.into_transaction(user_id, amount, balance, now);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn count_transactions_since(
        &self,
        user_id: &str,
        action_type: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        Ok(self.state.read().await.count_since(user_id, action_type, since))
    }

    async fn daily_action_count(
        &self,
        user_id: &str,
        action_type: &str,
        day: NaiveDate,
    ) -> StoreResult<i32> {
        let state = self.state.read().await;
        let key = (user_id.to_string(), action_type.to_string(), day);
        Ok(state.daily_counts.get(&key).copied().unwrap_or(0))
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RewardTransaction>> {
        let state = self.state.read().await;
        Ok(newest_first(
            &state.transactions,
            |tx| tx.user_id == user_id,
            offset,
            limit,
        ))
    }
}

#[async_trait]
impl TrustRepository for MemoryStore {
    async fn adjust_trust_score(
        &self,
        user_id: &str,
        delta: i32,
        reason: &str,
        activity_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<TrustHistoryEntry> {
        let mut state = self.state.write().await;
        let account = state.account_mut(user_id)?;
        let previous_score = account.apply_trust_delta(delta, now);
        let entry = TrustHistoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            previous_score,
            new_score: account.trust_score,
            change_reason: reason.to_string(),
            activity_type: activity_type.map(str::to_string),
            created_at: now,
        };
        state.trust_history.push(entry.clone());
        Ok(entry)
    }

    async fn append_decay_log(&self, entry: &TrustDecayEntry) -> StoreResult<()> {
        self.state.write().await.decay_log.push(entry.clone());
        Ok(())
    }

    async fn record_spam_detection(&self, detection: &SpamDetection) -> StoreResult<()> {
        self.state.write().await.spam_detections.push(detection.clone());
        Ok(())
    }

    async fn list_trust_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<TrustHistoryEntry>> {
        let state = self.state.read().await;
        Ok(newest_first(&state.trust_history, |e| e.user_id == user_id, 0, limit))
    }

    async fn list_decay_log(&self, user_id: &str, limit: i64) -> StoreResult<Vec<TrustDecayEntry>> {
        let state = self.state.read().await;
        Ok(newest_first(&state.decay_log, |e| e.user_id == user_id, 0, limit))
    }

    async fn list_spam_detections(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<SpamDetection>> {
        let state = self.state.read().await;
        Ok(newest_first(&state.spam_detections, |e| e.user_id == user_id, 0, limit))
    }
}

#[async_trait]
impl ReferralRepository for MemoryStore {
    async fn create_referral_link(&self, link: &ReferralLink) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.referral_links.contains_key(&link.referral_code) {
            return Err(StoreError::Conflict(format!(
                "referral code {} already exists",
                link.referral_code
            )));
        }
        state
            .referral_links
            .insert(link.referral_code.clone(), link.clone());
        Ok(())
    }

    async fn find_referral_link(&self, code: &str) -> StoreResult<Option<ReferralLink>> {
        Ok(self.state.read().await.referral_links.get(code).cloned())
    }

    async fn find_referral_for_referee(&self, referee_id: &str) -> StoreResult<Option<ReferralEdge>> {
        let state = self.state.read().await;
        Ok(state
            .referrals
            .iter()
            .find(|edge| edge.referee_id == referee_id)
            .cloned())
    }

    async fn insert_referral(&self, edge: &ReferralEdge) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.referrals.iter().any(|e| e.referee_id == edge.referee_id) {
            return Err(StoreError::Conflict(format!(
                "referee {} already referred",
                edge.referee_id
            )));
        }
        state.referrals.push(edge.clone());
        Ok(())
    }

    async fn complete_referral(
        &self,
        edge_id: Uuid,
        reward_earned: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<ReferralEdge> {
        let mut state = self.state.write().await;
        let edge = state
            .referrals
            .iter_mut()
            .find(|edge| edge.id == edge_id)
            .ok_or_else(|| StoreError::NotFound(format!("Referral {}", edge_id)))?;
        edge.status = ReferralStatus::Completed;
        edge.reward_earned = reward_earned;
        edge.verified_at = Some(now);
        let edge = edge.clone();

        let referrer = state.account_mut(&edge.referrer_id)?;
        referrer.referral_count += 1;
        referrer.updated_at = now;
        Ok(edge)
    }

    async fn list_referrals_by_referrer(&self, referrer_id: &str) -> StoreResult<Vec<ReferralEdge>> {
        let state = self.state.read().await;
        Ok(newest_first(
            &state.referrals,
            |edge| edge.referrer_id == referrer_id,
            0,
            i64::MAX,
        ))
    }
}

#[async_trait]
impl RedemptionRepository for MemoryStore {
    async fn create_redemption(
        &self,
        redemption: &Redemption,
        settlement: Option<LedgerEntry>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)> {
        let mut state = self.state.write().await;
        let mut stored = redemption.clone();
        let tx = match settlement {
            Some(entry) => {
                let (_, tx) = state.debit(&redemption.user_id, entry, redemption.created_at)?;
                stored.debited_at = Some(redemption.created_at);
                Some(tx)
            }
            None => None,
        };
        state.redemptions.push(stored.clone());
        Ok((stored, tx))
    }

    async fn get_redemption(&self, id: Uuid) -> StoreResult<Option<Redemption>> {
        let state = self.state.read().await;
        Ok(state.redemptions.iter().find(|r| r.id == id).cloned())
    }

    async fn list_redemptions(&self, filter: &RedemptionFilter) -> StoreResult<Vec<Redemption>> {
        let state = self.state.read().await;
        Ok(newest_first(
            &state.redemptions,
            |r| {
                filter.user_id.as_deref().is_none_or(|user| r.user_id == user)
                    && filter.status.is_none_or(|status| r.status == status)
            },
            0,
            i64::MAX,
        ))
    }

    async fn update_redemption_status(
        &self,
        update: &RedemptionUpdate,
        settlement: Option<LedgerEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)> {
        let mut state = self.state.write().await;
        let index = state
            .redemptions
            .iter()
            .position(|r| r.id == update.id)
            .ok_or_else(|| StoreError::NotFound(format!("Redemption {}", update.id)))?;
        let mut redemption = state.redemptions[index].clone();
        check_redemption_transition(&redemption, update)?;

        let tx = match settlement {
            Some(entry) if update.status.requires_debit() && redemption.debited_at.is_none() => {
                let (_, tx) = state.debit(&redemption.user_id, entry, now)?;
                redemption.debited_at = Some(now);
                Some(tx)
            }
            _ => None,
        };

        stamp_redemption(&mut redemption, update, now);
        state.redemptions[index] = redemption.clone();
        Ok((redemption, tx))
    }
}
