//! Ledger, rule, referral and redemption records

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::rewards::tier::{Tier, TierCatalog, trust_level_for_score};

pub const DEFAULT_TRUST_SCORE: i32 = 50;
pub const MIN_TRUST_SCORE: i32 = 0;
pub const MAX_TRUST_SCORE: i32 = 100;
/// Largest base award an admin may configure for a rule
pub const MAX_BASE_ELOITS: Decimal = dec!(1000000000);

/// Per-user rewards account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub current_balance: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub trust_score: i32,
    pub trust_level: Tier,
    /// Personal bonus factor, independent of the tier multiplier
    pub reward_multiplier: Decimal,
    pub daily_cap: Decimal,
    pub streak_days: i32,
    pub tier: Tier,
    pub referral_count: i32,
    pub last_activity_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            current_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            trust_score: DEFAULT_TRUST_SCORE,
            trust_level: trust_level_for_score(DEFAULT_TRUST_SCORE),
            reward_multiplier: dec!(1.0),
            daily_cap: dec!(1000),
            streak_days: 0,
            tier: Tier::Bronze,
            referral_count: 0,
            last_activity_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Credit an award: balance and lifetime earnings grow, tier and streak
    /// are re-derived
    pub fn apply_credit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), String> {
        let (Some(balance), Some(earned)) = (
            self.current_balance.checked_add(amount),
            self.total_earned.checked_add(amount),
        ) else {
            return Err("credit would overflow the account balance".to_string());
        };
        self.current_balance = balance;
        self.total_earned = earned;
        self.tier = TierCatalog::tier_for_points(self.total_earned);
        self.streak_days = next_streak(self.streak_days, self.last_activity_date, now);
        self.last_activity_date = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Debit a spend. Fails without touching the account when the balance is short.
    pub fn apply_debit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), Decimal> {
        if amount > self.current_balance {
            return Err(self.current_balance);
        }
        self.current_balance -= amount;
        self.total_spent += amount;
        self.updated_at = now;
        Ok(())
    }

    /// Shift the trust score by `delta`, clamped to 0..=100. Returns the previous score.
    pub fn apply_trust_delta(&mut self, delta: i32, now: DateTime<Utc>) -> i32 {
        let previous = self.trust_score;
        self.trust_score = clamp_trust_score(previous.saturating_add(delta));
        self.trust_level = trust_level_for_score(self.trust_score);
        self.updated_at = now;
        previous
    }
}

pub fn clamp_trust_score(score: i32) -> i32 {
    score.clamp(MIN_TRUST_SCORE, MAX_TRUST_SCORE)
}

fn next_streak(current: i32, last_activity: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
    let today = now.date_naive();
    match last_activity.map(|at| at.date_naive()) {
        Some(day) if day == today => current.max(1),
        Some(day) if day + Duration::days(1) == today => current + 1,
        _ => 1,
    }
}

/// Reward rule for one action type, managed by admins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRule {
    pub action_type: String,
    pub display_name: String,
    pub description: String,
    pub base_eloits: Decimal,
    pub daily_limit: Option<i32>,
    pub weekly_limit: Option<i32>,
    pub monthly_limit: Option<i32>,
    pub minimum_trust_score: i32,
    pub decay_enabled: bool,
    /// Occurrences per day before decay kicks in
    pub decay_start: i32,
    pub decay_rate: Decimal,
    /// Floor for the decay factor
    pub min_multiplier: Decimal,
    pub is_active: bool,
}

impl RewardRule {
    pub fn new(action_type: impl Into<String>, base_eloits: Decimal) -> Self {
        let action_type = action_type.into();
        Self {
            display_name: action_type.clone(),
            description: format!("Reward for {}", action_type),
            action_type,
            base_eloits,
            daily_limit: None,
            weekly_limit: None,
            monthly_limit: None,
            minimum_trust_score: 0,
            decay_enabled: false,
            decay_start: 0,
            decay_rate: dec!(1),
            min_multiplier: dec!(1),
            is_active: true,
        }
    }

    pub fn with_limits(
        mut self,
        daily: Option<i32>,
        weekly: Option<i32>,
        monthly: Option<i32>,
    ) -> Self {
        self.daily_limit = daily;
        self.weekly_limit = weekly;
        self.monthly_limit = monthly;
        self
    }

    pub fn with_minimum_trust(mut self, score: i32) -> Self {
        self.minimum_trust_score = score;
        self
    }

    pub fn with_decay(mut self, start: i32, rate: Decimal, floor: Decimal) -> Self {
        self.decay_enabled = true;
        self.decay_start = start;
        self.decay_rate = rate;
        self.min_multiplier = floor;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.action_type.trim().is_empty() {
            return Err("action_type cannot be empty".to_string());
        }
        if self.base_eloits < Decimal::ZERO {
            return Err("base_eloits cannot be negative".to_string());
        }
        if self.base_eloits > MAX_BASE_ELOITS {
            return Err(format!("base_eloits cannot exceed {}", MAX_BASE_ELOITS));
        }
        for limit in [self.daily_limit, self.weekly_limit, self.monthly_limit]
            .into_iter()
            .flatten()
        {
            if limit < 0 {
                return Err("limits cannot be negative".to_string());
            }
        }
        if self.decay_enabled {
            if self.decay_rate <= Decimal::ZERO || self.decay_rate > Decimal::ONE {
                return Err("decay_rate must be in (0, 1]".to_string());
            }
            if self.min_multiplier < Decimal::ZERO {
                return Err("min_multiplier cannot be negative".to_string());
            }
        }
        Ok(())
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

string_enum!(TransactionStatus {
    Completed => "completed",
    Pending => "pending",
    Failed => "failed",
});

string_enum!(RedemptionStatus {
    Pending => "pending",
    Processing => "processing",
    Approved => "approved",
    Processed => "processed",
    Rejected => "rejected",
});

string_enum!(ReferralStatus {
    Pending => "pending",
    Completed => "completed",
});

string_enum!(DecayReason {
    Inactivity => "inactivity",
    Spam => "spam",
});

impl RedemptionStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, RedemptionStatus::Processed | RedemptionStatus::Rejected)
    }

    /// States whose payout requires the balance to have been debited
    pub fn requires_debit(&self) -> bool {
        matches!(self, RedemptionStatus::Approved | RedemptionStatus::Processed)
    }
}

/// Immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTransaction {
    pub id: Uuid,
    pub user_id: String,
    pub action_type: String,
    /// Negative for spends and redemptions
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub metadata: serde_json::Value,
    pub trust_score_impact: Decimal,
    pub multiplier_applied: Decimal,
    pub decay_factor: Decimal,
    pub status: TransactionStatus,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Frequency cap re-checked by the store while the account is locked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityCap {
    pub since: DateTime<Utc>,
    pub limit: i64,
}

/// What a caller asks the ledger to record. The store assigns id, sign,
/// resulting balance and timestamp inside the atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub action_type: String,
    /// Always non-negative; debits are negated by the store
    pub amount: Decimal,
    pub description: String,
    pub metadata: serde_json::Value,
    pub trust_score_impact: Decimal,
    pub multiplier_applied: Decimal,
    pub decay_factor: Decimal,
    pub reference_id: Option<Uuid>,
    /// Rows of this action type already recorded in each window must stay below its limit
    pub caps: Vec<ActivityCap>,
}

impl LedgerEntry {
    pub fn new(action_type: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            amount,
            description: description.into(),
            metadata: serde_json::Value::Object(Default::default()),
            trust_score_impact: Decimal::ZERO,
            multiplier_applied: Decimal::ONE,
            decay_factor: Decimal::ONE,
            reference_id: None,
            caps: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_caps(mut self, caps: Vec<ActivityCap>) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    /// Materialize the record once the store knows the signed amount and balance
    pub fn into_transaction(
        self,
        user_id: &str,
        signed_amount: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> RewardTransaction {
        RewardTransaction {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            action_type: self.action_type,
            amount: signed_amount,
            balance_after,
            description: self.description,
            metadata: self.metadata,
            trust_score_impact: self.trust_score_impact,
            multiplier_applied: self.multiplier_applied,
            decay_factor: self.decay_factor,
            status: TransactionStatus::Completed,
            reference_id: self.reference_id,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustHistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub previous_score: i32,
    pub new_score: i32,
    pub change_reason: String,
    pub activity_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit row for inactivity and spam decay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustDecayEntry {
    pub id: Uuid,
    pub user_id: String,
    pub previous_score: i32,
    pub new_score: i32,
    pub decay_reason: DecayReason,
    pub decay_amount: i32,
    pub activity_type: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamDetection {
    pub id: Uuid,
    pub user_id: String,
    pub action_type: String,
    pub is_spam: bool,
    pub spam_reason: String,
    pub detected_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: Uuid,
    pub user_id: String,
    /// ELO points requested
    pub amount: Decimal,
    pub currency: String,
    pub payout_method: String,
    pub payout_details: serde_json::Value,
    pub status: RedemptionStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Set once the balance has been debited for this redemption
    pub debited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status change requested by an admin
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionUpdate {
    pub id: Uuid,
    pub status: RedemptionStatus,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedemptionFilter {
    pub user_id: Option<String>,
    pub status: Option<RedemptionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referral_code: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Referral relationship; a referee appears in at most one edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub id: Uuid,
    pub referrer_id: String,
    pub referee_id: String,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub depth: i32,
    pub reward_earned: Decimal,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// UTC calendar day used for the per-action activity counters
pub fn activity_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}
