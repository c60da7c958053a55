//! Rule Engine
//!
//! Reward rules are rows, not code: they are read from the store on every
//! lookup so admins can add or retune actions without a redeploy.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::RewardsStore;
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{ActivityCap, RewardRule, activity_day};

/// Midnight UTC of the current day
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}

/// Midnight UTC of the most recent Sunday
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_sunday = now.weekday().num_days_from_sunday() as i64;
    start_of_day(now) - Duration::days(days_since_sunday)
}

/// Midnight UTC of the first day of the month
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN))
}

/// `rate ^ (count - start)` floored at the rule's minimum multiplier;
/// 1 while the count has not passed the decay start.
pub fn decay_factor_for_count(rule: &RewardRule, count: i32) -> Decimal {
    if !rule.decay_enabled || count <= rule.decay_start {
        return Decimal::ONE;
    }

    let mut factor = Decimal::ONE;
    for _ in 0..(count - rule.decay_start) {
        factor *= rule.decay_rate;
        if factor <= rule.min_multiplier {
            return rule.min_multiplier;
        }
    }
    factor.max(rule.min_multiplier)
}

/// Daily, weekly and monthly caps the rule sets, as of `now`
pub fn activity_caps(rule: &RewardRule, now: DateTime<Utc>) -> Vec<ActivityCap> {
    [
        (rule.daily_limit, start_of_day(now)),
        (rule.weekly_limit, start_of_week(now)),
        (rule.monthly_limit, start_of_month(now)),
    ]
    .into_iter()
    .filter_map(|(limit, since)| {
        limit.map(|limit| ActivityCap {
            since,
            limit: i64::from(limit),
        })
    })
    .collect()
}

pub struct RuleEngine {
    store: Arc<dyn RewardsStore>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self { store }
    }

    /// Active rule for the action; `None` means the action earns nothing
    pub async fn rule_for_action(&self, action_type: &str) -> RewardsResult<Option<RewardRule>> {
        let rule = self.store.find_rule(action_type).await.map_err(|e| {
            warn!(action_type = %action_type, error = %e, "Failed to load reward rule");
            RewardsError::from(e)
        })?;
        Ok(rule.filter(|rule| rule.is_active))
    }

    pub async fn list_rules(&self, active_only: bool) -> RewardsResult<Vec<RewardRule>> {
        Ok(self.store.list_rules(active_only).await?)
    }

    pub async fn upsert_rule(&self, rule: RewardRule) -> RewardsResult<RewardRule> {
        rule.validate().map_err(RewardsError::InvalidInput)?;
        let stored = self.store.upsert_rule(&rule).await?;
        debug!(action_type = %stored.action_type, active = stored.is_active, "Reward rule saved");
        Ok(stored)
    }

    /// False once any cap the rule sets is met for its window
    pub async fn can_complete(
        &self,
        user_id: &str,
        rule: &RewardRule,
        now: DateTime<Utc>,
    ) -> RewardsResult<bool> {
        for cap in activity_caps(rule, now) {
            let count = self
                .store
                .count_transactions_since(user_id, &rule.action_type, cap.since)
                .await?;
            if count >= cap.limit {
                debug!(
                    user_id = %user_id,
                    action_type = %rule.action_type,
                    count,
                    limit = cap.limit,
                    "Activity limit reached"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Decay multiplier from today's activity counter
    pub async fn decay_factor(
        &self,
        user_id: &str,
        rule: &RewardRule,
        now: DateTime<Utc>,
    ) -> RewardsResult<Decimal> {
        if !rule.decay_enabled {
            return Ok(Decimal::ONE);
        }
        let count = self
            .store
            .daily_action_count(user_id, &rule.action_type, activity_day(now))
            .await?;
        Ok(decay_factor_for_count(rule, count))
    }
}
