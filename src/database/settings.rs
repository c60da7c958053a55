//! System config and reward rule tables

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::collections::HashMap;
use tracing::debug;

use crate::database::pool::DatabasePool;
use crate::database::{ConfigRepository, RuleRepository, StoreResult};
use crate::rewards::models::RewardRule;

const RULE_COLUMNS: &str = "action_type, display_name, description, base_eloits, daily_limit, \
     weekly_limit, monthly_limit, minimum_trust_score, decay_enabled, decay_start, decay_rate, \
     min_multiplier, is_active";

fn rule_from_row(row: &PgRow) -> StoreResult<RewardRule> {
    Ok(RewardRule {
        action_type: row.try_get("action_type")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        base_eloits: row.try_get("base_eloits")?,
        daily_limit: row.try_get("daily_limit")?,
        weekly_limit: row.try_get("weekly_limit")?,
        monthly_limit: row.try_get("monthly_limit")?,
        minimum_trust_score: row.try_get("minimum_trust_score")?,
        decay_enabled: row.try_get("decay_enabled")?,
        decay_start: row.try_get("decay_start")?,
        decay_rate: row.try_get("decay_rate")?,
        min_multiplier: row.try_get("min_multiplier")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl ConfigRepository for DatabasePool {
    async fn load_config_overrides(&self) -> StoreResult<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM eloits.system_config")
            .fetch_all(self.pool())
            .await?;

        let mut overrides: HashMap<String, String> = HashMap::with_capacity(rows.len());
        for row in rows {
            overrides.insert(row.try_get("key")?, row.try_get("value")?);
        }
        Ok(overrides)
    }

    async fn upsert_config(&self, entries: &[(String, String)]) -> StoreResult<()> {
        let mut tx = self.pool().begin().await?;
        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO eloits.system_config (key, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(keys = entries.len(), "System config updated");
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for DatabasePool {
    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<RewardRule>> {
        let sql = format!(
            "SELECT {} FROM eloits.reward_rules WHERE ($1 = FALSE OR is_active) ORDER BY action_type",
            RULE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(active_only)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn find_rule(&self, action_type: &str) -> StoreResult<Option<RewardRule>> {
        let sql = format!(
            "SELECT {} FROM eloits.reward_rules WHERE action_type = $1",
            RULE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(action_type)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn upsert_rule(&self, rule: &RewardRule) -> StoreResult<RewardRule> {
        sqlx::query(
            r#"
            INSERT INTO eloits.reward_rules
            (action_type, display_name, description, base_eloits, daily_limit, weekly_limit,
             monthly_limit, minimum_trust_score, decay_enabled, decay_start, decay_rate,
             min_multiplier, is_active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (action_type) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                description = EXCLUDED.description,
                base_eloits = EXCLUDED.base_eloits,
                daily_limit = EXCLUDED.daily_limit,
                weekly_limit = EXCLUDED.weekly_limit,
                monthly_limit = EXCLUDED.monthly_limit,
                minimum_trust_score = EXCLUDED.minimum_trust_score,
                decay_enabled = EXCLUDED.decay_enabled,
                decay_start = EXCLUDED.decay_start,
                decay_rate = EXCLUDED.decay_rate,
                min_multiplier = EXCLUDED.min_multiplier,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(&rule.action_type)
        .bind(&rule.display_name)
        .bind(&rule.description)
        .bind(rule.base_eloits)
        .bind(rule.daily_limit)
        .bind(rule.weekly_limit)
        .bind(rule.monthly_limit)
        .bind(rule.minimum_trust_score)
        .bind(rule.decay_enabled)
        .bind(rule.decay_start)
        .bind(rule.decay_rate)
        .bind(rule.min_multiplier)
        .bind(rule.is_active)
        .execute(self.pool())
        .await?;

        debug!(action_type = %rule.action_type, "Reward rule upserted");
        Ok(rule.clone())
    }
}
