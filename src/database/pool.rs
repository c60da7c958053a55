//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::database::{StoreError, StoreResult};

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS eloits",
    r#"
    CREATE TABLE IF NOT EXISTS eloits.system_config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.reward_rules (
        action_type TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        description TEXT NOT NULL,
        base_eloits NUMERIC NOT NULL,
        daily_limit INTEGER,
        weekly_limit INTEGER,
        monthly_limit INTEGER,
        minimum_trust_score INTEGER NOT NULL DEFAULT 0,
        decay_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        decay_start INTEGER NOT NULL DEFAULT 0,
        decay_rate NUMERIC NOT NULL DEFAULT 1,
        min_multiplier NUMERIC NOT NULL DEFAULT 1,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.user_rewards (
        user_id TEXT PRIMARY KEY,
        current_balance NUMERIC NOT NULL DEFAULT 0 CHECK (current_balance >= 0),
        total_earned NUMERIC NOT NULL DEFAULT 0,
        total_spent NUMERIC NOT NULL DEFAULT 0,
        trust_score INTEGER NOT NULL DEFAULT 50 CHECK (trust_score BETWEEN 0 AND 100),
        trust_level TEXT NOT NULL,
        reward_multiplier NUMERIC NOT NULL DEFAULT 1,
        daily_cap NUMERIC NOT NULL DEFAULT 1000,
        streak_days INTEGER NOT NULL DEFAULT 0,
        tier TEXT NOT NULL DEFAULT 'bronze',
        referral_count INTEGER NOT NULL DEFAULT 0,
        last_activity_date TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.reward_transactions (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        balance_after NUMERIC NOT NULL,
        description TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        trust_score_impact NUMERIC NOT NULL DEFAULT 0,
        multiplier_applied NUMERIC NOT NULL DEFAULT 1,
        decay_factor NUMERIC NOT NULL DEFAULT 1,
        status TEXT NOT NULL,
        reference_id UUID,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_reward_transactions_window
        ON eloits.reward_transactions (user_id, action_type, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.daily_action_counts (
        user_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        action_date DATE NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, action_type, action_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.trust_history (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        previous_score INTEGER NOT NULL,
        new_score INTEGER NOT NULL,
        change_reason TEXT NOT NULL,
        activity_type TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.trust_decay_log (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        previous_score INTEGER NOT NULL,
        new_score INTEGER NOT NULL,
        decay_reason TEXT NOT NULL,
        decay_amount INTEGER NOT NULL,
        activity_type TEXT,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.spam_detection (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        action_type TEXT NOT NULL,
        is_spam BOOLEAN NOT NULL,
        spam_reason TEXT NOT NULL,
        detected_by TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.referral_links (
        referral_code TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.referrals (
        id UUID PRIMARY KEY,
        referrer_id TEXT NOT NULL,
        referee_id TEXT NOT NULL UNIQUE,
        referral_code TEXT NOT NULL,
        status TEXT NOT NULL,
        depth INTEGER NOT NULL,
        reward_earned NUMERIC NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        verified_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS eloits.redemptions (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        amount NUMERIC NOT NULL CHECK (amount > 0),
        currency TEXT NOT NULL,
        payout_method TEXT NOT NULL,
        payout_details JSONB NOT NULL DEFAULT '{}'::jsonb,
        status TEXT NOT NULL,
        approved_by TEXT,
        approved_at TIMESTAMPTZ,
        processed_at TIMESTAMPTZ,
        rejection_reason TEXT,
        debited_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(connection_string: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> StoreResult<()> {
        info!("Initializing database schema...");

        for statement in SCHEMA_STATEMENTS {
            sqlx::query(*statement).execute(&self.pool).await?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Decode a text column into one of the string-backed enums
pub(crate) fn parse_column<T>(value: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(StoreError::Invalid)
}

/// Map unique violations to [`StoreError::Conflict`]
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    let unique = err
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());
    if unique {
        StoreError::Conflict(what.into())
    } else {
        StoreError::Query(err)
    }
}
