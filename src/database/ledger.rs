//! Ledger Repository - accounts, transactions and daily action counters
//!
//! Balance changes lock the account row with `SELECT ... FOR UPDATE` and
//! commit the account, the transaction row and the counter together.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::debug;

use crate::database::pool::{DatabasePool, parse_column};
use crate::database::{LedgerRepository, StoreError, StoreResult};
use crate::rewards::models::{Account, LedgerEntry, RewardTransaction, activity_day};

const ACCOUNT_COLUMNS: &str = "user_id, current_balance, total_earned, total_spent, trust_score, \
     trust_level, reward_multiplier, daily_cap, streak_days, tier, referral_count, \
     last_activity_date, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, action_type, amount, balance_after, description, \
     metadata, trust_score_impact, multiplier_applied, decay_factor, status, reference_id, created_at";

pub(crate) fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let trust_level: String = row.try_get("trust_level")?;
    let tier: String = row.try_get("tier")?;
    Ok(Account {
        user_id: row.try_get("user_id")?,
        current_balance: row.try_get("current_balance")?,
        total_earned: row.try_get("total_earned")?,
        total_spent: row.try_get("total_spent")?,
        trust_score: row.try_get("trust_score")?,
        trust_level: parse_column(&trust_level)?,
        reward_multiplier: row.try_get("reward_multiplier")?,
        daily_cap: row.try_get("daily_cap")?,
        streak_days: row.try_get("streak_days")?,
        tier: parse_column(&tier)?,
        referral_count: row.try_get("referral_count")?,
        last_activity_date: row.try_get("last_activity_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<RewardTransaction> {
    let status: String = row.try_get("status")?;
    Ok(RewardTransaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action_type: row.try_get("action_type")?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        description: row.try_get("description")?,
        metadata: row.try_get("metadata")?,
        trust_score_impact: row.try_get("trust_score_impact")?,
        multiplier_applied: row.try_get("multiplier_applied")?,
        decay_factor: row.try_get("decay_factor")?,
        status: parse_column(&status)?,
        reference_id: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Load the account and hold its row lock until the surrounding transaction ends
pub(crate) async fn lock_account(conn: &mut PgConnection, user_id: &str) -> StoreResult<Account> {
    let sql = format!(
        "SELECT {} FROM eloits.user_rewards WHERE user_id = $1 FOR UPDATE",
        ACCOUNT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Account {}", user_id)))?;
    account_from_row(&row)
}

async fn count_since(
    conn: &mut PgConnection,
    user_id: &str,
    action_type: &str,
    since: DateTime<Utc>,
) -> StoreResult<i64> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total FROM eloits.reward_transactions
        WHERE user_id = $1 AND action_type = $2 AND created_at >= $3
        "#,
    )
    .bind(user_id)
    .bind(action_type)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("total")?)
}

pub(crate) async fn save_account(conn: &mut PgConnection, account: &Account) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE eloits.user_rewards SET
            current_balance = $2,
            total_earned = $3,
            total_spent = $4,
            trust_score = $5,
            trust_level = $6,
            reward_multiplier = $7,
            daily_cap = $8,
            streak_days = $9,
            tier = $10,
            referral_count = $11,
            last_activity_date = $12,
            updated_at = $13
        WHERE user_id = $1
        "#,
    )
    .bind(&account.user_id)
    .bind(account.current_balance)
    .bind(account.total_earned)
    .bind(account.total_spent)
    .bind(account.trust_score)
    .bind(account.trust_level.as_str())
    .bind(account.reward_multiplier)
    .bind(account.daily_cap)
    .bind(account.streak_days)
    .bind(account.tier.as_str())
    .bind(account.referral_count)
    .bind(account.last_activity_date)
    .bind(account.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_transaction_row(conn: &mut PgConnection, tx: &RewardTransaction) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO eloits.reward_transactions
        (id, user_id, action_type, amount, balance_after, description, metadata,
         trust_score_impact, multiplier_applied, decay_factor, status, reference_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(tx.id)
    .bind(&tx.user_id)
    .bind(&tx.action_type)
    .bind(tx.amount)
    .bind(tx.balance_after)
    .bind(&tx.description)
    .bind(&tx.metadata)
    .bind(tx.trust_score_impact)
    .bind(tx.multiplier_applied)
    .bind(tx.decay_factor)
    .bind(tx.status.as_str())
    .bind(tx.reference_id)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Debit inside an open transaction; shared with redemption settlement
pub(crate) async fn debit_locked(
    conn: &mut PgConnection,
    user_id: &str,
    entry: LedgerEntry,
    now: DateTime<Utc>,
) -> StoreResult<(Account, RewardTransaction)> {
    if entry.amount < Decimal::ZERO {
        return Err(StoreError::Invalid("debit amount cannot be negative".to_string()));
    }
    let mut account = lock_account(&mut *conn, user_id).await?;
    account
        .apply_debit(entry.amount, now)
        .map_err(|available| StoreError::InsufficientBalance {
            requested: entry.amount,
            available,
        })?;
    save_account(&mut *conn, &account).await?;

    let amount = -entry.amount;
    let record = entry.into_transaction(user_id, amount, account.current_balance, now);
    insert_transaction_row(&mut *conn, &record).await?;
    Ok((account, record))
}

#[async_trait]
impl LedgerRepository for DatabasePool {
    async fn get_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM eloits.user_rewards WHERE user_id = $1",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account_if_absent(&self, account: &Account) -> StoreResult<Account> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO eloits.user_rewards
            (user_id, current_balance, total_earned, total_spent, trust_score, trust_level,
             reward_multiplier, daily_cap, streak_days, tier, referral_count,
             last_activity_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(&account.user_id)
        .bind(account.current_balance)
        .bind(account.total_earned)
        .bind(account.total_spent)
        .bind(account.trust_score)
        .bind(account.trust_level.as_str())
        .bind(account.reward_multiplier)
        .bind(account.daily_cap)
        .bind(account.streak_days)
        .bind(account.tier.as_str())
        .bind(account.referral_count)
        .bind(account.last_activity_date)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await?;

        let stored = lock_account(&mut tx, &account.user_id).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn credit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        if entry.amount < Decimal::ZERO {
            return Err(StoreError::Invalid("credit amount cannot be negative".to_string()));
        }

        let mut tx = self.pool().begin().await?;
        let mut account = lock_account(&mut tx, user_id).await?;
        // Caps are re-counted under the row lock so racing credits cannot both pass
        for cap in &entry.caps {
            if count_since(&mut tx, user_id, &entry.action_type, cap.since).await? >= cap.limit {
                return Err(StoreError::LimitReached);
            }
        }
        account
            .apply_credit(entry.amount, now)
            .map_err(StoreError::Invalid)?;
        save_account(&mut tx, &account).await?;

        sqlx::query(
            r#"
            INSERT INTO eloits.daily_action_counts (user_id, action_type, action_date, count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (user_id, action_type, action_date)
            DO UPDATE SET count = eloits.daily_action_counts.count + 1
            "#,
        )
        .bind(user_id)
        .bind(&entry.action_type)
        .bind(activity_day(now))
        .execute(&mut *tx)
        .await?;

        let amount = entry.amount;
        let record = entry.into_transaction(user_id, amount, account.current_balance, now);
        insert_transaction_row(&mut tx, &record).await?;
        tx.commit().await?;

        debug!(user_id = %user_id, amount = %amount, "Account credited");
        Ok((account, record))
    }

    async fn debit_account(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<(Account, RewardTransaction)> {
        let mut tx = self.pool().begin().await?;
        let result = debit_locked(&mut tx, user_id, entry, now).await?;
        tx.commit().await?;

        debug!(user_id = %user_id, amount = %result.1.amount, "Account debited");
        Ok(result)
    }

    async fn append_transaction(
        &self,
        user_id: &str,
        entry: LedgerEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<RewardTransaction> {
        let mut tx = self.pool().begin().await?;
        let account = lock_account(&mut tx, user_id).await?;
        let amount = entry.amount;
        let record = entry.into_transaction(user_id, amount, account.current_balance, now);
        insert_transaction_row(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn count_transactions_since(
        &self,
        user_id: &str,
        action_type: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let mut conn = self.pool().acquire().await?;
        count_since(&mut conn, user_id, action_type, since).await
    }

    async fn daily_action_count(
        &self,
        user_id: &str,
        action_type: &str,
        day: NaiveDate,
    ) -> StoreResult<i32> {
        let row = sqlx::query(
            r#"
            SELECT count FROM eloits.daily_action_counts
            WHERE user_id = $1 AND action_type = $2 AND action_date = $3
            "#,
        )
        .bind(user_id)
        .bind(action_type)
        .bind(day)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(row.try_get("count")?),
            None => Ok(0),
        }
    }

    async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<RewardTransaction>> {
        let sql = format!(
            "SELECT {} FROM eloits.reward_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}
