//! Trust history, decay log and spam detection tables

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::debug;
use uuid::Uuid;

use crate::database::ledger::{lock_account, save_account};
use crate::database::pool::{DatabasePool, parse_column};
use crate::database::{StoreResult, TrustRepository};
use crate::rewards::models::{SpamDetection, TrustDecayEntry, TrustHistoryEntry};

fn history_from_row(row: &PgRow) -> StoreResult<TrustHistoryEntry> {
    Ok(TrustHistoryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        previous_score: row.try_get("previous_score")?,
        new_score: row.try_get("new_score")?,
        change_reason: row.try_get("change_reason")?,
        activity_type: row.try_get("activity_type")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decay_from_row(row: &PgRow) -> StoreResult<TrustDecayEntry> {
    let reason: String = row.try_get("decay_reason")?;
    Ok(TrustDecayEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        previous_score: row.try_get("previous_score")?,
        new_score: row.try_get("new_score")?,
        decay_reason: parse_column(&reason)?,
        decay_amount: row.try_get("decay_amount")?,
        activity_type: row.try_get("activity_type")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn spam_from_row(row: &PgRow) -> StoreResult<SpamDetection> {
    Ok(SpamDetection {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action_type: row.try_get("action_type")?,
        is_spam: row.try_get("is_spam")?,
        spam_reason: row.try_get("spam_reason")?,
        detected_by: row.try_get("detected_by")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl TrustRepository for DatabasePool {
    async fn adjust_trust_score(
        &self,
        user_id: &str,
        delta: i32,
        reason: &str,
        activity_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<TrustHistoryEntry> {
        let mut tx = self.pool().begin().await?;
        let mut account = lock_account(&mut tx, user_id).await?;
        let previous_score = account.apply_trust_delta(delta, now);
        save_account(&mut tx, &account).await?;

        let entry = TrustHistoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            previous_score,
            new_score: account.trust_score,
            change_reason: reason.to_string(),
            activity_type: activity_type.map(str::to_string),
            created_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO eloits.trust_history
            (id, user_id, previous_score, new_score, change_reason, activity_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(entry.previous_score)
        .bind(entry.new_score)
        .bind(&entry.change_reason)
        .bind(&entry.activity_type)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(user_id = %user_id, previous = previous_score, new = entry.new_score, "Trust score adjusted");
        Ok(entry)
    }

    async fn append_decay_log(&self, entry: &TrustDecayEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eloits.trust_decay_log
            (id, user_id, previous_score, new_score, decay_reason, decay_amount,
             activity_type, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(entry.previous_score)
        .bind(entry.new_score)
        .bind(entry.decay_reason.as_str())
        .bind(entry.decay_amount)
        .bind(&entry.activity_type)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn record_spam_detection(&self, detection: &SpamDetection) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eloits.spam_detection
            (id, user_id, action_type, is_spam, spam_reason, detected_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(detection.id)
        .bind(&detection.user_id)
        .bind(&detection.action_type)
        .bind(detection.is_spam)
        .bind(&detection.spam_reason)
        .bind(&detection.detected_by)
        .bind(detection.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_trust_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<TrustHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, previous_score, new_score, change_reason, activity_type, created_at
            FROM eloits.trust_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn list_decay_log(&self, user_id: &str, limit: i64) -> StoreResult<Vec<TrustDecayEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, previous_score, new_score, decay_reason, decay_amount,
                   activity_type, metadata, created_at
            FROM eloits.trust_decay_log
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(decay_from_row).collect()
    }

    async fn list_spam_detections(
        &self,
        user_id: &str,
        limit: i64,
    ) -> StoreResult<Vec<SpamDetection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, action_type, is_spam, spam_reason, detected_by, created_at
            FROM eloits.spam_detection
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(spam_from_row).collect()
    }
}
