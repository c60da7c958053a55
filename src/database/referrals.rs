//! Referral links and referral edges

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::database::pool::{DatabasePool, conflict_on_unique, parse_column};
use crate::database::{ReferralRepository, StoreError, StoreResult};
use crate::rewards::models::{ReferralEdge, ReferralLink, ReferralStatus};

const EDGE_COLUMNS: &str =
    "id, referrer_id, referee_id, referral_code, status, depth, reward_earned, created_at, verified_at";

fn edge_from_row(row: &PgRow) -> StoreResult<ReferralEdge> {
    let status: String = row.try_get("status")?;
    Ok(ReferralEdge {
        id: row.try_get("id")?,
        referrer_id: row.try_get("referrer_id")?,
        referee_id: row.try_get("referee_id")?,
        referral_code: row.try_get("referral_code")?,
        status: parse_column(&status)?,
        depth: row.try_get("depth")?,
        reward_earned: row.try_get("reward_earned")?,
        created_at: row.try_get("created_at")?,
        verified_at: row.try_get("verified_at")?,
    })
}

#[async_trait]
impl ReferralRepository for DatabasePool {
    async fn create_referral_link(&self, link: &ReferralLink) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO eloits.referral_links (referral_code, user_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(&link.referral_code)
        .bind(&link.user_id)
        .bind(link.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, format!("referral code {} already exists", link.referral_code)))?;
        Ok(())
    }

    async fn find_referral_link(&self, code: &str) -> StoreResult<Option<ReferralLink>> {
        let row = sqlx::query(
            "SELECT referral_code, user_id, created_at FROM eloits.referral_links WHERE referral_code = $1",
        )
        .bind(code)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(ReferralLink {
                referral_code: row.try_get("referral_code")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn find_referral_for_referee(&self, referee_id: &str) -> StoreResult<Option<ReferralEdge>> {
        let sql = format!("SELECT {} FROM eloits.referrals WHERE referee_id = $1", EDGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(referee_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(edge_from_row).transpose()
    }

    async fn insert_referral(&self, edge: &ReferralEdge) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eloits.referrals
            (id, referrer_id, referee_id, referral_code, status, depth, reward_earned, created_at, verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(edge.id)
        .bind(&edge.referrer_id)
        .bind(&edge.referee_id)
        .bind(&edge.referral_code)
        .bind(edge.status.as_str())
        .bind(edge.depth)
        .bind(edge.reward_earned)
        .bind(edge.created_at)
        .bind(edge.verified_at)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, format!("referee {} already referred", edge.referee_id)))?;
        Ok(())
    }

    async fn complete_referral(
        &self,
        edge_id: Uuid,
        reward_earned: Decimal,
        now: DateTime<Utc>,
    ) -> StoreResult<ReferralEdge> {
        let mut tx = self.pool().begin().await?;
        let sql = format!(
            "UPDATE eloits.referrals SET status = $2, reward_earned = $3, verified_at = $4 \
             WHERE id = $1 RETURNING {}",
            EDGE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(edge_id)
            .bind(ReferralStatus::Completed.as_str())
            .bind(reward_earned)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Referral {}", edge_id)))?;
        let edge = edge_from_row(&row)?;

        let updated = sqlx::query(
            r#"
            UPDATE eloits.user_rewards
            SET referral_count = referral_count + 1, updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(&edge.referrer_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Account {}", edge.referrer_id)));
        }

        tx.commit().await?;
        Ok(edge)
    }

    async fn list_referrals_by_referrer(&self, referrer_id: &str) -> StoreResult<Vec<ReferralEdge>> {
        let sql = format!(
            "SELECT {} FROM eloits.referrals WHERE referrer_id = $1 ORDER BY created_at DESC",
            EDGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(referrer_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(edge_from_row).collect()
    }
}
