//! Redemption requests and their settlement

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::info;
use uuid::Uuid;

use crate::database::ledger::debit_locked;
use crate::database::pool::{DatabasePool, parse_column};
use crate::database::{
    RedemptionRepository, StoreError, StoreResult, check_redemption_transition, stamp_redemption,
};
use crate::rewards::models::{
    LedgerEntry, Redemption, RedemptionFilter, RedemptionUpdate, RewardTransaction,
};

const REDEMPTION_COLUMNS: &str = "id, user_id, amount, currency, payout_method, payout_details, \
     status, approved_by, approved_at, processed_at, rejection_reason, debited_at, created_at, updated_at";

fn redemption_from_row(row: &PgRow) -> StoreResult<Redemption> {
    let status: String = row.try_get("status")?;
    Ok(Redemption {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        payout_method: row.try_get("payout_method")?,
        payout_details: row.try_get("payout_details")?,
        status: parse_column(&status)?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        processed_at: row.try_get("processed_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        debited_at: row.try_get("debited_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn write_redemption(conn: &mut PgConnection, redemption: &Redemption) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO eloits.redemptions
        (id, user_id, amount, currency, payout_method, payout_details, status, approved_by,
         approved_at, processed_at, rejection_reason, debited_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            approved_by = EXCLUDED.approved_by,
            approved_at = EXCLUDED.approved_at,
            processed_at = EXCLUDED.processed_at,
            rejection_reason = EXCLUDED.rejection_reason,
            debited_at = EXCLUDED.debited_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(redemption.id)
    .bind(&redemption.user_id)
    .bind(redemption.amount)
    .bind(&redemption.currency)
    .bind(&redemption.payout_method)
    .bind(&redemption.payout_details)
    .bind(redemption.status.as_str())
    .bind(&redemption.approved_by)
    .bind(redemption.approved_at)
    .bind(redemption.processed_at)
    .bind(&redemption.rejection_reason)
    .bind(redemption.debited_at)
    .bind(redemption.created_at)
    .bind(redemption.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl RedemptionRepository for DatabasePool {
    async fn create_redemption(
        &self,
        redemption: &Redemption,
        settlement: Option<LedgerEntry>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)> {
        let mut tx = self.pool().begin().await?;
        let mut stored = redemption.clone();

        let record = match settlement {
            Some(entry) => {
                let (_, record) =
                    debit_locked(&mut tx, &redemption.user_id, entry, redemption.created_at).await?;
                stored.debited_at = Some(redemption.created_at);
                Some(record)
            }
            None => None,
        };

        write_redemption(&mut tx, &stored).await?;
        tx.commit().await?;

        info!(
            redemption_id = %stored.id,
            user_id = %stored.user_id,
            status = %stored.status,
            "Redemption stored"
        );
        Ok((stored, record))
    }

    async fn get_redemption(&self, id: Uuid) -> StoreResult<Option<Redemption>> {
        let sql = format!("SELECT {} FROM eloits.redemptions WHERE id = $1", REDEMPTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(redemption_from_row).transpose()
    }

    async fn list_redemptions(&self, filter: &RedemptionFilter) -> StoreResult<Vec<Redemption>> {
        let sql = format!(
            "SELECT {} FROM eloits.redemptions \
             WHERE ($1::TEXT IS NULL OR user_id = $1) AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC",
            REDEMPTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.user_id.as_deref())
            .bind(filter.status.map(|status| status.as_str()))
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(redemption_from_row).collect()
    }

    async fn update_redemption_status(
        &self,
        update: &RedemptionUpdate,
        settlement: Option<LedgerEntry>,
        now: DateTime<Utc>,
    ) -> StoreResult<(Redemption, Option<RewardTransaction>)> {
        let mut tx = self.pool().begin().await?;
        let sql = format!(
            "SELECT {} FROM eloits.redemptions WHERE id = $1 FOR UPDATE",
            REDEMPTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(update.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Redemption {}", update.id)))?;
        let mut redemption = redemption_from_row(&row)?;
        check_redemption_transition(&redemption, update)?;

        let record = match settlement {
            Some(entry) if update.status.requires_debit() && redemption.debited_at.is_none() => {
                let (_, record) = debit_locked(&mut tx, &redemption.user_id, entry, now).await?;
                redemption.debited_at = Some(now);
                Some(record)
            }
            _ => None,
        };

        stamp_redemption(&mut redemption, update, now);
        write_redemption(&mut tx, &redemption).await?;
        tx.commit().await?;

        info!(
            redemption_id = %redemption.id,
            status = %redemption.status,
            settled = record.is_some(),
            "Redemption status updated"
        );
        Ok((redemption, record))
    }
}
