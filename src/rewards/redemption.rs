//! Redemption Processor
//!
//! Converts ELO points to a currency payout request. In automated payout mode
//! the balance is debited when the request is created; in manual mode the
//! debit happens when an admin approves or processes it. Both paths write the
//! same negative `redemption` ledger row, and a redemption is debited once.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::RewardsStore;
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::models::{
    LedgerEntry, Redemption, RedemptionFilter, RedemptionStatus, RedemptionUpdate,
};
use crate::rewards::processor::round_points;
use crate::rewards::settings::{ConfigStore, PayoutMode, SystemConfig};
use crate::rewards::tier::TierCatalog;

pub const REDEMPTION_ACTION: &str = "redemption";
pub const PAYOUT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionRequest {
    pub amount: Decimal,
    pub payout_method: String,
    #[serde(default)]
    pub payout_details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub redemption_id: Uuid,
    pub status: RedemptionStatus,
    pub cash_value: Decimal,
    pub message: String,
}

/// Largest amount a single redemption may request at a tier
pub fn tier_redemption_ceiling(config: &SystemConfig, monthly_limit: Decimal) -> Decimal {
    monthly_limit.min(config.max_monthly_redemption_per_tier() / config.conversion_rate())
}

pub struct RedemptionProcessor {
    store: Arc<dyn RewardsStore>,
    config: ConfigStore,
}

impl RedemptionProcessor {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self {
            config: ConfigStore::new(store.clone()),
            store,
        }
    }

    /// Points to currency at the current conversion rate, read fresh each call
    pub async fn calculate_cash_value(&self, points: Decimal) -> Decimal {
        let config = self.config.get_system_config().await;
        points / config.conversion_rate()
    }

    pub async fn request_redemption(
        &self,
        user_id: &str,
        request: RedemptionRequest,
    ) -> RewardsResult<RedemptionReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(RewardsError::InvalidInput(
                "redemption amount must be positive".to_string(),
            ));
        }
        if request.payout_method.trim().is_empty() {
            return Err(RewardsError::InvalidInput("payout_method is required".to_string()));
        }

        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("Account {}", user_id)))?;
        let config = self.config.get_system_config().await;

        let minimum = config.minimum_redeemable_balance();
        if account.current_balance < minimum {
            return Err(RewardsError::BelowMinimumRedeemable { minimum });
        }
        if request.amount > account.current_balance {
            return Err(RewardsError::InsufficientBalance {
                requested: request.amount,
                available: account.current_balance,
            });
        }

        // Single-request ceiling; earlier redemptions this month are not summed
        let ceiling = tier_redemption_ceiling(
            &config,
            TierCatalog::config(account.tier).monthly_withdrawal_limit,
        );
        if request.amount > ceiling {
            return Err(RewardsError::ExceedsTierCap { limit: ceiling });
        }
        let cash_value = request.amount / config.conversion_rate();

        let now = Utc::now();
        let mode = config.payout_mode();
        let redemption = Redemption {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount: request.amount,
            currency: PAYOUT_CURRENCY.to_string(),
            payout_method: request.payout_method,
            payout_details: request.payout_details,
            status: match mode {
                PayoutMode::Automated => RedemptionStatus::Processing,
                PayoutMode::Manual => RedemptionStatus::Pending,
            },
            approved_by: None,
            approved_at: None,
            processed_at: None,
            rejection_reason: None,
            debited_at: None,
            created_at: now,
            updated_at: now,
        };
        let settlement = match mode {
            PayoutMode::Automated => Some(settlement_entry(&redemption, cash_value)),
            PayoutMode::Manual => None,
        };

        let (stored, _) = self
            .store
            .create_redemption(&redemption, settlement)
            .await
            .inspect_err(|e| warn!(user_id = %user_id, error = %e, "Failed to create redemption"))?;

        info!(
            user_id = %user_id,
            redemption_id = %stored.id,
            amount = %stored.amount,
            mode = %mode,
            "Redemption requested"
        );
        Ok(RedemptionReceipt {
            redemption_id: stored.id,
            status: stored.status,
            cash_value: round_points(cash_value),
            message: "Redemption request submitted successfully".to_string(),
        })
    }

    pub async fn get_redemptions(
        &self,
        user_id: &str,
        status: Option<RedemptionStatus>,
    ) -> RewardsResult<Vec<Redemption>> {
        let filter = RedemptionFilter {
            user_id: Some(user_id.to_string()),
            status,
        };
        Ok(self.store.list_redemptions(&filter).await?)
    }

    pub async fn list_all_redemptions(
        &self,
        status: Option<RedemptionStatus>,
    ) -> RewardsResult<Vec<Redemption>> {
        let filter = RedemptionFilter {
            user_id: None,
            status,
        };
        Ok(self.store.list_redemptions(&filter).await?)
    }

    /// Admin transition. Approving or processing a redemption that was never
    /// debited settles it against the ledger first.
    pub async fn update_redemption_status(&self, update: RedemptionUpdate) -> RewardsResult<Redemption> {
        let current = self
            .store
            .get_redemption(update.id)
            .await?
            .ok_or_else(|| RewardsError::NotFound(format!("Redemption {}", update.id)))?;

        let settlement = if update.status.requires_debit() && current.debited_at.is_none() {
            let cash_value = self.calculate_cash_value(current.amount).await;
            Some(settlement_entry(&current, cash_value))
        } else {
            None
        };

        let (updated, settled) = self
            .store
            .update_redemption_status(&update, settlement, Utc::now())
            .await?;

        info!(
            redemption_id = %updated.id,
            status = %updated.status,
            settled = settled.is_some(),
            "Redemption status changed"
        );
        Ok(updated)
    }
}

fn settlement_entry(redemption: &Redemption, cash_value: Decimal) -> LedgerEntry {
    LedgerEntry::new(
        REDEMPTION_ACTION,
        redemption.amount,
        format!("Redemption request for ${}", round_points(cash_value).normalize()),
    )
    .with_reference(redemption.id)
    .with_metadata(serde_json::json!({
        "payoutMethod": redemption.payout_method,
        "currency": redemption.currency,
    }))
}
