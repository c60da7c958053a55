//! System settings: compiled defaults overlaid by persisted overrides

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::RewardsStore;
use crate::rewards::error::{RewardsError, RewardsResult};

pub const CONVERSION_RATE: &str = "conversion_rate";
pub const PAYOUT_MODE: &str = "payout_mode";
pub const MINIMUM_REDEEMABLE_BALANCE: &str = "minimum_redeemable_balance";
pub const MAX_MONTHLY_REDEMPTION_PER_TIER: &str = "max_monthly_redemption_per_tier";
pub const BONUS_MULTIPLIERS: &str = "bonus_multipliers";

const DEFAULT_CONVERSION_RATE: Decimal = dec!(1000);
const DEFAULT_MINIMUM_REDEEMABLE: Decimal = dec!(500);
const DEFAULT_MAX_MONTHLY: Decimal = dec!(10000);

const DEFAULT_BONUS_MULTIPLIERS: &str = r#"{"trust_bronze":1.0,"trust_silver":1.2,"trust_gold":1.5,"trust_platinum":2.0,"trust_diamond":3.0,"badge_verified":1.1,"badge_pioneer":1.3}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutMode {
    #[default]
    Manual,
    Automated,
}

impl PayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMode::Manual => "manual",
            PayoutMode::Automated => "automated",
        }
    }
}

impl fmt::Display for PayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "manual" => Ok(PayoutMode::Manual),
            "automated" => Ok(PayoutMode::Automated),
            other => Err(format!("unknown payout mode: {}", other)),
        }
    }
}

/// Resolved key/value settings. Typed accessors fall back to the compiled
/// default when a persisted value does not parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SystemConfig {
    values: BTreeMap<String, String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let values = [
            (CONVERSION_RATE, DEFAULT_CONVERSION_RATE.to_string()),
            (PAYOUT_MODE, PayoutMode::Manual.to_string()),
            (MINIMUM_REDEEMABLE_BALANCE, DEFAULT_MINIMUM_REDEEMABLE.to_string()),
            (MAX_MONTHLY_REDEMPTION_PER_TIER, DEFAULT_MAX_MONTHLY.to_string()),
            (BONUS_MULTIPLIERS, DEFAULT_BONUS_MULTIPLIERS.to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
        Self { values }
    }
}

impl SystemConfig {
    /// Defaults first, then every persisted override on top
    pub fn layered(overrides: HashMap<String, String>) -> Self {
        let mut config = Self::default();
        config.values.extend(overrides);
        config
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    fn decimal_or(&self, key: &str, default: Decimal) -> Decimal {
        self.get(key)
            .and_then(|raw| raw.trim().parse::<Decimal>().ok())
            .filter(|value| *value > Decimal::ZERO)
            .unwrap_or(default)
    }

    /// ELO points per currency unit
    pub fn conversion_rate(&self) -> Decimal {
        self.decimal_or(CONVERSION_RATE, DEFAULT_CONVERSION_RATE)
    }

    pub fn payout_mode(&self) -> PayoutMode {
        self.get(PAYOUT_MODE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn minimum_redeemable_balance(&self) -> Decimal {
        self.decimal_or(MINIMUM_REDEEMABLE_BALANCE, DEFAULT_MINIMUM_REDEEMABLE)
    }

    pub fn max_monthly_redemption_per_tier(&self) -> Decimal {
        self.decimal_or(MAX_MONTHLY_REDEMPTION_PER_TIER, DEFAULT_MAX_MONTHLY)
    }

    pub fn bonus_multipliers(&self) -> serde_json::Value {
        self.get(BONUS_MULTIPLIERS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .or_else(|| serde_json::from_str(DEFAULT_BONUS_MULTIPLIERS).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Reject values for known keys that the typed accessors could not use
pub fn validate_entry(key: &str, value: &str) -> Result<(), String> {
    match key {
        CONVERSION_RATE | MINIMUM_REDEEMABLE_BALANCE | MAX_MONTHLY_REDEMPTION_PER_TIER => {
            match value.trim().parse::<Decimal>() {
                Ok(parsed) if parsed > Decimal::ZERO => Ok(()),
                _ => Err(format!("{} must be a positive number", key)),
            }
        }
        PAYOUT_MODE => value.parse::<PayoutMode>().map(|_| ()),
        BONUS_MULTIPLIERS => serde_json::from_str::<serde_json::Value>(value)
            .map(|_| ())
            .map_err(|e| format!("{} must be valid JSON: {}", key, e)),
        _ if key.trim().is_empty() => Err("config key cannot be empty".to_string()),
        _ => Ok(()),
    }
}

/// Reads and writes system settings. Reads go to the store on every call.
pub struct ConfigStore {
    store: Arc<dyn RewardsStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn RewardsStore>) -> Self {
        Self { store }
    }

    /// Resolved settings; falls back to the defaults when the store is unreachable
    pub async fn get_system_config(&self) -> SystemConfig {
        match self.store.load_config_overrides().await {
            Ok(overrides) => SystemConfig::layered(overrides),
            Err(e) => {
                warn!(error = %e, "Failed to load system config, using defaults");
                SystemConfig::default()
            }
        }
    }

    pub async fn update_system_config(&self, entries: HashMap<String, String>) -> RewardsResult<()> {
        for (key, value) in &entries {
            validate_entry(key, value).map_err(RewardsError::InvalidInput)?;
        }

        let mut entries: Vec<(String, String)> = entries.into_iter().collect();
        entries.sort();
        self.store.upsert_config(&entries).await.map_err(|e| {
            warn!(error = %e, "Failed to update system config");
            RewardsError::from(e)
        })?;

        let keys: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
        info!(keys = ?keys, "System config updated");
        Ok(())
    }
}
