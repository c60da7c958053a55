//! Error taxonomy and result envelope for the rewards services

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::database::StoreError;

#[derive(Debug, Error)]
pub enum RewardsError {
    /// Trust gate or frequency cap; expected and user-facing
    #[error("{0}")]
    NotEligible(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },

    #[error("Minimum balance of {minimum} ELO required for redemption")]
    BelowMinimumRedeemable { minimum: Decimal },

    #[error("Maximum redemption for your tier is {limit} ELO")]
    ExceedsTierCap { limit: Decimal },

    #[error("User already referred")]
    DuplicateReferral,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for RewardsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => RewardsError::NotFound(what),
            StoreError::InsufficientBalance {
                requested,
                available,
            } => RewardsError::InsufficientBalance {
                requested,
                available,
            },
            StoreError::Invalid(msg) => RewardsError::InvalidInput(msg),
            StoreError::LimitReached => RewardsError::NotEligible("Activity limit reached".to_string()),
            other => RewardsError::Persistence(other.to_string()),
        }
    }
}

pub type RewardsResult<T> = Result<T, RewardsError>;

/// Serializable `{success, data?, message}` outcome of an engine operation
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T> ActionResult<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }
}
