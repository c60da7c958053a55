//! Tiered Rewards Engine
//!
//! Point accrual, trust scoring, spam detection, referral payouts and
//! redemptions for ELO points.
//!
//! ```text
//! EloitsEngine
//!  ├── ConfigStore ........ system settings over defaults
//!  ├── RewardProcessor .... rules, gates, multipliers, decay, credit
//!  │    └── RuleEngine .... frequency caps and decay factor
//!  ├── TrustEngine ........ clamped score, inactivity and spam decay
//!  ├── SpamGuard .......... hourly thresholds, -2 trust on detection
//!  ├── ReferralGraph ...... direct reward plus two ancestor levels
//!  └── RedemptionProcessor  cash value, gates, settlement
//! ```
//!
//! [`TierCatalog`] is a static table shared by every component.

pub mod engine;
pub mod error;
pub mod models;
pub mod processor;
pub mod redemption;
pub mod referral;
pub mod rules;
pub mod settings;
pub mod spam;
pub mod tier;
pub mod trust;

pub use engine::EloitsEngine;
pub use error::{ActionResult, RewardsError, RewardsResult};
pub use models::{
    Account, DecayReason, LedgerEntry, Redemption, RedemptionFilter, RedemptionStatus,
    RedemptionUpdate, ReferralEdge, ReferralLink, ReferralStatus, RewardRule, RewardTransaction,
    SpamDetection, TransactionStatus, TrustDecayEntry, TrustHistoryEntry,
};
pub use processor::{AwardOutcome, AwardRequest, RewardProcessor};
pub use redemption::{RedemptionProcessor, RedemptionReceipt, RedemptionRequest};
pub use referral::{LevelReward, ReferralGraph, ReferralOutcome};
pub use rules::RuleEngine;
pub use settings::{ConfigStore, PayoutMode, SystemConfig};
pub use spam::{SpamCheck, SpamGuard};
pub use tier::{Tier, TierCatalog, TierConfig, trust_level_for_score, trust_multiplier};
pub use trust::TrustEngine;
