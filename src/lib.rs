//! Eloits Rewards Engine
//!
//! Tiered loyalty engine for ELO points: rule-based accrual with trust and
//! personal multipliers, repetition decay, trust scoring, spam detection,
//! multi-level referral payouts and redemption to cash.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Environment configuration
//! ├── rewards/       - Rewards domain
//! │   ├── engine.rs     - EloitsEngine facade
//! │   ├── settings.rs   - System settings over defaults
//! │   ├── tier.rs       - Tier table & trust levels
//! │   ├── rules.rs      - Frequency caps & decay factor
//! │   ├── processor.rs  - Award pipeline
//! │   ├── trust.rs      - Trust score & decay
//! │   ├── spam.rs       - Hourly spam detection
//! │   ├── referral.rs   - Referral graph & cascade
//! │   ├── redemption.rs - Cash-out requests & settlement
//! │   ├── models.rs     - Accounts, rules, ledger rows
//! │   └── error.rs      - Error taxonomy & result envelope
//! ├── api/           - HTTP API endpoints
//! │   ├── rewards.rs    - User routes
//! │   ├── admin.rs      - Admin routes
//! │   ├── middleware.rs - API keys, identity, headers
//! │   └── error.rs      - Status mapping
//! └── database/      - Persistence
//!     ├── mod.rs        - Repository traits
//!     ├── memory.rs     - In-memory store
//!     └── pool.rs ...   - PostgreSQL repositories
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod rewards;

pub use config::EngineConfig;
pub use database::{DatabasePool, MemoryStore, RewardsStore, StoreError};
pub use rewards::{
    Account, ActionResult, EloitsEngine, RewardRule, RewardsError, RewardsResult, Tier,
    TierCatalog,
};
