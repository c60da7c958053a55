//! Tier Catalog
//!
//! Static tier table keyed by cumulative points earned. The same five names
//! double as trust levels derived from the 0-100 trust score, and both ladders
//! read their multiplier from this table (see [`trust_multiplier`]).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification shared by the point-tier and trust-level ladders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Bronze,
        Tier::Silver,
        Tier::Gold,
        Tier::Platinum,
        Tier::Diamond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
            Tier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            "platinum" => Ok(Tier::Platinum),
            "diamond" => Ok(Tier::Diamond),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// One row of the tier table
#[derive(Debug, Clone, Serialize)]
pub struct TierConfig {
    pub tier: Tier,
    pub name: &'static str,
    pub min_points: Decimal,
    /// `None` means unbounded
    pub max_points: Option<Decimal>,
    pub multiplier: Decimal,
    pub monthly_withdrawal_limit: Decimal,
    pub exclusive_rewards: &'static [&'static str],
    pub color: &'static str,
}

impl TierConfig {
    pub fn contains(&self, points: Decimal) -> bool {
        points >= self.min_points && self.max_points.is_none_or(|max| points <= max)
    }
}

static TIERS: [TierConfig; 5] = [
    TierConfig {
        tier: Tier::Bronze,
        name: "Bronze",
        min_points: dec!(0),
        max_points: Some(dec!(5000)),
        multiplier: dec!(1.0),
        monthly_withdrawal_limit: dec!(5),
        exclusive_rewards: &["basic_ads"],
        color: "bg-orange-600",
    },
    TierConfig {
        tier: Tier::Silver,
        name: "Silver",
        min_points: dec!(5001),
        max_points: Some(dec!(20000)),
        multiplier: dec!(1.2),
        monthly_withdrawal_limit: dec!(10),
        exclusive_rewards: &["early_creator_tools"],
        color: "bg-gray-400",
    },
    TierConfig {
        tier: Tier::Gold,
        name: "Gold",
        min_points: dec!(20001),
        max_points: Some(dec!(100000)),
        multiplier: dec!(1.5),
        monthly_withdrawal_limit: dec!(25),
        exclusive_rewards: &["premium_analytics"],
        color: "bg-yellow-500",
    },
    TierConfig {
        tier: Tier::Platinum,
        name: "Platinum",
        min_points: dec!(100001),
        max_points: Some(dec!(500000)),
        multiplier: dec!(2.0),
        monthly_withdrawal_limit: dec!(50),
        exclusive_rewards: &["nft_access"],
        color: "bg-purple-600",
    },
    TierConfig {
        tier: Tier::Diamond,
        name: "Diamond",
        min_points: dec!(500001),
        max_points: None,
        multiplier: dec!(3.0),
        monthly_withdrawal_limit: dec!(100),
        exclusive_rewards: &["lifetime_premium", "brand_deals"],
        color: "bg-blue-600",
    },
];

/// Pure lookups over the static tier table
pub struct TierCatalog;

impl TierCatalog {
    pub fn all() -> &'static [TierConfig] {
        &TIERS
    }

    pub fn config(tier: Tier) -> &'static TierConfig {
        &TIERS[tier as usize]
    }

    /// Highest tier whose minimum is reached. Fractional totals such as
    /// 5000.5 fall between two ranges and land in the upper one.
    pub fn tier_for_points(points: Decimal) -> Tier {
        TIERS
            .iter()
            .rev()
            .find(|config| points >= config.min_points)
            .map(|config| config.tier)
            .unwrap_or(Tier::Bronze)
    }

    pub fn multiplier_for(tier: Tier) -> Decimal {
        Self::config(tier).multiplier
    }
}

/// Trust level for a 0-100 trust score
pub fn trust_level_for_score(score: i32) -> Tier {
    match score {
        s if s >= 90 => Tier::Diamond,
        s if s >= 75 => Tier::Platinum,
        s if s >= 60 => Tier::Gold,
        s if s >= 40 => Tier::Silver,
        _ => Tier::Bronze,
    }
}

/// Reward multiplier for a trust level.
///
/// Reads the point-tier multiplier table keyed by the level name. Kept as its
/// own lookup so the two ladders can be given separate tables later.
pub fn trust_multiplier(level: Tier) -> Decimal {
    TierCatalog::multiplier_for(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(TierCatalog::tier_for_points(dec!(0)), Tier::Bronze);
        assert_eq!(TierCatalog::tier_for_points(dec!(5000)), Tier::Bronze);
        assert_eq!(TierCatalog::tier_for_points(dec!(5001)), Tier::Silver);
        assert_eq!(TierCatalog::tier_for_points(dec!(20000)), Tier::Silver);
        assert_eq!(TierCatalog::tier_for_points(dec!(20001)), Tier::Gold);
        assert_eq!(TierCatalog::tier_for_points(dec!(100000)), Tier::Gold);
        assert_eq!(TierCatalog::tier_for_points(dec!(100001)), Tier::Platinum);
        assert_eq!(TierCatalog::tier_for_points(dec!(500001)), Tier::Diamond);
        assert_eq!(TierCatalog::tier_for_points(dec!(90000000)), Tier::Diamond);
    }

    #[test]
    fn test_fractional_totals_between_ranges() {
        let bronze = TierCatalog::config(Tier::Bronze);
        assert!(bronze.contains(dec!(5000)));
        assert!(!bronze.contains(dec!(5000.5)));
        assert!(!TierCatalog::config(Tier::Silver).contains(dec!(5000.5)));
        assert_eq!(TierCatalog::tier_for_points(dec!(5000.5)), Tier::Silver);
        assert!(TierCatalog::config(Tier::Diamond).contains(dec!(10000000)));
    }

    #[test]
    fn test_negative_points_are_bronze() {
        assert_eq!(TierCatalog::tier_for_points(dec!(-10)), Tier::Bronze);
    }

    #[test]
    fn test_tier_samples() {
        assert_eq!(TierCatalog::tier_for_points(dec!(2500)), Tier::Bronze);
        assert_eq!(TierCatalog::tier_for_points(dec!(10000)), Tier::Silver);
        assert_eq!(TierCatalog::tier_for_points(dec!(50000)), Tier::Gold);
        assert_eq!(TierCatalog::tier_for_points(dec!(250000)), Tier::Platinum);
        assert_eq!(TierCatalog::tier_for_points(dec!(750000)), Tier::Diamond);
    }

    #[test]
    fn test_trust_levels() {
        assert_eq!(trust_level_for_score(100), Tier::Diamond);
        assert_eq!(trust_level_for_score(90), Tier::Diamond);
        assert_eq!(trust_level_for_score(89), Tier::Platinum);
        assert_eq!(trust_level_for_score(75), Tier::Platinum);
        assert_eq!(trust_level_for_score(60), Tier::Gold);
        assert_eq!(trust_level_for_score(59), Tier::Silver);
        assert_eq!(trust_level_for_score(40), Tier::Silver);
        assert_eq!(trust_level_for_score(39), Tier::Bronze);
        assert_eq!(trust_level_for_score(0), Tier::Bronze);
    }

    #[test]
    fn test_shared_multipliers() {
        assert_eq!(TierCatalog::multiplier_for(Tier::Gold), dec!(1.5));
        assert_eq!(trust_multiplier(Tier::Gold), dec!(1.5));
        assert_eq!(trust_multiplier(Tier::Diamond), dec!(3.0));
        assert_eq!(TierCatalog::config(Tier::Platinum).monthly_withdrawal_limit, dec!(50));
    }

    #[test]
    fn test_tier_parse_roundtrip() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("mythril".parse::<Tier>().is_err());
    }
}
