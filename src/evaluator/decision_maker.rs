use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ClassificationThresholds, EliminationThresholds};
use crate::models::{AgeSource, DefiData, MarketData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    StrongBuy,
    Research,
    Avoid,
    /// Did not pass elimination
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTier {
    Major,
    LargeCap,
    MidCap,
    SmallCap,
    MicroCap,
    NanoCap,
    Meme,
    Stablecoin,
    Layer2,
}

const MEME_IDS: [&str; 5] = ["dogecoin", "shiba-inu", "pepe", "floki", "bonk"];
const STABLECOIN_IDS: [&str; 4] = ["tether", "usd-coin", "dai", "frax"];
const LAYER2_IDS: [&str; 3] = ["arbitrum", "optimism", "polygon-pos"];

impl MarketTier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Major => "MAJOR",
            Self::LargeCap => "LARGE CAP",
            Self::MidCap => "MID CAP",
            Self::SmallCap => "SMALL CAP",
            Self::MicroCap => "MICRO CAP",
            Self::NanoCap => "NANO CAP",
            Self::Meme => "MEME COIN",
            Self::Stablecoin => "STABLECOIN",
            Self::Layer2 => "LAYER 2",
        }
    }

    pub fn risk_level(&self) -> &'static str {
        match self {
            Self::Major => "established",
            Self::LargeCap => "low-medium",
            Self::MidCap | Self::Layer2 => "medium",
            Self::SmallCap => "medium-high",
            Self::MicroCap => "high",
            Self::NanoCap => "very high",
            Self::Meme => "speculative",
            Self::Stablecoin => "low",
        }
    }
}

/// Display class of a token: tier label, risk wording and a quality
/// verdict from the total score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClass {
    pub label: String,
    pub risk_level: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationResult {
    pub passed: bool,
    pub reasons: Vec<String>,
}

pub struct DecisionMaker {
    elimination: EliminationThresholds,
    thresholds: ClassificationThresholds,
}

impl DecisionMaker {
    pub fn new(elimination: EliminationThresholds, thresholds: ClassificationThresholds) -> Self {
        Self {
            elimination,
            thresholds,
        }
    }

    /// Hard pre-filter on liquidity and listing age. Each failed minimum
    /// contributes one reason; a live snapshot with a zero market cap or
    /// volume adds "no verifiable liquidity" ahead of them.
    pub fn check_elimination(&self, market: &MarketData) -> EliminationResult {
        info!("Running elimination gate for {}", market.id);
        let mut reasons = Vec::new();

        if market.provenance.is_absent() {
            reasons.push("market data unavailable".to_string());
        } else if market.market_cap_usd <= 0.0 || market.volume_24h_usd <= 0.0 {
            reasons.push("no verifiable liquidity".to_string());
        }

        if market.market_cap_usd < self.elimination.min_market_cap {
            reasons.push(format!(
                "market cap ${:.0} below minimum ${:.0}",
                market.market_cap_usd, self.elimination.min_market_cap
            ));
        }

        if market.volume_24h_usd < self.elimination.min_volume {
            reasons.push(format!(
                "24h volume ${:.0} below minimum ${:.0}",
                market.volume_24h_usd, self.elimination.min_volume
            ));
        }

        if market.age_source == AgeSource::Unknown {
            reasons.push("listing age unknown".to_string());
        } else if market.age_days < self.elimination.min_age_days {
            reasons.push(format!(
                "listed {} days ago, minimum is {} days",
                market.age_days, self.elimination.min_age_days
            ));
        }

        if !reasons.is_empty() {
            debug!("{} eliminated: {}", market.id, reasons.join("; "));
        }

        EliminationResult {
            passed: reasons.is_empty(),
            reasons,
        }
    }

    pub fn classify(&self, total: f64) -> Classification {
        if total >= self.thresholds.strong_buy {
            Classification::StrongBuy
        } else if total >= self.thresholds.research {
            Classification::Research
        } else {
            Classification::Avoid
        }
    }

    /// Tier label, prefixed with `DEFI` when the token maps to a DeFi
    /// protocol, plus a quality verdict for `total`.
    pub fn token_class(&self, tier: MarketTier, defi: &DefiData, total: f64) -> TokenClass {
        let defi_protocol = defi.protocol.is_some()
            && !matches!(tier, MarketTier::Meme | MarketTier::Stablecoin);
        let label = if defi_protocol {
            format!("DEFI {}", tier.label())
        } else {
            tier.label().to_string()
        };

        let quality = if total >= 9.0 {
            "excellent fundamentals"
        } else if total >= 7.0 {
            "solid fundamentals"
        } else if total >= 5.0 {
            "average fundamentals"
        } else if total >= 3.0 {
            "weak fundamentals"
        } else {
            "very weak fundamentals"
        };

        TokenClass {
            label,
            risk_level: tier.risk_level().to_string(),
            quality: quality.to_string(),
        }
    }

    pub fn market_tier(&self, market: &MarketData) -> MarketTier {
        let id = market.id.as_str();

        // Category overrides win over size
        if market.has_category("meme") || MEME_IDS.contains(&id) {
            return MarketTier::Meme;
        }
        if market.has_category("stablecoin") || STABLECOIN_IDS.contains(&id) {
            return MarketTier::Stablecoin;
        }
        if market.has_category("layer 2") || LAYER2_IDS.contains(&id) {
            return MarketTier::Layer2;
        }

        if id == "bitcoin" || id == "ethereum" {
            return MarketTier::Major;
        }

        match market.market_cap_rank {
            Some(rank) if rank <= 10 => MarketTier::LargeCap,
            Some(rank) if rank <= 50 => MarketTier::MidCap,
            Some(rank) if rank <= 100 => MarketTier::SmallCap,
            Some(rank) if rank <= 500 => MarketTier::MicroCap,
            _ => MarketTier::NanoCap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;

    fn maker() -> DecisionMaker {
        DecisionMaker::new(
            EliminationThresholds::default(),
            ClassificationThresholds::default(),
        )
    }

    fn market(cap: f64, volume: f64, age: u32) -> MarketData {
        MarketData {
            id: "sample".to_string(),
            market_cap_usd: cap,
            volume_24h_usd: volume,
            age_days: age,
            age_source: AgeSource::GenesisDate,
            provenance: Provenance::live("coingecko_full"),
            ..MarketData::default()
        }
    }

    #[test]
    fn test_small_young_token_has_three_reasons() {
        let result = maker().check_elimination(&market(50_000.0, 5_000.0, 90));
        assert!(!result.passed);
        assert_eq!(result.reasons.len(), 3);
        assert!(result.reasons[0].starts_with("market cap"));
        assert!(result.reasons[1].starts_with("24h volume"));
        assert!(result.reasons[2].starts_with("listed 90 days"));
    }

    #[test]
    fn test_established_token_passes() {
        let result = maker().check_elimination(&market(5e9, 2e8, 2000));
        assert!(result.passed);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_thresholds_are_inclusive_minimums() {
        assert!(maker()
            .check_elimination(&market(1_000_000.0, 100_000.0, 180))
            .passed);
    }

    #[test]
    fn test_absent_market_data_is_eliminated() {
        let result = maker().check_elimination(&MarketData::default());
        assert!(!result.passed);
        assert_eq!(result.reasons[0], "market data unavailable");
        assert!(result.reasons.contains(&"listing age unknown".to_string()));
    }

    #[test]
    fn test_zero_liquidity_is_its_own_reason() {
        let result = maker().check_elimination(&market(0.0, 0.0, 2000));
        assert!(!result.passed);
        assert_eq!(result.reasons[0], "no verifiable liquidity");
        assert_eq!(result.reasons.len(), 3);

        let no_volume = maker().check_elimination(&market(5e9, 0.0, 2000));
        assert_eq!(no_volume.reasons[0], "no verifiable liquidity");
        assert!(no_volume.reasons[1].starts_with("24h volume"));
    }

    #[test]
    fn test_token_class_labels_and_quality() {
        let m = maker();
        let aave = DefiData {
            protocol: Some("aave".to_string()),
            ..DefiData::default()
        };

        let plain = m.token_class(MarketTier::MidCap, &DefiData::default(), 7.2);
        assert_eq!(plain.label, "MID CAP");
        assert_eq!(plain.risk_level, "medium");
        assert_eq!(plain.quality, "solid fundamentals");

        let defi = m.token_class(MarketTier::MidCap, &aave, 9.0);
        assert_eq!(defi.label, "DEFI MID CAP");
        assert_eq!(defi.quality, "excellent fundamentals");

        assert_eq!(m.token_class(MarketTier::Meme, &aave, 4.0).label, "MEME COIN");
        assert_eq!(
            m.token_class(MarketTier::NanoCap, &DefiData::default(), 2.9).quality,
            "very weak fundamentals"
        );
        assert_eq!(
            m.token_class(MarketTier::SmallCap, &DefiData::default(), 5.0).quality,
            "average fundamentals"
        );
    }

    #[test]
    fn test_classification_buckets() {
        let m = maker();
        assert_eq!(m.classify(8.0), Classification::StrongBuy);
        assert_eq!(m.classify(7.99), Classification::Research);
        assert_eq!(m.classify(5.0), Classification::Research);
        assert_eq!(m.classify(4.9), Classification::Avoid);
    }

    #[test]
    fn test_market_tiers() {
        let m = maker();
        let with = |id: &str, rank: Option<u32>, categories: &[&str]| MarketData {
            id: id.to_string(),
            market_cap_rank: rank,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..MarketData::default()
        };

        assert_eq!(m.market_tier(&with("bitcoin", Some(1), &[])), MarketTier::Major);
        assert_eq!(m.market_tier(&with("solana", Some(5), &[])), MarketTier::LargeCap);
        assert_eq!(m.market_tier(&with("x", Some(75), &[])), MarketTier::SmallCap);
        assert_eq!(m.market_tier(&with("x", None, &[])), MarketTier::NanoCap);
        assert_eq!(m.market_tier(&with("dogecoin", Some(8), &[])), MarketTier::Meme);
        assert_eq!(
            m.market_tier(&with("x", Some(3), &["Stablecoins"])),
            MarketTier::Stablecoin
        );
        assert_eq!(
            m.market_tier(&with("x", Some(40), &["Layer 2 (L2)"])),
            MarketTier::Layer2
        );
    }
}
