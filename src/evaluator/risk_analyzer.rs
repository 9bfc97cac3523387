use tracing::info;

use super::HypeLevel;
use crate::models::{DefiData, MarketData, MarketMood, SentimentIndex};

pub struct RiskAnalyzer;

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Risk sub-score on 0-10, higher meaning safer. Starts from a neutral
    /// five risk points and inverts the total.
    pub fn analyze_risk(
        &self,
        market: &MarketData,
        defi: &DefiData,
        sentiment: &SentimentIndex,
        hype: HypeLevel,
    ) -> (f64, Vec<String>) {
        info!("Analyzing risk for {}...", market.id);

        let mut risk_points: i32 = 5;
        let mut factors = Vec::new();

        // High volatility (large 24h change) increases risk
        let swing = market.price_change_24h.abs();
        if swing > 20.0 {
            risk_points += 2;
            factors.push(format!("24h move {:.1}% (very volatile)", swing));
        } else if swing > 10.0 {
            risk_points += 1;
            factors.push(format!("24h move {:.1}% (volatile)", swing));
        }

        // Established ranks lower risk
        match market.market_cap_rank {
            Some(rank) if rank <= 10 => {
                risk_points -= 2;
                factors.push(format!("top 10 by market cap (#{})", rank));
            }
            Some(rank) if rank <= 100 => {
                risk_points -= 1;
                factors.push(format!("top 100 by market cap (#{})", rank));
            }
            Some(rank) if rank > 500 => {
                risk_points += 1;
                factors.push(format!("outside top 500 (#{})", rank));
            }
            None => {
                risk_points += 1;
                factors.push("unranked".to_string());
            }
            _ => {}
        }

        if market.market_cap_usd < 100_000_000.0 {
            risk_points += 1;
            factors.push("market cap under $100M".to_string());
        }

        if market.age_days < 365 {
            risk_points += 1;
            factors.push(format!("listed {} days", market.age_days));
        }

        // Euphoric markets punish late entries
        if sentiment.mood == MarketMood::ExtremeGreed {
            risk_points += 1;
            factors.push(format!("market in extreme greed ({})", sentiment.value));
        }

        match hype {
            HypeLevel::Extreme => {
                risk_points += 2;
                factors.push("extreme social hype".to_string());
            }
            HypeLevel::High => {
                risk_points += 1;
                factors.push("high social hype".to_string());
            }
            _ => {}
        }

        // Market cap well backed by locked value
        if let Some(ratio) = defi.mcap_to_tvl {
            if ratio < 1.5 {
                risk_points -= 1;
                factors.push(format!("mcap/TVL {:.2}", ratio));
            }
        }

        let score = (10 - risk_points).clamp(0, 10) as f64;
        (score, factors)
    }
}

impl Default for RiskAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
