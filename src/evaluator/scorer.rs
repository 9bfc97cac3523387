use tracing::{debug, info};

use super::{HypeAssessment, HypeLevel, SubScore};
use crate::config::ScoreWeights;
use crate::models::{MarketData, SocialData};

// Awarded when a rule's inputs are missing, instead of a tier value
const MISSING_INPUT: f64 = 0.5;
const ABSENT_SOCIAL_SCORE: f64 = 3.0;
const MAJOR_FLOOR: f64 = 7.0;

pub struct TokenScorer {
    weights: ScoreWeights,
}

impl TokenScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Fundamentals: five rules worth up to two points each.
    pub fn fundamental_score(&self, market: &MarketData) -> SubScore {
        info!("Scoring fundamentals for {}", market.id);

        let rank = market.market_cap_rank.unwrap_or(u32::MAX);
        let cap = market.market_cap_usd;
        let volume = market.volume_24h_usd;
        let mut factors = Vec::new();

        // Market cap
        let cap_points = if cap >= 10e9 {
            2.0
        } else if cap >= 1e9 {
            1.0
        } else {
            0.0
        };
        factors.push(format!("market cap ${:.0}M: {}", cap / 1e6, cap_points));

        // Liquidity
        let turnover = if cap > 0.0 { volume / cap } else { 0.0 };
        let liquidity_points = if rank <= 50 && volume > 1e9 {
            2.0
        } else if turnover > 0.02 || volume > 500e6 {
            1.0
        } else {
            0.0
        };
        factors.push(format!("volume/cap {:.3}: {}", turnover, liquidity_points));

        // Development
        let has_dev_data = market.github_commits_4w.is_some() || market.github_stars.is_some();
        let commits = market.github_commits_4w.unwrap_or(0);
        let stars = market.github_stars.unwrap_or(0);
        let dev_points = if rank <= 10 && cap >= 50e9 {
            2.0
        } else if has_dev_data && (commits > 50 || stars > 1000) {
            2.0
        } else if has_dev_data && (commits > 10 || stars > 100) {
            1.0
        } else if rank <= 100 {
            1.0
        } else if has_dev_data {
            0.0
        } else {
            MISSING_INPUT
        };
        factors.push(format!("development ({} commits/4w, {} stars): {}", commits, stars, dev_points));

        // Community
        let has_community = market.twitter_followers.is_some() || market.reddit_subscribers.is_some();
        let twitter = market.twitter_followers.unwrap_or(0);
        let community_total = twitter + market.reddit_subscribers.unwrap_or(0);
        let community_points = if rank <= 5 {
            2.0
        } else if has_community && (community_total > 500_000 || twitter > 300_000) {
            2.0
        } else if (has_community && (community_total > 50_000 || twitter > 30_000)) || rank <= 50 {
            1.0
        } else if has_community {
            0.0
        } else {
            MISSING_INPUT
        };
        factors.push(format!("community {}: {}", community_total, community_points));

        // Performance, judged more leniently for mature assets
        let performance_points = match market.price_change_30d {
            Some(change) if market.age_days > 730 => {
                if change > 5.0 {
                    2.0
                } else if change > -30.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Some(change) => {
                if change > 10.0 {
                    2.0
                } else if change > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            None => MISSING_INPUT,
        };
        factors.push(format!("30d performance: {}", performance_points));

        let mut score =
            cap_points + liquidity_points + dev_points + community_points + performance_points;
        if (market.id == "bitcoin" || market.id == "ethereum") && score < MAJOR_FLOOR {
            factors.push(format!("major asset floor {}", MAJOR_FLOOR));
            score = MAJOR_FLOOR;
        }

        debug!("Fundamental score for {}: {:.1}", market.id, score);
        SubScore::new("fundamental", score, self.weights.fundamental, factors)
    }

    pub fn technical_score(&self, score: f64, factors: Vec<String>) -> SubScore {
        SubScore::new("technical", score, self.weights.technical, factors)
    }

    pub fn risk_score(&self, score: f64, factors: Vec<String>) -> SubScore {
        SubScore::new("risk", score, self.weights.risk, factors)
    }

    pub fn social_score(&self, social: &SocialData, hype: &HypeAssessment) -> SubScore {
        if social.provenance.is_absent() || !social.has_core_metrics() {
            return SubScore::new(
                "social",
                ABSENT_SOCIAL_SCORE,
                self.weights.social,
                vec![format!("no live social data ({})", social.provenance.source)],
            );
        }

        let mut score = 5.0;
        let mut factors = Vec::new();

        if social.galaxy_score > 70.0 {
            score += 2.0;
            factors.push(format!("galaxy score {:.0}", social.galaxy_score));
        } else if social.galaxy_score > 50.0 {
            score += 1.0;
            factors.push(format!("galaxy score {:.0}", social.galaxy_score));
        } else if social.galaxy_score > 0.0 && social.galaxy_score < 30.0 {
            score -= 1.0;
            factors.push(format!("weak galaxy score {:.0}", social.galaxy_score));
        }

        if social.sentiment_bullish > 70.0 {
            score += 1.0;
            factors.push(format!("{:.0}% bullish", social.sentiment_bullish));
        } else if social.sentiment_bullish < 40.0 {
            score -= 1.0;
            factors.push(format!("only {:.0}% bullish", social.sentiment_bullish));
        }

        if social.social_volume > 1000.0 || social.tweets > 100 {
            score += 1.0;
            factors.push("active community".to_string());
        }

        match social.alt_rank {
            Some(rank) if rank < 10 => {
                score += 1.0;
                factors.push(format!("alt rank #{}", rank));
            }
            Some(rank) if rank < 50 => {
                score += 0.5;
                factors.push(format!("alt rank #{}", rank));
            }
            _ => {}
        }

        // Crowded trades get marked down
        match hype.level {
            HypeLevel::Extreme => {
                score -= 2.0;
                factors.push("extreme hype penalty".to_string());
            }
            HypeLevel::High => {
                score -= 1.0;
                factors.push("high hype penalty".to_string());
            }
            _ => {}
        }

        SubScore::new("social", score, self.weights.social, factors)
    }

    /// Weighted sum of the sub-scores, on the same 0-10 scale.
    pub fn total(&self, sub_scores: &[SubScore]) -> f64 {
        let total: f64 = sub_scores.iter().map(SubScore::weighted).sum();
        total.clamp(0.0, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::hype::GrowthPattern;
    use crate::models::Provenance;

    fn scorer() -> TokenScorer {
        TokenScorer::new(ScoreWeights::default())
    }

    fn hype(level: HypeLevel) -> HypeAssessment {
        HypeAssessment {
            hype_score: 0,
            level,
            pattern: GrowthPattern::InsufficientHistory,
            signals: Vec::new(),
            recommended_action: String::new(),
            data_source: "test".to_string(),
        }
    }

    #[test]
    fn test_total_is_monotonic_in_fundamental() {
        let s = scorer();
        let others = [
            s.technical_score(6.0, Vec::new()),
            SubScore::new("social", 4.0, 0.2, Vec::new()),
            s.risk_score(7.0, Vec::new()),
        ];

        let mut previous = f64::MIN;
        for step in 0..=20 {
            let fundamental = SubScore::new("fundamental", step as f64 * 0.5, 0.4, Vec::new());
            let mut all = vec![fundamental];
            all.extend(others.iter().cloned());
            let total = s.total(&all);
            assert!(total >= previous);
            assert!((0.0..=10.0).contains(&total));
            previous = total;
        }
    }

    #[test]
    fn test_weighted_total() {
        let s = scorer();
        let subs = vec![
            SubScore::new("fundamental", 10.0, 0.4, Vec::new()),
            s.technical_score(5.0, Vec::new()),
            SubScore::new("social", 5.0, 0.2, Vec::new()),
            s.risk_score(0.0, Vec::new()),
        ];
        assert!((s.total(&subs) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_inputs_score_half_points() {
        let market = MarketData {
            id: "obscure".to_string(),
            market_cap_usd: 20e6,
            volume_24h_usd: 100_000.0,
            market_cap_rank: Some(900),
            ..MarketData::default()
        };
        let sub = scorer().fundamental_score(&market);
        // dev, community and performance each fall back to half a point
        assert_eq!(sub.score, 1.5);
        assert!(sub.score.is_finite());
    }

    #[test]
    fn test_major_floor() {
        let market = MarketData {
            id: "ethereum".to_string(),
            market_cap_usd: 400e9,
            volume_24h_usd: 100e6,
            market_cap_rank: Some(2),
            price_change_30d: Some(-40.0),
            age_days: 3000,
            ..MarketData::default()
        };
        let sub = scorer().fundamental_score(&market);
        assert_eq!(sub.score, 7.0);
    }

    #[test]
    fn test_strong_fundamentals() {
        let market = MarketData {
            id: "solana".to_string(),
            market_cap_usd: 80e9,
            volume_24h_usd: 3e9,
            market_cap_rank: Some(5),
            price_change_30d: Some(12.0),
            age_days: 1500,
            github_commits_4w: Some(120),
            twitter_followers: Some(2_000_000),
            ..MarketData::default()
        };
        assert_eq!(scorer().fundamental_score(&market).score, 10.0);
    }

    #[test]
    fn test_absent_social_scores_three() {
        let sub = scorer().social_score(&SocialData::limited("limited"), &hype(HypeLevel::InsufficientData));
        assert_eq!(sub.score, 3.0);
    }

    #[test]
    fn test_hype_penalizes_social() {
        let social = SocialData {
            galaxy_score: 75.0,
            sentiment_bullish: 80.0,
            social_volume: 3_000.0,
            provenance: Provenance::live("lunarcrush_v4"),
            ..SocialData::default()
        };
        let calm = scorer().social_score(&social, &hype(HypeLevel::Normal));
        let frenzied = scorer().social_score(&social, &hype(HypeLevel::Extreme));
        assert_eq!(calm.score, 9.0);
        assert_eq!(frenzied.score, 7.0);
    }
}
