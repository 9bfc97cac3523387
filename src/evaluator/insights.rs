use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{MarketData, MarketMood, SentimentIndex};

const MAX_STRENGTHS: usize = 5;
const MAX_WEAKNESSES: usize = 3;

/// Short human-readable bullets drawn from the market snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPoints {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

/// Market-wide backdrop for the verdict, read off the fear & greed index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub fear_greed_index: u8,
    pub mood: MarketMood,
    pub recommendation: String,
}

impl MarketContext {
    pub fn from_sentiment(sentiment: &SentimentIndex) -> Self {
        if sentiment.provenance.is_absent() {
            return Self {
                fear_greed_index: 50,
                mood: MarketMood::Neutral,
                recommendation: "market sentiment unavailable".to_string(),
            };
        }

        let mood = MarketMood::from_index(sentiment.value);
        let recommendation = match mood {
            MarketMood::ExtremeFear => "fear may be a buying opportunity",
            MarketMood::Fear => "caution advised",
            MarketMood::Neutral => "balanced market",
            MarketMood::Greed => "beware of FOMO",
            MarketMood::ExtremeGreed => "high risk, consider waiting",
        };

        Self {
            fear_greed_index: sentiment.value,
            mood,
            recommendation: recommendation.to_string(),
        }
    }
}

fn compact(value: f64) -> String {
    if value >= 1e9 {
        format!("${:.1}B", value / 1e9)
    } else if value >= 1e6 {
        format!("${:.1}M", value / 1e6)
    } else {
        format!("${:.0}", value)
    }
}

/// Strengths and weaknesses of a token, at most five and three. Absent
/// market data yields no points.
pub fn analysis_points(market: &MarketData) -> AnalysisPoints {
    let mut points = AnalysisPoints::default();
    if market.provenance.is_absent() {
        return points;
    }
    info!("Collecting analysis points for {}", market.id);

    let strengths = &mut points.strengths;
    let weaknesses = &mut points.weaknesses;
    let major = matches!(market.id.as_str(), "bitcoin" | "ethereum");

    // Rank
    match market.market_cap_rank {
        Some(rank) if rank <= 5 => strengths.push(format!("top {} by market cap", rank)),
        Some(rank) if rank <= 20 => strengths.push(format!("top {}, established project", rank)),
        Some(rank) if rank <= 100 => strengths.push(format!("rank #{}, solid position", rank)),
        Some(rank) if rank > 500 => weaknesses.push(format!("rank #{}, outside the top 500", rank)),
        None => weaknesses.push("unranked by market cap".to_string()),
        _ => {}
    }

    // Size
    let cap = market.market_cap_usd;
    if cap > 100e9 {
        strengths.push(format!("giant market cap: {}", compact(cap)));
    } else if cap > 10e9 {
        strengths.push(format!("high market cap: {}", compact(cap)));
    } else if cap < 100e6 {
        weaknesses.push(format!("low market cap: {}", compact(cap)));
    }

    // Liquidity
    let volume = market.volume_24h_usd;
    if cap > 0.0 {
        let ratio = volume / cap;
        let top_50 = market.market_cap_rank.is_some_and(|r| r <= 50);
        if top_50 && volume > 1e9 {
            strengths.push(format!("excellent liquidity: {} daily volume", compact(volume)));
        } else if ratio > 0.05 {
            strengths.push(format!("good liquidity: {:.1}% of market cap", ratio * 100.0));
        } else if ratio < 0.01 {
            weaknesses.push(format!("thin liquidity: {:.2}% of market cap", ratio * 100.0));
        }
    }

    let outside_top_100 = market.market_cap_rank.map_or(true, |r| r > 100);

    // Development
    let commits = market.github_commits_4w.unwrap_or(0);
    let stars = market.github_stars.unwrap_or(0);
    if major {
        strengths.push("long-running, established development".to_string());
    } else if commits > 100 {
        strengths.push(format!("very active development: {} commits/month", commits));
    } else if commits > 50 {
        strengths.push(format!("active development: {} commits/month", commits));
    } else if commits < 10 && stars < 100 && outside_top_100 {
        weaknesses.push("little recent development activity".to_string());
    }

    // Community
    let twitter = market.twitter_followers.unwrap_or(0);
    let reddit = market.reddit_subscribers.unwrap_or(0);
    if major {
        strengths.push("one of the largest communities in crypto".to_string());
    } else if twitter > 1_000_000 || reddit > 500_000 {
        strengths.push(format!("massive community: {} Twitter followers", twitter));
    } else if twitter > 100_000 || reddit > 50_000 {
        strengths.push(format!("strong community: {} Twitter followers", twitter));
    } else if twitter < 10_000 && reddit < 5_000 && outside_top_100 {
        weaknesses.push("small community".to_string());
    }

    // Recent performance
    if let Some(change) = market.price_change_30d {
        if change > 30.0 {
            strengths.push(format!("strong upside volatility: +{:.1}% (30d)", change));
        } else if change > 10.0 {
            strengths.push(format!("positive recent performance: +{:.1}% (30d)", change));
        } else if change < -50.0 {
            weaknesses.push(format!("heavy downside volatility: {:.1}% (30d)", change));
        } else if change < -20.0 {
            weaknesses.push(format!("downside volatility: {:.1}% (30d)", change));
        }
    }

    // Age
    let years = market.age_days as f64 / 365.0;
    if market.age_days > 2000 {
        strengths.push(format!("very established token ({:.0} years)", years.floor()));
    } else if market.age_days > 730 {
        strengths.push(format!("established token ({:.1} years)", years));
    } else if market.age_days < 365 {
        weaknesses.push(format!("relatively new token ({} days)", market.age_days));
    }

    if let Some(change) = market.price_change_7d {
        if change.abs() > 40.0 {
            weaknesses.push(format!("high volatility: {:+.1}% (7d)", change));
        }
    }

    points.strengths.truncate(MAX_STRENGTHS);
    points.weaknesses.truncate(MAX_WEAKNESSES);
    points
}
