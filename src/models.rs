use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A case-insensitive token identifier or symbol as typed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenQuery(String);

impl TokenQuery {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TokenQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The canonical market-data identity a query resolved to. Other providers
/// derive their own native ids from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedToken {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    /// Served by the richest source for the category
    Live,
    /// Served by a cheaper fallback source
    Degraded,
    /// No source could supply it; values are neutral defaults
    Absent,
}

/// Which source produced a record subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub status: DataStatus,
}

impl Provenance {
    pub fn live(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: DataStatus::Live,
        }
    }

    pub fn degraded(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: DataStatus::Degraded,
        }
    }

    pub fn absent(source: &str) -> Self {
        Self {
            source: source.to_string(),
            status: DataStatus::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.status == DataStatus::Absent
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::absent("absent")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgeSource {
    GenesisDate,
    PriceHistory,
    Estimated,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MarketData {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub volume_24h_usd: f64,
    pub price_change_24h: f64,
    pub price_change_7d: Option<f64>,
    pub price_change_30d: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub age_days: u32,
    pub age_source: AgeSource,
    pub categories: Vec<String>,
    pub ath_usd: Option<f64>,
    pub twitter_followers: Option<u64>,
    pub reddit_subscribers: Option<u64>,
    pub github_commits_4w: Option<u64>,
    pub github_stars: Option<u64>,
    pub provenance: Provenance,
}

impl MarketData {
    pub fn has_category(&self, needle: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialData {
    pub galaxy_score: f64,
    pub social_volume: f64,
    pub social_engagement: f64,
    pub social_contributors: f64,
    pub social_dominance: f64,
    pub tweets: u64,
    pub reddit_posts: u64,
    pub news_articles: u64,
    pub sentiment_bullish: f64,
    pub sentiment_bearish: f64,
    /// Percentage change of social volume over the last day
    pub social_volume_change: f64,
    /// Percentage change of engagement over the last day
    pub engagement_change: f64,
    pub galaxy_score_change: f64,
    pub alt_rank: Option<u32>,
    /// Daily contributor counts, oldest first
    pub history_7d: Vec<f64>,
    pub provenance: Provenance,
}

impl SocialData {
    /// Neutral snapshot used when no social source answered.
    pub fn limited(source: &str) -> Self {
        Self {
            galaxy_score: 0.0,
            social_volume: 0.0,
            social_engagement: 0.0,
            social_contributors: 0.0,
            social_dominance: 0.0,
            tweets: 0,
            reddit_posts: 0,
            news_articles: 0,
            sentiment_bullish: 50.0,
            sentiment_bearish: 50.0,
            social_volume_change: 0.0,
            engagement_change: 0.0,
            galaxy_score_change: 0.0,
            alt_rank: None,
            history_7d: Vec::new(),
            provenance: Provenance::absent(source),
        }
    }

    pub fn has_core_metrics(&self) -> bool {
        self.galaxy_score > 0.0
            || self.social_volume > 0.0
            || self.social_engagement > 0.0
            || self.social_contributors > 0.0
    }
}

impl Default for SocialData {
    fn default() -> Self {
        Self::limited("absent")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DefiData {
    pub protocol: Option<String>,
    pub tvl_usd: f64,
    pub tvl_change_7d: Option<f64>,
    pub mcap_to_tvl: Option<f64>,
    pub category: Option<String>,
    pub chains: Vec<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketMood {
    ExtremeFear,
    Fear,
    Neutral,
    Greed,
    ExtremeGreed,
}

impl MarketMood {
    pub fn from_index(value: u8) -> Self {
        match value {
            0..=24 => Self::ExtremeFear,
            25..=44 => Self::Fear,
            45..=54 => Self::Neutral,
            55..=74 => Self::Greed,
            _ => Self::ExtremeGreed,
        }
    }
}

/// Market-wide fear & greed reading, 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentIndex {
    pub value: u8,
    pub classification: String,
    pub mood: MarketMood,
    pub provenance: Provenance,
}

impl SentimentIndex {
    pub fn neutral(source: &str) -> Self {
        Self {
            value: 50,
            classification: "Neutral".to_string(),
            mood: MarketMood::Neutral,
            provenance: Provenance::absent(source),
        }
    }
}

impl Default for SentimentIndex {
    fn default() -> Self {
        Self::neutral("absent")
    }
}

/// Daily closes and volumes, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceHistory {
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StrongUp,
    Up,
    Neutral,
    Down,
    StrongDown,
    Undetermined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub trend: Trend,
    pub momentum_score: i32,
    pub rsi: Option<f64>,
    pub signals: Vec<String>,
    pub provenance: Provenance,
}

impl Default for TechnicalSnapshot {
    fn default() -> Self {
        Self {
            trend: Trend::Undetermined,
            momentum_score: 0,
            rsi: None,
            signals: Vec::new(),
            provenance: Provenance::default(),
        }
    }
}

/// The fused view of one token across all providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompositeTokenRecord {
    pub token: Option<ResolvedToken>,
    pub market: MarketData,
    pub social: SocialData,
    pub defi: DefiData,
    pub sentiment: SentimentIndex,
    pub technical: TechnicalSnapshot,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_case_insensitive() {
        assert_eq!(TokenQuery::new("  BTC "), TokenQuery::new("btc"));
        assert!(TokenQuery::new("   ").is_empty());
    }

    #[test]
    fn test_default_record_is_all_absent() {
        let record = CompositeTokenRecord::default();
        assert!(record.market.provenance.is_absent());
        assert!(record.social.provenance.is_absent());
        assert!(record.defi.provenance.is_absent());
        assert!(record.sentiment.provenance.is_absent());
        assert!(record.technical.provenance.is_absent());
        assert_eq!(record.sentiment.value, 50);

        let json = serde_json::to_value(&record).unwrap();
        for key in ["token", "market", "social", "defi", "sentiment", "technical"] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
    }

    #[test]
    fn test_market_mood_bands() {
        assert_eq!(MarketMood::from_index(10), MarketMood::ExtremeFear);
        assert_eq!(MarketMood::from_index(25), MarketMood::Fear);
        assert_eq!(MarketMood::from_index(50), MarketMood::Neutral);
        assert_eq!(MarketMood::from_index(74), MarketMood::Greed);
        assert_eq!(MarketMood::from_index(90), MarketMood::ExtremeGreed);
    }
}
