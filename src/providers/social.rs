use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ApiClient, CacheCategory, CacheKey, CacheStore, FallbackChain, FetchStrategy,
    MarketDataClient, Provider, ProviderResult,
};
use crate::config::Config;
use crate::error::{Result, TokenSeerError};
use crate::models::{MarketData, ResolvedToken, SocialData};

fn pct_change(previous: f64, current: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// LunarCrush v4
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LunarResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LunarCoin {
    galaxy_score: Option<f64>,
    social_volume: Option<f64>,
    social_engagement: Option<f64>,
    social_contributors: Option<f64>,
    social_dominance: Option<f64>,
    tweets: Option<f64>,
    reddit_posts: Option<f64>,
    news: Option<f64>,
    // Either {"bullish": x, "bearish": y} or a single percent-positive number
    sentiment: Option<Value>,
    social_volume_24h_change: Option<f64>,
    galaxy_score_24h_change: Option<f64>,
    alt_rank: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LunarPoint {
    contributors_active: Option<f64>,
    interactions: Option<f64>,
}

fn lunar_sentiment(raw: Option<&Value>) -> (f64, f64) {
    match raw {
        Some(Value::Object(map)) => {
            let bullish = map.get("bullish").and_then(Value::as_f64).unwrap_or(50.0);
            let bearish = map
                .get("bearish")
                .and_then(Value::as_f64)
                .unwrap_or(100.0 - bullish);
            (bullish, bearish)
        }
        Some(Value::Number(n)) => {
            let bullish = n.as_f64().unwrap_or(50.0).clamp(0.0, 100.0);
            (bullish, 100.0 - bullish)
        }
        _ => (50.0, 50.0),
    }
}

fn social_from_lunar(coin: &LunarCoin) -> SocialData {
    let (bullish, bearish) = lunar_sentiment(coin.sentiment.as_ref());
    SocialData {
        galaxy_score: coin.galaxy_score.unwrap_or(0.0),
        social_volume: coin.social_volume.unwrap_or(0.0),
        social_engagement: coin.social_engagement.unwrap_or(0.0),
        social_contributors: coin.social_contributors.unwrap_or(0.0),
        social_dominance: coin.social_dominance.unwrap_or(0.0),
        tweets: coin.tweets.unwrap_or(0.0) as u64,
        reddit_posts: coin.reddit_posts.unwrap_or(0.0) as u64,
        news_articles: coin.news.unwrap_or(0.0) as u64,
        sentiment_bullish: bullish,
        sentiment_bearish: bearish,
        social_volume_change: coin.social_volume_24h_change.unwrap_or(0.0),
        galaxy_score_change: coin.galaxy_score_24h_change.unwrap_or(0.0),
        alt_rank: coin.alt_rank,
        ..SocialData::limited("lunarcrush_v4")
    }
}

fn apply_time_series(social: &mut SocialData, points: &[LunarPoint]) {
    social.history_7d = points
        .iter()
        .filter_map(|p| p.contributors_active)
        .collect();

    let interactions: Vec<f64> = points.iter().filter_map(|p| p.interactions).collect();
    if let [.., previous, current] = interactions.as_slice() {
        social.engagement_change = pct_change(*previous, *current);
    }
}

struct LunarCrushApi {
    http: Arc<ApiClient>,
    base_url: String,
    api_key: String,
}

struct LunarCrushV4(Arc<LunarCrushApi>);

impl LunarCrushV4 {
    async fn time_series(&self, symbol: &str) -> Result<Vec<LunarPoint>> {
        let api = &self.0;
        let url = format!("{}/public/coins/{}/time-series/v2", api.base_url, symbol);
        let response: LunarResponse<LunarPoint> = api
            .http
            .get_json(
                Provider::LunarCrush,
                &url,
                &[("bucket", "day".to_string()), ("interval", "1w".to_string())],
                &[("Authorization", format!("Bearer {}", api.api_key))],
            )
            .await?;
        Ok(response.data)
    }
}

#[async_trait]
impl FetchStrategy<ResolvedToken, SocialData> for LunarCrushV4 {
    fn name(&self) -> &'static str {
        "lunarcrush_v4"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<SocialData> {
        let api = &self.0;
        let symbol = token.symbol.to_uppercase();
        let response: LunarResponse<LunarCoin> = api
            .http
            .get_json(
                Provider::LunarCrush,
                &format!("{}/public/coins", api.base_url),
                &[
                    ("symbols", symbol.clone()),
                    ("interval", "1d".to_string()),
                    ("days", "7".to_string()),
                ],
                &[("Authorization", format!("Bearer {}", api.api_key))],
            )
            .await?;

        let coin = response
            .data
            .first()
            .ok_or_else(|| TokenSeerError::not_found(format!("LunarCrush has no {}", symbol)))?;
        let mut social = social_from_lunar(coin);

        match self.time_series(&symbol).await {
            Ok(points) => apply_time_series(&mut social, &points),
            Err(e) => debug!("LunarCrush time series for {} unavailable: {}", symbol, e),
        }

        Ok(social)
    }
}

/// Holds LunarCrush's slot at the head of the chain when no key is set, so
/// the first real source is reported as a fallback. Never touches the network.
struct LunarCrushDisabled;

#[async_trait]
impl FetchStrategy<ResolvedToken, SocialData> for LunarCrushDisabled {
    fn name(&self) -> &'static str {
        "lunarcrush_disabled"
    }

    async fn fetch(&self, _token: &ResolvedToken) -> Result<SocialData> {
        Err(TokenSeerError::Unauthorized(
            "no LunarCrush API key configured".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// CryptoCompare
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CcEnvelope<T> {
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Data")]
    data: Option<T>,
}

impl<T> CcEnvelope<T> {
    fn into_data(self, what: &str) -> Result<T> {
        if self.response.as_deref() == Some("Error") {
            let message = self.message.unwrap_or_default();
            let lowered = message.to_lowercase();
            if lowered.contains("api key") || lowered.contains("subscription") {
                return Err(TokenSeerError::PaidTier(message));
            }
            return Err(TokenSeerError::Status {
                code: 200,
                body: message,
            });
        }
        self.data
            .ok_or_else(|| TokenSeerError::malformed(format!("CryptoCompare {} has no Data", what)))
    }
}

#[derive(Debug, Deserialize)]
struct CcCoin {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CcPoints {
    #[serde(rename = "Points")]
    points: Option<f64>,
    statuses: Option<f64>,
    active_users: Option<f64>,
    posts_per_day: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CcSocial {
    #[serde(rename = "General")]
    general: CcPoints,
    #[serde(rename = "Twitter")]
    twitter: CcPoints,
    #[serde(rename = "Reddit")]
    reddit: CcPoints,
}

fn social_from_cryptocompare(data: &CcSocial) -> Result<SocialData> {
    let volume = data.general.points.unwrap_or(0.0);
    if volume <= 0.0 {
        return Err(TokenSeerError::malformed("CryptoCompare reports no social volume"));
    }

    Ok(SocialData {
        social_volume: volume,
        social_engagement: data.twitter.points.unwrap_or(0.0),
        social_contributors: data.reddit.active_users.unwrap_or(0.0),
        tweets: data.twitter.statuses.unwrap_or(0.0) as u64,
        reddit_posts: data.reddit.posts_per_day.unwrap_or(0.0) as u64,
        ..SocialData::limited("cryptocompare")
    })
}

struct CryptoCompare {
    http: Arc<ApiClient>,
    cache: Arc<CacheStore>,
    base_url: String,
    api_key: Option<String>,
}

impl CryptoCompare {
    fn headers(&self) -> Vec<(&'static str, String)> {
        self.api_key
            .iter()
            .map(|key| ("authorization", format!("Apikey {}", key)))
            .collect()
    }

    async fn lookup_id(&self, symbol: &str) -> Result<String> {
        let envelope: CcEnvelope<HashMap<String, CcCoin>> = self
            .http
            .get_json(
                Provider::CryptoCompare,
                &format!("{}/all/coinlist", self.base_url),
                &[("fsym", symbol.to_string())],
                &self.headers(),
            )
            .await?;

        envelope
            .into_data("coinlist")?
            .into_iter()
            .find(|(sym, _)| sym.eq_ignore_ascii_case(symbol))
            .map(|(_, coin)| coin.id)
            .ok_or_else(|| TokenSeerError::not_found(format!("CryptoCompare has no {}", symbol)))
    }

    /// Numeric CryptoCompare id for a symbol, cached like any other lookup.
    async fn coin_id(&self, symbol: &str) -> Result<String> {
        let key = CacheKey::new(Provider::CryptoCompare, "coinlist", symbol);
        let result = self
            .cache
            .get_or_fetch(key, CacheCategory::Fundamental, || async {
                match self.lookup_id(symbol).await {
                    Ok(id) => ProviderResult::Success {
                        payload: id,
                        fetched_at: Utc::now(),
                    },
                    Err(e) => ProviderResult::failure(e.to_string()),
                }
            })
            .await;

        match result.into_parts() {
            (Some(id), _) => Ok(id),
            (None, reason) => Err(TokenSeerError::not_found(reason.unwrap_or_default())),
        }
    }
}

#[async_trait]
impl FetchStrategy<ResolvedToken, SocialData> for CryptoCompare {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<SocialData> {
        let symbol = token.symbol.to_uppercase();
        let coin_id = self.coin_id(&symbol).await?;

        let envelope: CcEnvelope<CcSocial> = self
            .http
            .get_json(
                Provider::CryptoCompare,
                &format!("{}/social/coin/latest", self.base_url),
                &[("coinId", coin_id)],
                &self.headers(),
            )
            .await?;

        social_from_cryptocompare(&envelope.into_data("social stats")?)
    }
}

// ---------------------------------------------------------------------------
// CoinGecko community data
// ---------------------------------------------------------------------------

/// Rough social proxy from community sizes on the market record.
pub fn social_from_community(market: &MarketData) -> Result<SocialData> {
    let followers = market.twitter_followers.unwrap_or(0);
    let subscribers = market.reddit_subscribers.unwrap_or(0);
    if followers == 0 && subscribers == 0 {
        return Err(TokenSeerError::malformed(format!(
            "no community data for {}",
            market.id
        )));
    }

    Ok(SocialData {
        social_volume: (followers / 1000) as f64,
        social_engagement: (subscribers / 100) as f64,
        social_volume_change: market.price_change_24h.clamp(-50.0, 50.0),
        alt_rank: market.market_cap_rank,
        ..SocialData::limited("coingecko_community")
    })
}

struct CoinGeckoCommunity(Arc<MarketDataClient>);

#[async_trait]
impl FetchStrategy<ResolvedToken, SocialData> for CoinGeckoCommunity {
    fn name(&self) -> &'static str {
        "coingecko_community"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<SocialData> {
        // Served from the market cache when the market fetch already ran
        match self.0.fetch(token).await.into_parts() {
            (Some(market), _) => social_from_community(&market),
            (None, reason) => Err(TokenSeerError::network_error(
                reason.unwrap_or_else(|| "market data unavailable".to_string()),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SocialDataClient {
    chain: FallbackChain<ResolvedToken, SocialData>,
    cache: Arc<CacheStore>,
    primary: Provider,
}

impl SocialDataClient {
    /// LunarCrush is called only when a key is configured. Without one its
    /// slot fails locally, so CryptoCompare data is tagged degraded and no
    /// unauthenticated call is made.
    pub fn new(
        config: &Config,
        http: Arc<ApiClient>,
        cache: Arc<CacheStore>,
        market: Arc<MarketDataClient>,
    ) -> Self {
        let mut chain = FallbackChain::new("social");
        let mut primary = Provider::CryptoCompare;

        if let Some(key) = &config.lunarcrush_api_key {
            chain = chain.with_strategy(LunarCrushV4(Arc::new(LunarCrushApi {
                http: http.clone(),
                base_url: config.lunarcrush_url.trim_end_matches('/').to_string(),
                api_key: key.clone(),
            })));
            primary = Provider::LunarCrush;
        } else {
            info!("LunarCrush disabled (no API key), social data starts at CryptoCompare");
            chain = chain.with_strategy(LunarCrushDisabled);
        }

        let chain = chain
            .with_strategy(CryptoCompare {
                http,
                cache: cache.clone(),
                base_url: config.cryptocompare_url.trim_end_matches('/').to_string(),
                api_key: config.cryptocompare_api_key.clone(),
            })
            .with_strategy(CoinGeckoCommunity(market))
            .with_default("limited", |_| SocialData::limited("limited"));

        Self::from_parts(chain, cache, primary)
    }

    pub fn from_parts(
        chain: FallbackChain<ResolvedToken, SocialData>,
        cache: Arc<CacheStore>,
        primary: Provider,
    ) -> Self {
        Self {
            chain,
            cache,
            primary,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.chain.strategy_names()
    }

    pub async fn fetch(&self, token: &ResolvedToken) -> ProviderResult<SocialData> {
        let key = CacheKey::new(self.primary, "social", &token.symbol);
        self.cache
            .get_or_fetch(key, CacheCategory::Social, || self.chain.run(token))
            .await
    }
}
