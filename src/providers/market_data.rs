use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    ApiClient, CacheCategory, CacheKey, CacheStore, FallbackChain, FetchStrategy, Provider,
    ProviderResult,
};
use crate::config::Config;
use crate::error::{Result, TokenSeerError};
use crate::models::{AgeSource, MarketData, PriceHistory, ResolvedToken, TokenQuery};

// Well-known assets resolved without a search call: (id, symbol, name)
const KNOWN_TOKENS: &[(&str, &str, &str)] = &[
    ("bitcoin", "btc", "Bitcoin"),
    ("ethereum", "eth", "Ethereum"),
    ("binancecoin", "bnb", "BNB"),
    ("cardano", "ada", "Cardano"),
    ("solana", "sol", "Solana"),
    ("matic-network", "matic", "Polygon"),
    ("chainlink", "link", "Chainlink"),
    ("polkadot", "dot", "Polkadot"),
    ("avalanche-2", "avax", "Avalanche"),
    ("uniswap", "uni", "Uniswap"),
    ("litecoin", "ltc", "Litecoin"),
    ("dogecoin", "doge", "Dogecoin"),
    ("shiba-inu", "shib", "Shiba Inu"),
    ("arbitrum", "arb", "Arbitrum"),
    ("optimism", "op", "Optimism"),
    ("worldcoin-wld", "wld", "Worldcoin"),
    ("celestia", "tia", "Celestia"),
    ("kaspa", "kas", "Kaspa"),
    ("pendle", "pendle", "Pendle"),
    ("ripple", "xrp", "XRP"),
    ("stellar", "xlm", "Stellar"),
    ("cosmos", "atom", "Cosmos Hub"),
    ("algorand", "algo", "Algorand"),
    ("tezos", "xtz", "Tezos"),
    ("monero", "xmr", "Monero"),
];

pub fn known_token(query: &str) -> Option<ResolvedToken> {
    KNOWN_TOKENS
        .iter()
        .find(|(id, symbol, name)| {
            query == *id || query == *symbol || query.eq_ignore_ascii_case(name)
        })
        .map(|(id, symbol, name)| ResolvedToken {
            id: id.to_string(),
            symbol: symbol.to_uppercase(),
            name: name.to_string(),
        })
}

/// Rough listing age from size and rank, used when neither a genesis date
/// nor a price history is available.
pub fn estimate_age_days(rank: Option<u32>, market_cap: f64) -> u32 {
    let rank = rank.unwrap_or(u32::MAX);
    if rank <= 50 && market_cap > 1_000_000_000.0 {
        1500
    } else if rank <= 100 && market_cap > 500_000_000.0 {
        1000
    } else if rank <= 300 && market_cap > 100_000_000.0 {
        730
    } else if market_cap > 10_000_000.0 {
        365
    } else if market_cap > 1_000_000.0 {
        200
    } else {
        90
    }
}

fn days_since_date(date: &str) -> Option<u32> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let days = (Utc::now().date_naive() - date).num_days();
    u32::try_from(days.max(0)).ok()
}

fn days_since_millis(ts_ms: f64) -> Option<u32> {
    let then = Utc.timestamp_millis_opt(ts_ms as i64).single()?;
    let days = (Utc::now() - then).num_days();
    u32::try_from(days.max(0)).ok()
}

fn params(pairs: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
    pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    id: String,
    symbol: String,
    name: String,
    market_cap_rank: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CoinIdentity {
    id: String,
    symbol: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usd {
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CoinMarketData {
    current_price: Option<Usd>,
    market_cap: Option<Usd>,
    total_volume: Option<Usd>,
    ath: Option<Usd>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d: Option<f64>,
    price_change_percentage_30d: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CommunityData {
    twitter_followers: Option<f64>,
    reddit_subscribers: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeveloperData {
    stars: Option<f64>,
    commit_count_4_weeks: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CoinDetail {
    id: String,
    symbol: String,
    name: String,
    categories: Option<Vec<Option<String>>>,
    genesis_date: Option<String>,
    market_cap_rank: Option<u32>,
    market_data: Option<CoinMarketData>,
    community_data: Option<CommunityData>,
    developer_data: Option<DeveloperData>,
}

impl CoinDetail {
    fn into_market(self) -> Result<MarketData> {
        let md = self.market_data.unwrap_or_default();
        let usd = |v: &Option<Usd>| v.as_ref().and_then(|u| u.usd);

        let price = usd(&md.current_price)
            .ok_or_else(|| TokenSeerError::malformed(format!("{} has no USD price", self.id)))?;
        let community = self.community_data.unwrap_or_default();
        let developer = self.developer_data.unwrap_or_default();

        Ok(MarketData {
            id: self.id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            price_usd: price,
            market_cap_usd: usd(&md.market_cap).unwrap_or(0.0),
            volume_24h_usd: usd(&md.total_volume).unwrap_or(0.0),
            price_change_24h: md.price_change_percentage_24h.unwrap_or(0.0),
            price_change_7d: md.price_change_percentage_7d,
            price_change_30d: md.price_change_percentage_30d,
            market_cap_rank: self.market_cap_rank,
            ath_usd: usd(&md.ath),
            categories: self
                .categories
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .collect(),
            twitter_followers: community.twitter_followers.map(|v| v as u64),
            reddit_subscribers: community.reddit_subscribers.map(|v| v as u64),
            github_commits_4w: developer.commit_count_4_weeks.map(|v| v as u64),
            github_stars: developer.stars.map(|v| v as u64),
            ..MarketData::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    price_change_percentage_30d_in_currency: Option<f64>,
    ath: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<[f64; 2]>,
    #[serde(default)]
    total_volumes: Vec<[f64; 2]>,
}

fn pick_search_hit(query: &str, hits: Vec<SearchHit>) -> Option<SearchHit> {
    let exact_symbol = hits
        .iter()
        .filter(|h| h.symbol.eq_ignore_ascii_case(query))
        .min_by_key(|h| h.market_cap_rank.unwrap_or(u32::MAX))
        .cloned();

    exact_symbol
        .or_else(|| {
            hits.iter()
                .find(|h| h.id == query || h.name.eq_ignore_ascii_case(query))
                .cloned()
        })
        .or_else(|| hits.into_iter().next())
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

struct CoinGeckoApi {
    http: Arc<ApiClient>,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoApi {
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&'static str, String)]) -> Result<T> {
        let headers: Vec<(&str, String)> = self
            .api_key
            .iter()
            .map(|key| ("x-cg-demo-api-key", key.clone()))
            .collect();
        let url = format!("{}{}", self.base_url, path);
        self.http
            .get_json(Provider::CoinGecko, &url, query, &headers)
            .await
    }

    async fn listing_age(
        &self,
        id: &str,
        genesis: Option<&str>,
        rank: Option<u32>,
        market_cap: f64,
    ) -> (u32, AgeSource) {
        if let Some(days) = genesis.and_then(days_since_date) {
            return (days, AgeSource::GenesisDate);
        }

        let chart: Result<MarketChart> = self
            .get(
                &format!("/coins/{}/market_chart", id),
                &params(&[("vs_currency", "usd"), ("days", "max")]),
            )
            .await;
        match chart {
            Ok(chart) => {
                if let Some(days) = chart.prices.first().and_then(|p| days_since_millis(p[0])) {
                    return (days, AgeSource::PriceHistory);
                }
            }
            Err(e) => debug!("Price history for {} unavailable: {}", id, e),
        }

        (estimate_age_days(rank, market_cap), AgeSource::Estimated)
    }
}

struct CoinGeckoSearch(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<TokenQuery, ResolvedToken> for CoinGeckoSearch {
    fn name(&self) -> &'static str {
        "coingecko_search"
    }

    async fn fetch(&self, query: &TokenQuery) -> Result<ResolvedToken> {
        let response: SearchResponse = self
            .0
            .get("/search", &params(&[("query", query.as_str())]))
            .await?;

        let hit = pick_search_hit(query.as_str(), response.coins)
            .ok_or_else(|| TokenSeerError::not_found(format!("no CoinGecko match for {}", query)))?;

        info!("Resolved {} to {}", query, hit.id);
        Ok(ResolvedToken {
            id: hit.id,
            symbol: hit.symbol.to_uppercase(),
            name: hit.name,
        })
    }
}

/// Treats the query as a CoinGecko id and asks for that coin directly.
struct CoinGeckoLookup(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<TokenQuery, ResolvedToken> for CoinGeckoLookup {
    fn name(&self) -> &'static str {
        "coingecko_lookup"
    }

    async fn fetch(&self, query: &TokenQuery) -> Result<ResolvedToken> {
        let coin: CoinIdentity = self
            .0
            .get(
                &format!("/coins/{}", query.as_str()),
                &params(&[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("market_data", "false"),
                    ("community_data", "false"),
                    ("developer_data", "false"),
                ]),
            )
            .await?;

        Ok(ResolvedToken {
            id: coin.id,
            symbol: coin.symbol.to_uppercase(),
            name: coin.name,
        })
    }
}

/// Built-in table of major assets; answers without the network.
pub struct KnownTokens;

#[async_trait]
impl FetchStrategy<TokenQuery, ResolvedToken> for KnownTokens {
    fn name(&self) -> &'static str {
        "known_tokens"
    }

    async fn fetch(&self, query: &TokenQuery) -> Result<ResolvedToken> {
        known_token(query.as_str())
            .ok_or_else(|| TokenSeerError::not_found(format!("{} is not a built-in token", query)))
    }
}

struct CoinGeckoFull(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<ResolvedToken, MarketData> for CoinGeckoFull {
    fn name(&self) -> &'static str {
        "coingecko_full"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<MarketData> {
        let coin: CoinDetail = self
            .0
            .get(
                &format!("/coins/{}", token.id),
                &params(&[
                    ("localization", "false"),
                    ("tickers", "false"),
                    ("market_data", "true"),
                    ("community_data", "true"),
                    ("developer_data", "true"),
                    ("sparkline", "false"),
                ]),
            )
            .await?;

        let genesis = coin.genesis_date.clone();
        let mut market = coin.into_market()?;
        let (age, source) = self
            .0
            .listing_age(
                &market.id,
                genesis.as_deref(),
                market.market_cap_rank,
                market.market_cap_usd,
            )
            .await;
        market.age_days = age;
        market.age_source = source;
        Ok(market)
    }
}

struct CoinGeckoMarkets(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<ResolvedToken, MarketData> for CoinGeckoMarkets {
    fn name(&self) -> &'static str {
        "coingecko_markets"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<MarketData> {
        let rows: Vec<MarketRow> = self
            .0
            .get(
                "/coins/markets",
                &params(&[
                    ("vs_currency", "usd"),
                    ("ids", token.id.as_str()),
                    ("price_change_percentage", "7d,30d"),
                ]),
            )
            .await?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| TokenSeerError::not_found(format!("{} not in markets listing", token.id)))?;
        let price = row
            .current_price
            .ok_or_else(|| TokenSeerError::malformed(format!("{} has no USD price", row.id)))?;

        let mut market = MarketData {
            id: row.id,
            symbol: row.symbol.to_uppercase(),
            name: row.name,
            price_usd: price,
            market_cap_usd: row.market_cap.unwrap_or(0.0),
            volume_24h_usd: row.total_volume.unwrap_or(0.0),
            price_change_24h: row.price_change_percentage_24h.unwrap_or(0.0),
            price_change_7d: row.price_change_percentage_7d_in_currency,
            price_change_30d: row.price_change_percentage_30d_in_currency,
            market_cap_rank: row.market_cap_rank,
            ath_usd: row.ath,
            ..MarketData::default()
        };

        let (age, source) = self
            .0
            .listing_age(&market.id, None, market.market_cap_rank, market.market_cap_usd)
            .await;
        market.age_days = age;
        market.age_source = source;
        Ok(market)
    }
}

struct CoinGeckoSimple(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<ResolvedToken, MarketData> for CoinGeckoSimple {
    fn name(&self) -> &'static str {
        "coingecko_simple"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<MarketData> {
        let mut prices: HashMap<String, SimplePrice> = self
            .0
            .get(
                "/simple/price",
                &params(&[
                    ("ids", token.id.as_str()),
                    ("vs_currencies", "usd"),
                    ("include_market_cap", "true"),
                    ("include_24hr_vol", "true"),
                    ("include_24hr_change", "true"),
                ]),
            )
            .await?;

        let quote = prices
            .remove(&token.id)
            .ok_or_else(|| TokenSeerError::not_found(format!("no simple price for {}", token.id)))?;
        let price = quote
            .usd
            .ok_or_else(|| TokenSeerError::malformed(format!("{} has no USD price", token.id)))?;
        let market_cap = quote.usd_market_cap.unwrap_or(0.0);

        Ok(MarketData {
            id: token.id.clone(),
            symbol: token.symbol.clone(),
            name: token.name.clone(),
            price_usd: price,
            market_cap_usd: market_cap,
            volume_24h_usd: quote.usd_24h_vol.unwrap_or(0.0),
            price_change_24h: quote.usd_24h_change.unwrap_or(0.0),
            age_days: estimate_age_days(None, market_cap),
            age_source: AgeSource::Estimated,
            ..MarketData::default()
        })
    }
}

/// Daily price history window for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub id: String,
    pub days: u32,
}

struct CoinGeckoChart(Arc<CoinGeckoApi>);

#[async_trait]
impl FetchStrategy<HistoryRequest, PriceHistory> for CoinGeckoChart {
    fn name(&self) -> &'static str {
        "coingecko_market_chart"
    }

    async fn fetch(&self, request: &HistoryRequest) -> Result<PriceHistory> {
        let days = request.days.to_string();
        let chart: MarketChart = self
            .0
            .get(
                &format!("/coins/{}/market_chart", request.id),
                &params(&[
                    ("vs_currency", "usd"),
                    ("days", days.as_str()),
                    ("interval", "daily"),
                ]),
            )
            .await?;

        if chart.prices.is_empty() {
            return Err(TokenSeerError::malformed(format!(
                "empty price history for {}",
                request.id
            )));
        }

        Ok(PriceHistory {
            prices: chart.prices.iter().map(|p| p[1]).collect(),
            volumes: chart.total_volumes.iter().map(|v| v[1]).collect(),
            ..PriceHistory::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

const NOT_FOUND: &str = "token not found";
const UNAVAILABLE: &str = "resolution unavailable";

/// Outcome of resolving a free-text identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        token: ResolvedToken,
        note: Option<String>,
    },
    /// Every source answered and none knows the identifier
    NotFound(String),
    /// At least one source could not be reached, so the miss is not definite
    Unavailable(String),
}

impl From<ProviderResult<ResolvedToken>> for Resolution {
    fn from(result: ProviderResult<ResolvedToken>) -> Self {
        match result.into_parts() {
            (Some(token), note) => Self::Found { token, note },
            (None, reason) => {
                let reason = reason.unwrap_or_else(|| NOT_FOUND.to_string());
                if reason.starts_with(UNAVAILABLE) {
                    Self::Unavailable(reason)
                } else {
                    Self::NotFound(reason)
                }
            }
        }
    }
}

fn is_unavailable(result: &ProviderResult<ResolvedToken>) -> bool {
    matches!(result, ProviderResult::Failure { reason } if reason.starts_with(UNAVAILABLE))
}

/// Market data client backed by CoinGecko: identifier resolution, market
/// snapshot and daily history, each cached with the fundamental TTL.
pub struct MarketDataClient {
    resolver: FallbackChain<TokenQuery, ResolvedToken>,
    chain: FallbackChain<ResolvedToken, MarketData>,
    history: FallbackChain<HistoryRequest, PriceHistory>,
    cache: Arc<CacheStore>,
}

impl MarketDataClient {
    pub fn new(config: &Config, http: Arc<ApiClient>, cache: Arc<CacheStore>) -> Self {
        let api = Arc::new(CoinGeckoApi {
            http,
            base_url: config.coingecko_url.trim_end_matches('/').to_string(),
            api_key: config.coingecko_api_key.clone(),
        });

        let resolver = FallbackChain::new("resolve")
            .with_strategy(CoinGeckoSearch(api.clone()))
            .with_strategy(CoinGeckoLookup(api.clone()))
            .with_strategy(KnownTokens);
        let chain = FallbackChain::new("market")
            .with_strategy(CoinGeckoFull(api.clone()))
            .with_strategy(CoinGeckoMarkets(api.clone()))
            .with_strategy(CoinGeckoSimple(api.clone()));
        let history = FallbackChain::new("history").with_strategy(CoinGeckoChart(api));

        Self::from_parts(resolver, chain, history, cache)
    }

    pub fn from_parts(
        resolver: FallbackChain<TokenQuery, ResolvedToken>,
        chain: FallbackChain<ResolvedToken, MarketData>,
        history: FallbackChain<HistoryRequest, PriceHistory>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            resolver,
            chain,
            history,
            cache,
        }
    }

    /// Resolve a free-text identifier to a CoinGecko id: search, then a
    /// direct id lookup, then the built-in table. Only answers and definite
    /// misses are cached; a miss while a source was unreachable is retried
    /// on the next call.
    pub async fn resolve(&self, query: &TokenQuery) -> Resolution {
        if query.is_empty() {
            return Resolution::NotFound(format!("{}: empty identifier", NOT_FOUND));
        }

        let key = CacheKey::new(Provider::CoinGecko, "resolve", query.as_str());
        let result = self
            .cache
            .get_or_fetch_where(
                key,
                CacheCategory::Fundamental,
                || async {
                    let (result, errors) = self.resolver.run_with_errors(query).await;
                    match result {
                        ProviderResult::Failure { reason }
                            if errors.iter().all(TokenSeerError::is_not_found) =>
                        {
                            ProviderResult::failure(format!("{}: {}", NOT_FOUND, reason))
                        }
                        ProviderResult::Failure { reason } => {
                            ProviderResult::failure(format!("{}: {}", UNAVAILABLE, reason))
                        }
                        resolved => resolved,
                    }
                },
                |result| !is_unavailable(result),
            )
            .await;

        let resolution = Resolution::from(result);
        if let Resolution::Found { token, .. } = &resolution {
            debug!("{} resolved to {}", query, token.id);
        }
        resolution
    }

    pub async fn fetch(&self, token: &ResolvedToken) -> ProviderResult<MarketData> {
        let key = CacheKey::new(Provider::CoinGecko, "market", &token.id);
        self.cache
            .get_or_fetch(key, CacheCategory::Fundamental, || self.chain.run(token))
            .await
    }

    pub async fn fetch_history(&self, token: &ResolvedToken, days: u32) -> ProviderResult<PriceHistory> {
        let request = HistoryRequest {
            id: token.id.clone(),
            days,
        };
        let key = CacheKey::new(Provider::CoinGecko, "history", &token.id).with_param("days", days);
        self.cache
            .get_or_fetch(key, CacheCategory::Fundamental, || self.history.run(&request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtls;
    use crate::models::DataStatus;
    use crate::providers::testing::StubStrategy;
    use std::sync::atomic::Ordering;

    fn bitcoin() -> ResolvedToken {
        known_token("btc").unwrap()
    }

    fn market(id: &str, price: f64) -> MarketData {
        MarketData {
            id: id.to_string(),
            price_usd: price,
            ..MarketData::default()
        }
    }

    #[test]
    fn test_known_tokens_resolve_by_symbol_id_or_name() {
        assert_eq!(known_token("btc").unwrap().id, "bitcoin");
        assert_eq!(known_token("bitcoin").unwrap().symbol, "BTC");
        assert_eq!(known_token("polygon").unwrap().id, "matic-network");
        assert_eq!(known_token("avax").unwrap().id, "avalanche-2");
        assert!(known_token("not-a-coin").is_none());
    }

    #[test]
    fn test_age_estimate_tiers() {
        assert_eq!(estimate_age_days(Some(5), 50e9), 1500);
        assert_eq!(estimate_age_days(Some(80), 600e6), 1000);
        assert_eq!(estimate_age_days(Some(250), 150e6), 730);
        assert_eq!(estimate_age_days(None, 20e6), 365);
        assert_eq!(estimate_age_days(None, 2e6), 200);
        assert_eq!(estimate_age_days(None, 50_000.0), 90);
    }

    #[test]
    fn test_coin_detail_maps_to_market_data() {
        let raw = serde_json::json!({
            "id": "chainlink",
            "symbol": "link",
            "name": "Chainlink",
            "categories": ["Oracle", null, "Ethereum Ecosystem"],
            "genesis_date": null,
            "market_cap_rank": 14,
            "market_data": {
                "current_price": {"usd": 14.2},
                "market_cap": {"usd": 8.3e9},
                "total_volume": {"usd": 3.1e8},
                "ath": {"usd": 52.7},
                "price_change_percentage_24h": -1.5,
                "price_change_percentage_7d": 4.0,
                "price_change_percentage_30d": null
            },
            "community_data": {"twitter_followers": 1200000, "reddit_subscribers": 50000.0},
            "developer_data": {"stars": 900, "commit_count_4_weeks": 42}
        });

        let coin: CoinDetail = serde_json::from_value(raw).unwrap();
        let market = coin.into_market().unwrap();

        assert_eq!(market.symbol, "LINK");
        assert_eq!(market.categories, vec!["Oracle", "Ethereum Ecosystem"]);
        assert_eq!(market.market_cap_rank, Some(14));
        assert_eq!(market.price_change_7d, Some(4.0));
        assert_eq!(market.price_change_30d, None);
        assert_eq!(market.twitter_followers, Some(1_200_000));
        assert_eq!(market.github_commits_4w, Some(42));
    }

    #[test]
    fn test_coin_without_price_is_malformed() {
        let coin: CoinDetail =
            serde_json::from_value(serde_json::json!({"id": "x", "symbol": "x", "name": "X"}))
                .unwrap();
        assert!(matches!(coin.into_market(), Err(TokenSeerError::Malformed(_))));
    }

    #[test]
    fn test_search_prefers_exact_symbol_with_best_rank() {
        let hit = |id: &str, symbol: &str, rank: Option<u32>| SearchHit {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_string(),
            market_cap_rank: rank,
        };
        let hits = vec![
            hit("pepe-fork", "PEPEF", Some(900)),
            hit("pepe-clone", "PEPE", Some(3000)),
            hit("pepe", "PEPE", Some(40)),
        ];
        assert_eq!(pick_search_hit("pepe", hits).unwrap().id, "pepe");
        assert!(pick_search_hit("pepe", Vec::new()).is_none());
    }

    #[test]
    fn test_days_since_date() {
        let yesterday = (Utc::now().date_naive() - chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(days_since_date(&yesterday), Some(1));
        assert_eq!(days_since_date("not a date"), None);
    }

    fn resolver_client(resolver: FallbackChain<TokenQuery, ResolvedToken>) -> MarketDataClient {
        MarketDataClient::from_parts(
            resolver,
            FallbackChain::new("market"),
            FallbackChain::new("history"),
            Arc::new(CacheStore::new(CacheTtls::default())),
        )
    }

    #[tokio::test]
    async fn test_definite_miss_is_not_found_and_cached() {
        let search = StubStrategy::<ResolvedToken>::missing("coingecko_search");
        let calls = search.counter();
        let client = resolver_client(
            FallbackChain::new("resolve")
                .with_strategy(search)
                .with_strategy(StubStrategy::<ResolvedToken>::missing("coingecko_lookup"))
                .with_strategy(KnownTokens),
        );

        let query = TokenQuery::new("NoSuchCoin");
        for _ in 0..2 {
            match client.resolve(&query).await {
                Resolution::NotFound(reason) => assert!(reason.starts_with("token not found")),
                other => panic!("expected not found, got {:?}", other),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outage_is_unavailable_and_retried() {
        let search = StubStrategy::<ResolvedToken>::failing("coingecko_search");
        let calls = search.counter();
        let client = resolver_client(
            FallbackChain::new("resolve")
                .with_strategy(search)
                .with_strategy(StubStrategy::<ResolvedToken>::missing("coingecko_lookup"))
                .with_strategy(KnownTokens),
        );

        let query = TokenQuery::new("pepe");
        for _ in 0..2 {
            match client.resolve(&query).await {
                Resolution::Unavailable(reason) => {
                    assert!(reason.starts_with("resolution unavailable"));
                    assert!(reason.contains("coingecko_search failed"));
                }
                other => panic!("expected unavailable, got {:?}", other),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(client.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_direct_lookup_covers_search_outage() {
        let pepe = ResolvedToken {
            id: "pepe".to_string(),
            symbol: "PEPE".to_string(),
            name: "Pepe".to_string(),
        };
        let client = resolver_client(
            FallbackChain::new("resolve")
                .with_strategy(StubStrategy::<ResolvedToken>::failing("coingecko_search"))
                .with_strategy(StubStrategy::ok("coingecko_lookup", pepe.clone()))
                .with_strategy(KnownTokens),
        );

        match client.resolve(&TokenQuery::new("pepe")).await {
            Resolution::Found { token, note } => {
                assert_eq!(token, pepe);
                assert!(note.unwrap().contains("served by coingecko_lookup"));
            }
            other => panic!("expected a token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_known_table_resolves_when_offline() {
        let client = resolver_client(
            FallbackChain::new("resolve")
                .with_strategy(StubStrategy::<ResolvedToken>::failing("coingecko_search"))
                .with_strategy(StubStrategy::<ResolvedToken>::failing("coingecko_lookup"))
                .with_strategy(KnownTokens),
        );

        match client.resolve(&TokenQuery::new("ETH")).await {
            Resolution::Found { token, .. } => assert_eq!(token.id, "ethereum"),
            other => panic!("expected a token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_identifier_is_not_found() {
        let client = resolver_client(FallbackChain::new("resolve").with_strategy(KnownTokens));
        assert!(matches!(
            client.resolve(&TokenQuery::new("  ")).await,
            Resolution::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_market_fetch_falls_back_and_is_cached() {
        let full = StubStrategy::<MarketData>::failing("coingecko_full");
        let markets = StubStrategy::ok("coingecko_markets", market("bitcoin", 65_000.0));
        let markets_calls = markets.counter();
        let client = MarketDataClient::from_parts(
            FallbackChain::new("resolve"),
            FallbackChain::new("market")
                .with_strategy(full)
                .with_strategy(markets),
            FallbackChain::new("history"),
            Arc::new(CacheStore::new(CacheTtls::default())),
        );

        let first = client.fetch(&bitcoin()).await;
        let second = client.fetch(&bitcoin()).await;

        assert_eq!(first, second);
        assert_eq!(markets_calls.load(Ordering::SeqCst), 1);
        let data = first.payload().unwrap();
        assert_eq!(data.provenance.source, "coingecko_markets");
        assert_eq!(data.provenance.status, DataStatus::Degraded);
    }

    #[tokio::test]
    async fn test_history_windows_are_cached_separately() {
        let chart = StubStrategy::ok(
            "coingecko_market_chart",
            PriceHistory {
                prices: vec![1.0, 2.0],
                ..PriceHistory::default()
            },
        );
        let calls = chart.counter();
        let client = MarketDataClient::from_parts(
            FallbackChain::new("resolve"),
            FallbackChain::new("market"),
            FallbackChain::new("history").with_strategy(chart),
            Arc::new(CacheStore::new(CacheTtls::default())),
        );

        client.fetch_history(&bitcoin(), 90).await;
        client.fetch_history(&bitcoin(), 90).await;
        client.fetch_history(&bitcoin(), 30).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
