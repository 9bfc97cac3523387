use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{
    ApiClient, CacheCategory, CacheKey, CacheStore, FallbackChain, FetchStrategy, Provider,
    ProviderResult, Sourced,
};
use crate::config::Config;
use crate::error::{Result, TokenSeerError};
use crate::models::{DefiData, Provenance, ResolvedToken};

/// One row of DeFiLlama's protocol listing, trimmed to what we use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolListing {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub gecko_id: Option<String>,
    #[serde(default)]
    pub tvl: Option<f64>,
    #[serde(default)]
    pub mcap: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub change_7d: Option<f64>,
}

impl Sourced for ProtocolListing {
    fn stamp(&mut self, _provenance: Provenance) {}
}

fn mcap_to_tvl(mcap: Option<f64>, tvl: f64) -> Option<f64> {
    match mcap {
        Some(mcap) if mcap > 0.0 && tvl > 0.0 => Some(mcap / tvl),
        _ => None,
    }
}

/// Protocol for a market token: CoinGecko id match first, then the
/// largest protocol sharing the symbol.
fn match_protocol(token: &ResolvedToken, listings: Vec<ProtocolListing>) -> Option<ProtocolListing> {
    if let Some(found) = listings
        .iter()
        .find(|p| p.gecko_id.as_deref() == Some(token.id.as_str()))
    {
        return Some(found.clone());
    }

    listings
        .into_iter()
        .filter(|p| {
            p.symbol
                .as_deref()
                .map_or(false, |s| s.eq_ignore_ascii_case(&token.symbol))
        })
        .max_by(|a, b| {
            a.tvl
                .unwrap_or(0.0)
                .partial_cmp(&b.tvl.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn defi_from_listing(listing: &ProtocolListing, tvl: f64) -> DefiData {
    DefiData {
        protocol: Some(listing.name.clone()),
        tvl_usd: tvl,
        tvl_change_7d: listing.change_7d,
        mcap_to_tvl: mcap_to_tvl(listing.mcap, tvl),
        category: listing.category.clone(),
        chains: listing.chains.clone(),
        ..DefiData::default()
    }
}

#[derive(Debug, Deserialize)]
struct TvlPoint {
    #[serde(rename = "totalLiquidityUSD")]
    total_liquidity_usd: f64,
}

#[derive(Debug, Deserialize)]
struct ProtocolDetail {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    chains: Vec<String>,
    #[serde(default)]
    mcap: Option<f64>,
    #[serde(default)]
    tvl: Vec<TvlPoint>,
    #[serde(rename = "currentChainTvls", default)]
    current_chain_tvls: HashMap<String, f64>,
}

fn defi_from_detail(detail: ProtocolDetail, listing: &ProtocolListing) -> Result<DefiData> {
    let current = detail
        .tvl
        .last()
        .map(|p| p.total_liquidity_usd)
        .ok_or_else(|| TokenSeerError::malformed(format!("no TVL series for {}", detail.name)))?;

    // Daily series: the point seven entries back is a week ago
    let change_7d = detail
        .tvl
        .len()
        .checked_sub(8)
        .map(|idx| detail.tvl[idx].total_liquidity_usd)
        .filter(|week_ago| *week_ago > 0.0)
        .map(|week_ago| (current - week_ago) / week_ago * 100.0)
        .or(listing.change_7d);

    let mut chains = detail.chains;
    if chains.is_empty() {
        // Sub-ledgers such as "Ethereum-borrowed" or "staking" are not chains
        chains = detail
            .current_chain_tvls
            .keys()
            .filter(|k| !k.contains('-') && k.as_str() != "staking" && k.as_str() != "pool2")
            .cloned()
            .collect();
        chains.sort();
    }

    Ok(DefiData {
        protocol: Some(detail.name),
        tvl_usd: current,
        tvl_change_7d: change_7d,
        mcap_to_tvl: mcap_to_tvl(detail.mcap.or(listing.mcap), current),
        category: detail.category.or_else(|| listing.category.clone()),
        chains,
        ..DefiData::default()
    })
}

struct DefiLlamaApi {
    http: Arc<ApiClient>,
    base_url: String,
}

impl DefiLlamaApi {
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.http.get_json(Provider::DefiLlama, &url, &[], &[]).await
    }
}

struct DefiLlamaProtocols(Arc<DefiLlamaApi>);

#[async_trait]
impl FetchStrategy<ResolvedToken, ProtocolListing> for DefiLlamaProtocols {
    fn name(&self) -> &'static str {
        "defillama_protocols"
    }

    async fn fetch(&self, token: &ResolvedToken) -> Result<ProtocolListing> {
        let listings: Vec<ProtocolListing> = self.0.get("/protocols").await?;
        debug!("DeFiLlama lists {} protocols", listings.len());

        match_protocol(token, listings).ok_or_else(|| {
            TokenSeerError::not_found(format!("{} is not a tracked DeFi protocol", token.id))
        })
    }
}

struct DefiLlamaProtocol(Arc<DefiLlamaApi>);

#[async_trait]
impl FetchStrategy<ProtocolListing, DefiData> for DefiLlamaProtocol {
    fn name(&self) -> &'static str {
        "defillama_protocol"
    }

    async fn fetch(&self, listing: &ProtocolListing) -> Result<DefiData> {
        let detail: ProtocolDetail = self.0.get(&format!("/protocol/{}", listing.slug)).await?;
        defi_from_detail(detail, listing)
    }
}

struct DefiLlamaTvl(Arc<DefiLlamaApi>);

#[async_trait]
impl FetchStrategy<ProtocolListing, DefiData> for DefiLlamaTvl {
    fn name(&self) -> &'static str {
        "defillama_tvl"
    }

    async fn fetch(&self, listing: &ProtocolListing) -> Result<DefiData> {
        let tvl: f64 = self.0.get(&format!("/tvl/{}", listing.slug)).await?;
        Ok(defi_from_listing(listing, tvl))
    }
}

/// Last resort: the figures already carried by the protocol listing.
struct DefiLlamaListing;

#[async_trait]
impl FetchStrategy<ProtocolListing, DefiData> for DefiLlamaListing {
    fn name(&self) -> &'static str {
        "defillama_listing"
    }

    async fn fetch(&self, listing: &ProtocolListing) -> Result<DefiData> {
        let tvl = listing
            .tvl
            .ok_or_else(|| TokenSeerError::malformed(format!("listing for {} has no TVL", listing.slug)))?;
        Ok(defi_from_listing(listing, tvl))
    }
}

pub struct DefiClient {
    resolver: FallbackChain<ResolvedToken, ProtocolListing>,
    chain: FallbackChain<ProtocolListing, DefiData>,
    cache: Arc<CacheStore>,
}

impl DefiClient {
    pub fn new(config: &Config, http: Arc<ApiClient>, cache: Arc<CacheStore>) -> Self {
        let api = Arc::new(DefiLlamaApi {
            http,
            base_url: config.defillama_url.trim_end_matches('/').to_string(),
        });

        let resolver =
            FallbackChain::new("defi_resolve").with_strategy(DefiLlamaProtocols(api.clone()));
        let chain = FallbackChain::new("defi")
            .with_strategy(DefiLlamaProtocol(api.clone()))
            .with_strategy(DefiLlamaTvl(api))
            .with_strategy(DefiLlamaListing);

        Self::from_parts(resolver, chain, cache)
    }

    pub fn from_parts(
        resolver: FallbackChain<ResolvedToken, ProtocolListing>,
        chain: FallbackChain<ProtocolListing, DefiData>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            resolver,
            chain,
            cache,
        }
    }

    pub async fn resolve(&self, token: &ResolvedToken) -> ProviderResult<ProtocolListing> {
        let key = CacheKey::new(Provider::DefiLlama, "protocol_match", &token.id);
        self.cache
            .get_or_fetch(key, CacheCategory::Defi, || self.resolver.run(token))
            .await
    }

    /// DeFi metrics for `token`. Tokens that are not protocols yield a
    /// `Failure`, which the record shows as absent DeFi data.
    pub async fn fetch(&self, token: &ResolvedToken) -> ProviderResult<DefiData> {
        let listing = match self.resolve(token).await.into_parts() {
            (Some(listing), _) => listing,
            (None, reason) => {
                return ProviderResult::failure(
                    reason.unwrap_or_else(|| format!("{} is not a DeFi protocol", token.id)),
                )
            }
        };

        let key = CacheKey::new(Provider::DefiLlama, "protocol", &listing.slug);
        self.cache
            .get_or_fetch(key, CacheCategory::Defi, || self.chain.run(&listing))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheTtls;
    use crate::models::DataStatus;
    use crate::providers::testing::StubStrategy;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn aave_token() -> ResolvedToken {
        ResolvedToken {
            id: "aave".to_string(),
            symbol: "AAVE".to_string(),
            name: "Aave".to_string(),
        }
    }

    fn listing(slug: &str, symbol: &str, gecko_id: Option<&str>, tvl: f64) -> ProtocolListing {
        ProtocolListing {
            name: slug.to_string(),
            slug: slug.to_string(),
            symbol: Some(symbol.to_string()),
            gecko_id: gecko_id.map(str::to_string),
            tvl: Some(tvl),
            mcap: Some(2.0e9),
            category: Some("Lending".to_string()),
            chains: vec!["Ethereum".to_string()],
            change_7d: Some(-3.0),
        }
    }

    #[test]
    fn test_match_prefers_gecko_id_then_largest_symbol() {
        let listings = vec![
            listing("aave-v2", "AAVE", None, 5e9),
            listing("aave-v3", "AAVE", None, 9e9),
            listing("aave", "AAVE", Some("aave"), 1e9),
        ];
        assert_eq!(match_protocol(&aave_token(), listings.clone()).unwrap().slug, "aave");

        let without_id: Vec<_> = listings.into_iter().filter(|l| l.gecko_id.is_none()).collect();
        assert_eq!(match_protocol(&aave_token(), without_id).unwrap().slug, "aave-v3");

        assert!(match_protocol(&aave_token(), vec![listing("uni", "UNI", None, 1.0)]).is_none());
    }

    #[test]
    fn test_protocol_detail_mapping() {
        let mut series: Vec<serde_json::Value> = (0..10)
            .map(|i| json!({"date": i, "totalLiquidityUSD": 100.0}))
            .collect();
        series.push(json!({"date": 10, "totalLiquidityUSD": 110.0}));

        let detail: ProtocolDetail = serde_json::from_value(json!({
            "name": "Aave",
            "category": "Lending",
            "mcap": 220.0,
            "tvl": series,
            "currentChainTvls": {"Ethereum": 90.0, "Ethereum-borrowed": 40.0, "Polygon": 20.0}
        }))
        .unwrap();

        let defi = defi_from_detail(detail, &listing("aave", "AAVE", Some("aave"), 1.0)).unwrap();
        assert_eq!(defi.tvl_usd, 110.0);
        assert_eq!(defi.tvl_change_7d, Some(10.0));
        assert_eq!(defi.mcap_to_tvl, Some(2.0));
        assert_eq!(defi.chains, vec!["Ethereum", "Polygon"]);
    }

    #[test]
    fn test_mcap_to_tvl_needs_both_sides() {
        assert_eq!(mcap_to_tvl(None, 10.0), None);
        assert_eq!(mcap_to_tvl(Some(10.0), 0.0), None);
        assert_eq!(mcap_to_tvl(Some(30.0), 10.0), Some(3.0));
    }

    #[tokio::test]
    async fn test_non_protocol_token_fails_and_is_cached() {
        let protocols = StubStrategy::<ProtocolListing>::failing("defillama_protocols");
        let calls = protocols.counter();
        let client = DefiClient::from_parts(
            FallbackChain::new("defi_resolve").with_strategy(protocols),
            FallbackChain::new("defi").with_strategy(DefiLlamaListing),
            Arc::new(CacheStore::new(CacheTtls::default())),
        );

        assert!(client.fetch(&aave_token()).await.is_failure());
        assert!(client.fetch(&aave_token()).await.is_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listing_fallback_needs_no_network() {
        let client = DefiClient::from_parts(
            FallbackChain::new("defi_resolve").with_strategy(StubStrategy::ok(
                "defillama_protocols",
                listing("aave", "AAVE", Some("aave"), 1.0e9),
            )),
            FallbackChain::new("defi")
                .with_strategy(StubStrategy::<DefiData>::failing("defillama_protocol"))
                .with_strategy(StubStrategy::<DefiData>::failing("defillama_tvl"))
                .with_strategy(DefiLlamaListing),
            Arc::new(CacheStore::new(CacheTtls::default())),
        );

        let result = client.fetch(&aave_token()).await;
        let defi = result.payload().unwrap();
        assert_eq!(defi.tvl_usd, 1.0e9);
        assert_eq!(defi.mcap_to_tvl, Some(2.0));
        assert_eq!(defi.provenance.source, "defillama_listing");
        assert_eq!(defi.provenance.status, DataStatus::Degraded);
    }
}
