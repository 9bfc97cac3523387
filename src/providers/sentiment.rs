use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{
    ApiClient, CacheCategory, CacheKey, CacheStore, FallbackChain, FetchStrategy, Provider,
    ProviderResult,
};
use crate::config::Config;
use crate::error::{Result, TokenSeerError};
use crate::models::{MarketMood, SentimentIndex};

#[derive(Debug, Deserialize)]
struct FngResponse {
    #[serde(default)]
    data: Vec<FngReading>,
}

#[derive(Debug, Deserialize)]
struct FngReading {
    // alternative.me sends the index as a string
    value: String,
    value_classification: Option<String>,
}

fn index_from_reading(reading: &FngReading) -> Result<SentimentIndex> {
    let value: u8 = reading
        .value
        .trim()
        .parse()
        .map_err(|_| TokenSeerError::malformed(format!("fear & greed value {:?}", reading.value)))?;
    if value > 100 {
        return Err(TokenSeerError::malformed(format!(
            "fear & greed value {} out of range",
            value
        )));
    }

    let mood = MarketMood::from_index(value);
    Ok(SentimentIndex {
        value,
        classification: reading
            .value_classification
            .clone()
            .unwrap_or_else(|| format!("{:?}", mood)),
        mood,
        ..SentimentIndex::default()
    })
}

struct AlternativeMe {
    http: Arc<ApiClient>,
    url: String,
}

#[async_trait]
impl FetchStrategy<str, SentimentIndex> for AlternativeMe {
    fn name(&self) -> &'static str {
        "alternative_me"
    }

    async fn fetch(&self, _query: &str) -> Result<SentimentIndex> {
        let response: FngResponse = self
            .http
            .get_json(
                Provider::AlternativeMe,
                &self.url,
                &[("limit", "1".to_string())],
                &[],
            )
            .await?;

        let reading = response
            .data
            .first()
            .ok_or_else(|| TokenSeerError::malformed("empty fear & greed response"))?;
        index_from_reading(reading)
    }
}

/// Market-wide Fear & Greed index. Falls back to a neutral 50 reading.
pub struct SentimentClient {
    chain: FallbackChain<str, SentimentIndex>,
    cache: Arc<CacheStore>,
}

impl SentimentClient {
    pub fn new(config: &Config, http: Arc<ApiClient>, cache: Arc<CacheStore>) -> Self {
        let chain = FallbackChain::new("sentiment")
            .with_strategy(AlternativeMe {
                http,
                url: config.fear_greed_url.clone(),
            })
            .with_default("neutral_default", |_| SentimentIndex::neutral("neutral_default"));

        Self::from_parts(chain, cache)
    }

    pub fn from_parts(chain: FallbackChain<str, SentimentIndex>, cache: Arc<CacheStore>) -> Self {
        Self { chain, cache }
    }

    pub async fn fetch(&self) -> ProviderResult<SentimentIndex> {
        let key = CacheKey::new(Provider::AlternativeMe, "fng", "latest").with_param("limit", 1);
        self.cache
            .get_or_fetch(key, CacheCategory::Default, || self.chain.run("latest"))
            .await
    }
}
