pub mod cache;
pub mod defi;
pub mod http;
pub mod market_data;
pub mod rate_limiter;
pub mod sentiment;
pub mod social;

pub use cache::{CacheCategory, CacheEntry, CacheKey, CacheStore};
pub use defi::DefiClient;
pub use http::ApiClient;
pub use market_data::MarketDataClient;
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
pub use sentiment::SentimentClient;
pub use social::SocialDataClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TokenSeerError};
use crate::models::{
    DefiData, MarketData, PriceHistory, Provenance, ResolvedToken, SentimentIndex, SocialData,
};

/// External data providers. Rate limiting is tracked per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    CoinGecko,
    LunarCrush,
    CryptoCompare,
    DefiLlama,
    AlternativeMe,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Self::CoinGecko,
        Self::LunarCrush,
        Self::CryptoCompare,
        Self::DefiLlama,
        Self::AlternativeMe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::LunarCrush => "lunarcrush",
            Self::CryptoCompare => "cryptocompare",
            Self::DefiLlama => "defillama",
            Self::AlternativeMe => "alternative_me",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one client fetch. Clients never return errors; every failure
/// is folded into one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderResult<T> {
    Success {
        payload: T,
        fetched_at: DateTime<Utc>,
    },
    PartialSuccess {
        payload: T,
        degraded_reason: String,
    },
    Failure {
        reason: String,
    },
}

impl<T> ProviderResult<T> {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success { payload, .. } | Self::PartialSuccess { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// Splits into the payload (if any) and a human-readable note describing
    /// any degradation or failure.
    pub fn into_parts(self) -> (Option<T>, Option<String>) {
        match self {
            Self::Success { payload, .. } => (Some(payload), None),
            Self::PartialSuccess {
                payload,
                degraded_reason,
            } => (Some(payload), Some(degraded_reason)),
            Self::Failure { reason } => (None, Some(reason)),
        }
    }
}

/// Records that carry a provenance tag stamped by the chain that built them.
pub trait Sourced {
    fn stamp(&mut self, provenance: Provenance);
}

macro_rules! impl_sourced {
    ($($ty:ty),*) => {
        $(impl Sourced for $ty {
            fn stamp(&mut self, provenance: Provenance) {
                self.provenance = provenance;
            }
        })*
    };
}

impl_sourced!(MarketData, SocialData, DefiData, SentimentIndex, PriceHistory);

impl Sourced for ResolvedToken {
    // Identities are not data; nothing to tag.
    fn stamp(&mut self, _provenance: Provenance) {}
}

/// One way of obtaining `T` for a query: an endpoint, a derived computation
/// or a local lookup.
#[async_trait]
pub trait FetchStrategy<Q: ?Sized + Sync, T>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &Q) -> Result<T>;
}

type DefaultFn<Q, T> = Box<dyn Fn(&Q) -> T + Send + Sync>;

/// Ordered strategies tried from richest to most basic, with an optional
/// local default when every strategy fails.
pub struct FallbackChain<Q: ?Sized, T> {
    label: &'static str,
    strategies: Vec<Box<dyn FetchStrategy<Q, T>>>,
    default: Option<(&'static str, DefaultFn<Q, T>)>,
}

impl<Q, T> FallbackChain<Q, T>
where
    Q: ?Sized + Sync,
    T: Sourced + Send,
{
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            strategies: Vec::new(),
            default: None,
        }
    }

    pub fn with_strategy(mut self, strategy: impl FetchStrategy<Q, T> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn with_default(
        mut self,
        name: &'static str,
        default: impl Fn(&Q) -> T + Send + Sync + 'static,
    ) -> Self {
        self.default = Some((name, Box::new(default)));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, query: &Q) -> ProviderResult<T> {
        self.run_with_errors(query).await.0
    }

    /// Like `run`, but also hands back the error of every strategy that
    /// failed, so callers can tell "nothing matched" from "nobody answered".
    pub async fn run_with_errors(&self, query: &Q) -> (ProviderResult<T>, Vec<TokenSeerError>) {
        let mut errors: Vec<TokenSeerError> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for (idx, strategy) in self.strategies.iter().enumerate() {
            match strategy.fetch(query).await {
                Ok(mut payload) if idx == 0 => {
                    debug!("{}: served by {}", self.label, strategy.name());
                    payload.stamp(Provenance::live(strategy.name()));
                    let result = ProviderResult::Success {
                        payload,
                        fetched_at: Utc::now(),
                    };
                    return (result, errors);
                }
                Ok(mut payload) => {
                    debug!("{}: fell back to {}", self.label, strategy.name());
                    payload.stamp(Provenance::degraded(strategy.name()));
                    let result = ProviderResult::PartialSuccess {
                        payload,
                        degraded_reason: format!(
                            "served by {} after: {}",
                            strategy.name(),
                            failures.join("; ")
                        ),
                    };
                    return (result, errors);
                }
                Err(e) => {
                    warn!("{}: {} failed: {}", self.label, strategy.name(), e);
                    failures.push(format!("{} failed: {}", strategy.name(), e));
                    errors.push(e);
                }
            }
        }

        let reason = if failures.is_empty() {
            format!("{}: no strategy available", self.label)
        } else {
            failures.join("; ")
        };

        let result = match &self.default {
            Some((name, default)) => {
                let mut payload = default(query);
                payload.stamp(Provenance::absent(name));
                ProviderResult::PartialSuccess {
                    payload,
                    degraded_reason: format!("using {} defaults: {}", name, reason),
                }
            }
            None => ProviderResult::Failure { reason },
        };
        (result, errors)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::TokenSeerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Strategy returning a fixed value or error and counting its calls.
    pub struct StubStrategy<T> {
        pub name: &'static str,
        pub value: Option<T>,
        pub calls: Arc<AtomicUsize>,
        // Fail with NotFound instead of a network error
        pub missing: bool,
    }

    impl<T> StubStrategy<T> {
        pub fn ok(name: &'static str, value: T) -> Self {
            Self {
                name,
                value: Some(value),
                calls: Arc::new(AtomicUsize::new(0)),
                missing: false,
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                name,
                value: None,
                calls: Arc::new(AtomicUsize::new(0)),
                missing: false,
            }
        }

        /// Answers every query with "no such item".
        pub fn missing(name: &'static str) -> Self {
            Self {
                missing: true,
                ..Self::failing(name)
            }
        }

        pub fn counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    #[async_trait]
    impl<Q, T> FetchStrategy<Q, T> for StubStrategy<T>
    where
        Q: ?Sized + Sync,
        T: Clone + Send + Sync,
    {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _query: &Q) -> Result<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.value {
                Some(value) => Ok(value.clone()),
                None if self.missing => {
                    Err(TokenSeerError::not_found(format!("{} has no match", self.name)))
                }
                None => Err(TokenSeerError::network_error(format!("{} unreachable", self.name))),
            }
        }
    }
}
