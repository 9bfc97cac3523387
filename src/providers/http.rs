use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Provider, RateLimiter};
use crate::config::Config;
use crate::error::{Result, TokenSeerError};

const USER_AGENT: &str = concat!("tokenseer/", env!("CARGO_PKG_VERSION"));

// Body fragments providers use when an endpoint sits behind a paid plan
const PAID_TIER_MARKERS: [&str; 5] = [
    "pro api",
    "paid plan",
    "subscription",
    "upgrade your plan",
    "api key required",
];

/// JSON-over-HTTPS client shared by every provider. Each request first waits
/// on the rate limiter for its provider.
pub struct ApiClient {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl ApiClient {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TokenSeerError::config_error(format!("building HTTP client: {}", e)))?;

        Ok(Self { client, limiter })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        provider: Provider,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<T> {
        self.limiter.acquire(provider).await;
        debug!("{} GET {}", provider, url);

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(query);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify_status(status.as_u16(), &body);
            warn!("{} returned {} for {}", provider, status, url);
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| {
            TokenSeerError::malformed(format!("{} payload from {}: {}", provider, url, e))
        })
    }
}

/// Map a non-2xx response to the error that drives the fallback decision.
pub(crate) fn classify_status(code: u16, body: &str) -> TokenSeerError {
    let snippet: String = body.chars().take(200).collect();
    let lowered = snippet.to_lowercase();
    let paid = PAID_TIER_MARKERS.iter().any(|m| lowered.contains(m));

    match code {
        402 => TokenSeerError::PaidTier(snippet),
        401 | 403 if paid => TokenSeerError::PaidTier(snippet),
        401 | 403 => TokenSeerError::Unauthorized(snippet),
        404 => TokenSeerError::not_found(snippet),
        429 => TokenSeerError::RateLimited(snippet),
        _ => TokenSeerError::Status {
            code,
            body: snippet,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(404, "coin not found").is_not_found());
        assert!(matches!(
            classify_status(429, "slow down"),
            TokenSeerError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(402, ""),
            TokenSeerError::PaidTier(_)
        ));
        assert!(matches!(
            classify_status(401, r#"{"error":"This request is limited to Pro API subscribers"}"#),
            TokenSeerError::PaidTier(_)
        ));
        assert!(matches!(
            classify_status(401, "bad key"),
            TokenSeerError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_status(503, "maintenance"),
            TokenSeerError::Status { code: 503, .. }
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        match classify_status(500, &body) {
            TokenSeerError::Status { body, .. } => assert_eq!(body.len(), 200),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let config = Config {
            request_timeout_secs: 2,
            ..Config::default()
        };
        let limiter = Arc::new(RateLimiter::new(super::super::RateLimitPolicy {
            min_spacing: Duration::ZERO,
            max_per_minute: 0,
        }));
        let client = ApiClient::new(&config, limiter).unwrap();

        let result: Result<serde_json::Value> = client
            .get_json(Provider::DefiLlama, "http://127.0.0.1:1/protocols", &[], &[])
            .await;
        assert!(matches!(
            result,
            Err(TokenSeerError::Network(_)) | Err(TokenSeerError::Timeout(_))
        ));
    }
}
