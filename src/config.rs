use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Spacing and per-minute ceiling applied to one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub min_spacing_ms: u64,
    pub max_per_minute: u32,
}

/// Freshness windows per data category, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheTtls {
    pub social: u64,
    pub defi: u64,
    pub fundamental: u64,
    pub default: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            social: 300,
            defi: 600,
            fundamental: 900,
            default: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EliminationThresholds {
    pub min_market_cap: f64,
    pub min_volume: f64,
    pub min_age_days: u32,
}

impl Default for EliminationThresholds {
    fn default() -> Self {
        Self {
            min_market_cap: 1_000_000.0,
            min_volume: 100_000.0,
            min_age_days: 180,
        }
    }
}

/// Category weights for the composite score. They sum to 1 so the total
/// stays on the same 0-10 scale as the sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub fundamental: f64,
    pub technical: f64,
    pub social: f64,
    pub risk: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            fundamental: 0.4,
            technical: 0.2,
            social: 0.2,
            risk: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationThresholds {
    pub strong_buy: f64,
    pub research: f64,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            strong_buy: 8.0,
            research: 5.0,
        }
    }
}

/// Percentage increases that open each hype band. Empirically calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HypeThresholds {
    pub extreme: f64,
    pub high: f64,
    pub moderate: f64,
    pub normal: f64,
}

impl Default for HypeThresholds {
    fn default() -> Self {
        Self {
            extreme: 300.0,
            high: 150.0,
            moderate: 75.0,
            normal: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Provider endpoints
    pub coingecko_url: String,
    pub lunarcrush_url: String,
    pub cryptocompare_url: String,
    pub defillama_url: String,
    pub fear_greed_url: String,

    // Optional credentials; a missing key routes that provider to its no-auth path
    pub coingecko_api_key: Option<String>,
    pub lunarcrush_api_key: Option<String>,
    pub cryptocompare_api_key: Option<String>,

    pub request_timeout_secs: u64,
    pub rate_limit: RateLimitSettings,
    pub coingecko_rate_limit: RateLimitSettings,
    pub cache_ttls: CacheTtls,
    pub cache_file: Option<PathBuf>,
    pub reports_dir: PathBuf,

    pub elimination: EliminationThresholds,
    pub weights: ScoreWeights,
    pub classification: ClassificationThresholds,
    pub hype: HypeThresholds,
    pub history_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coingecko_url: "https://api.coingecko.com/api/v3".to_string(),
            lunarcrush_url: "https://lunarcrush.com/api/v4".to_string(),
            cryptocompare_url: "https://min-api.cryptocompare.com/data".to_string(),
            defillama_url: "https://api.llama.fi".to_string(),
            fear_greed_url: "https://api.alternative.me/fng/".to_string(),
            coingecko_api_key: None,
            lunarcrush_api_key: None,
            cryptocompare_api_key: None,
            request_timeout_secs: 10,
            rate_limit: RateLimitSettings {
                min_spacing_ms: 2_000,
                max_per_minute: 30,
            },
            // CoinGecko's free tier throttles harder than the others
            coingecko_rate_limit: RateLimitSettings {
                min_spacing_ms: 2_500,
                max_per_minute: 25,
            },
            cache_ttls: CacheTtls::default(),
            cache_file: Some(PathBuf::from("data/cache.json")),
            reports_dir: PathBuf::from("reports"),
            elimination: EliminationThresholds::default(),
            weights: ScoreWeights::default(),
            classification: ClassificationThresholds::default(),
            hype: HypeThresholds::default(),
            history_days: 90,
        }
    }
}

impl Config {
    pub fn lunarcrush_enabled(&self) -> bool {
        self.lunarcrush_api_key.is_some()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub async fn load_config() -> Result<Config> {
    let mut config = Config::default();

    // Override defaults with environment variables
    if let Some(url) = non_empty_var("COINGECKO_API_URL") {
        config.coingecko_url = url;
    }
    if let Some(url) = non_empty_var("LUNARCRUSH_API_URL") {
        config.lunarcrush_url = url;
    }
    if let Some(url) = non_empty_var("CRYPTOCOMPARE_API_URL") {
        config.cryptocompare_url = url;
    }
    if let Some(url) = non_empty_var("DEFILLAMA_API_URL") {
        config.defillama_url = url;
    }
    if let Some(url) = non_empty_var("FEAR_GREED_API_URL") {
        config.fear_greed_url = url;
    }

    config.coingecko_api_key = non_empty_var("COINGECKO_API_KEY");
    config.lunarcrush_api_key = non_empty_var("LUNARCRUSH_API_KEY");
    config.cryptocompare_api_key = non_empty_var("CRYPTOCOMPARE_API_KEY");

    if let Some(timeout) = non_empty_var("TOKENSEER_TIMEOUT_SECS") {
        config.request_timeout_secs = timeout
            .parse()
            .context("TOKENSEER_TIMEOUT_SECS must be a whole number of seconds")?;
    }

    if let Some(rpm) = non_empty_var("REQUESTS_PER_MINUTE") {
        config.rate_limit.max_per_minute = rpm
            .parse()
            .context("REQUESTS_PER_MINUTE must be a positive integer")?;
    }

    match non_empty_var("TOKENSEER_CACHE_FILE") {
        Some(path) if path.eq_ignore_ascii_case("none") => config.cache_file = None,
        Some(path) => config.cache_file = Some(PathBuf::from(path)),
        None => {}
    }

    if let Some(dir) = non_empty_var("TOKENSEER_REPORTS_DIR") {
        config.reports_dir = PathBuf::from(dir);
    }

    Ok(config)
}

pub async fn initialize_config() -> Result<()> {
    info!("Initializing configuration...");

    let config = load_config().await?;

    if let Some(parent) = config.cache_file.as_ref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
            info!("Cache directory ready: {}", parent.display());
        }
    }

    tokio::fs::create_dir_all(&config.reports_dir)
        .await
        .with_context(|| format!("creating reports directory {}", config.reports_dir.display()))?;
    info!("Reports directory ready: {}", config.reports_dir.display());

    if config.lunarcrush_enabled() {
        info!("LunarCrush key present: social data starts from LunarCrush v4");
    } else {
        warn!("LUNARCRUSH_API_KEY not set: social data uses CryptoCompare/CoinGecko fallbacks");
    }

    if config.coingecko_api_key.is_none() {
        info!("COINGECKO_API_KEY not set: using anonymous CoinGecko access");
    }

    if config.cryptocompare_api_key.is_none() {
        info!("CRYPTOCOMPARE_API_KEY not set: using anonymous CryptoCompare access");
    }

    info!("Configuration initialized successfully!");
    Ok(())
}
