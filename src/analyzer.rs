use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::evaluator::{
    analysis_points, AnalysisPoints, DecisionMaker, HypeAssessment, HypeDetector, MarketContext,
    MarketTier, MomentumAnalyzer, RiskAnalyzer, ScoreBreakdown, TokenClass, TokenScorer,
};
use crate::models::{
    CompositeTokenRecord, DataStatus, DefiData, MarketData, PriceHistory, SentimentIndex,
    SocialData, TechnicalSnapshot, TokenQuery,
};
use crate::providers::market_data::Resolution;
use crate::providers::{
    ApiClient, CacheStore, DefiClient, MarketDataClient, Provider, ProviderResult, RateLimiter,
    SentimentClient, SocialDataClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Market, social and sentiment data all came from their primary sources
    Complete,
    /// At least one category fell back or is absent, or resolution could
    /// not reach any source
    Degraded,
    /// Every source answered and none knows the identifier
    NotFound,
}

/// Everything known about one token after a single analysis pass.
/// Always fully populated, whatever the providers returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAnalysis {
    pub query: String,
    pub status: AnalysisStatus,
    pub analyzed_at: DateTime<Utc>,
    pub record: CompositeTokenRecord,
    pub score: ScoreBreakdown,
    pub hype: HypeAssessment,
    pub tier: Option<MarketTier>,
    pub class: Option<TokenClass>,
    pub points: AnalysisPoints,
    pub market_context: MarketContext,
    pub provider_notes: Vec<String>,
}

impl TokenAnalysis {
    /// An analysis that stopped at resolution: nothing fetched, nothing scored.
    fn unresolved(query: &TokenQuery, status: AnalysisStatus, reason: String) -> Self {
        let record = CompositeTokenRecord::default();
        Self {
            query: query.to_string(),
            status,
            analyzed_at: Utc::now(),
            score: ScoreBreakdown::rejected(vec![reason.clone()]),
            hype: HypeAssessment::insufficient("absent"),
            tier: None,
            class: None,
            points: AnalysisPoints::default(),
            market_context: MarketContext::from_sentiment(&record.sentiment),
            record,
            provider_notes: vec![reason],
        }
    }
}

/// Folds a client result into its payload, recording any degradation note.
fn settle<T>(category: &str, result: ProviderResult<T>, notes: &mut Vec<String>) -> Option<T> {
    let (payload, note) = result.into_parts();
    if let Some(note) = note {
        debug!("{}: {}", category, note);
        notes.push(format!("{}: {}", category, note));
    }
    payload
}

pub struct TokenAnalyzer {
    config: Arc<Config>,
    cache: Arc<CacheStore>,
    market: Arc<MarketDataClient>,
    social: SocialDataClient,
    defi: DefiClient,
    sentiment: SentimentClient,
    momentum: MomentumAnalyzer,
    hype: HypeDetector,
    risk: RiskAnalyzer,
    scorer: TokenScorer,
    decision: DecisionMaker,
}

impl TokenAnalyzer {
    /// Wires every provider client to one shared rate limiter and cache.
    /// The cache is seeded from its snapshot file when one is configured.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        info!("Initializing token analyzer...");

        let limiter = Arc::new(
            RateLimiter::new(config.rate_limit.into())
                .with_policy(Provider::CoinGecko, config.coingecko_rate_limit.into()),
        );
        let http = Arc::new(ApiClient::new(&config, limiter)?);

        let cache = Arc::new(match &config.cache_file {
            Some(path) => CacheStore::with_file(config.cache_ttls, path.clone()).await,
            None => CacheStore::new(config.cache_ttls),
        });

        let market = Arc::new(MarketDataClient::new(&config, http.clone(), cache.clone()));
        let social = SocialDataClient::new(&config, http.clone(), cache.clone(), market.clone());
        let defi = DefiClient::new(&config, http.clone(), cache.clone());
        let sentiment = SentimentClient::new(&config, http, cache.clone());

        Ok(Self::from_parts(config, cache, market, social, defi, sentiment))
    }

    pub fn from_parts(
        config: Arc<Config>,
        cache: Arc<CacheStore>,
        market: Arc<MarketDataClient>,
        social: SocialDataClient,
        defi: DefiClient,
        sentiment: SentimentClient,
    ) -> Self {
        Self {
            momentum: MomentumAnalyzer::new(),
            hype: HypeDetector::new(config.hype),
            risk: RiskAnalyzer::new(),
            scorer: TokenScorer::new(config.weights),
            decision: DecisionMaker::new(config.elimination, config.classification),
            config,
            cache,
            market,
            social,
            defi,
            sentiment,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Analyze one token. Never fails: provider outages show up as absent
    /// or degraded subtrees and as entries in `provider_notes`.
    pub async fn analyze(&self, raw: &str) -> TokenAnalysis {
        info!("Analyzing {}...", raw.trim());
        let query = TokenQuery::new(raw);

        let mut notes = Vec::new();
        let token = match self.market.resolve(&query).await {
            Resolution::Found { token, note } => {
                if let Some(note) = note {
                    notes.push(format!("resolve: {}", note));
                }
                token
            }
            Resolution::NotFound(reason) => {
                warn!("{}", reason);
                return TokenAnalysis::unresolved(&query, AnalysisStatus::NotFound, reason);
            }
            Resolution::Unavailable(reason) => {
                warn!("{}", reason);
                return TokenAnalysis::unresolved(&query, AnalysisStatus::Degraded, reason);
            }
        };

        let (market, social, defi, sentiment, history) = futures::join!(
            self.market.fetch(&token),
            self.social.fetch(&token),
            self.defi.fetch(&token),
            self.sentiment.fetch(),
            self.market.fetch_history(&token, self.config.history_days),
        );

        let mut market: MarketData = settle("market", market, &mut notes).unwrap_or_default();
        let social: SocialData = settle("social", social, &mut notes).unwrap_or_default();
        let defi: DefiData = settle("defi", defi, &mut notes).unwrap_or_default();
        let sentiment: SentimentIndex =
            settle("sentiment", sentiment, &mut notes).unwrap_or_default();
        let history: Option<PriceHistory> = settle("history", history, &mut notes);

        if market.provenance.is_absent() {
            market.id = token.id.clone();
            market.symbol = token.symbol.clone();
            market.name = token.name.clone();
        }

        let technical = self.momentum.analyze(&market, history.as_ref());
        let hype = self.hype.detect(&token.symbol, &social);
        let score = self.score(&market, &social, &defi, &sentiment, &technical, &hype);
        let tier = (!market.provenance.is_absent()).then(|| self.decision.market_tier(&market));
        let class = tier.map(|tier| self.decision.token_class(tier, &defi, score.total));
        let points = analysis_points(&market);
        let market_context = MarketContext::from_sentiment(&sentiment);

        let primary_live = [
            market.provenance.status,
            social.provenance.status,
            sentiment.provenance.status,
        ]
        .iter()
        .all(|s| *s == DataStatus::Live);
        let status = if primary_live {
            AnalysisStatus::Complete
        } else {
            AnalysisStatus::Degraded
        };

        if let Err(e) = self.cache.persist().await {
            warn!("Failed to persist cache: {}", e);
        }

        info!(
            "{}: {:?}, total {:.2} ({:?})",
            token.id, score.classification, score.total, status
        );

        TokenAnalysis {
            query: query.to_string(),
            status,
            analyzed_at: Utc::now(),
            record: CompositeTokenRecord {
                token: Some(token),
                market,
                social,
                defi,
                sentiment,
                technical,
                fetched_at: Some(Utc::now()),
            },
            score,
            hype,
            tier,
            class,
            points,
            market_context,
            provider_notes: notes,
        }
    }

    /// Sequential batch; the shared rate limiter spaces the calls.
    pub async fn analyze_many(&self, tokens: &[String]) -> Vec<TokenAnalysis> {
        let mut analyses = Vec::with_capacity(tokens.len());
        for token in tokens {
            analyses.push(self.analyze(token).await);
        }
        analyses
    }

    fn score(
        &self,
        market: &MarketData,
        social: &SocialData,
        defi: &DefiData,
        sentiment: &SentimentIndex,
        technical: &TechnicalSnapshot,
        hype: &HypeAssessment,
    ) -> ScoreBreakdown {
        let elimination = self.decision.check_elimination(market);
        if !elimination.passed {
            return ScoreBreakdown::rejected(elimination.reasons);
        }

        let (technical_score, technical_factors) = self.momentum.score(technical);
        let (risk_score, risk_factors) =
            self.risk.analyze_risk(market, defi, sentiment, hype.level);

        let sub_scores = vec![
            self.scorer.fundamental_score(market),
            self.scorer.technical_score(technical_score, technical_factors),
            self.scorer.social_score(social, hype),
            self.scorer.risk_score(risk_score, risk_factors),
        ];
        let total = self.scorer.total(&sub_scores);

        ScoreBreakdown {
            sub_scores,
            total,
            classification: self.decision.classify(total),
            passed_elimination: true,
            elimination_reasons: Vec::new(),
        }
    }
}
