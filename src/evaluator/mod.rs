pub mod decision_maker;
pub mod hype;
pub mod insights;
pub mod momentum;
pub mod risk_analyzer;
pub mod scorer;

pub use decision_maker::{Classification, DecisionMaker, EliminationResult, MarketTier, TokenClass};
pub use hype::{GrowthPattern, HypeAssessment, HypeDetector, HypeLevel};
pub use insights::{analysis_points, AnalysisPoints, MarketContext};
pub use momentum::MomentumAnalyzer;
pub use risk_analyzer::RiskAnalyzer;
pub use scorer::TokenScorer;

use serde::{Deserialize, Serialize};

/// One named category score on the 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    /// Human-readable rules that moved the score
    pub factors: Vec<String>,
}

impl SubScore {
    pub fn new(name: &str, score: f64, weight: f64, factors: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            score: if score.is_finite() { score.clamp(0.0, 10.0) } else { 0.0 },
            weight,
            factors,
        }
    }

    pub fn weighted(&self) -> f64 {
        self.score * self.weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// fundamental, technical, social, risk, in that order
    pub sub_scores: Vec<SubScore>,
    pub total: f64,
    pub classification: Classification,
    pub passed_elimination: bool,
    pub elimination_reasons: Vec<String>,
}

impl ScoreBreakdown {
    /// A token stopped at the elimination gate: nothing scored.
    pub fn rejected(reasons: Vec<String>) -> Self {
        Self {
            sub_scores: Vec::new(),
            total: 0.0,
            classification: Classification::Rejected,
            passed_elimination: false,
            elimination_reasons: reasons,
        }
    }

    pub fn sub_score(&self, name: &str) -> Option<&SubScore> {
        self.sub_scores.iter().find(|s| s.name == name)
    }
}
