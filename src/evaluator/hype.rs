use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::HypeThresholds;
use crate::models::SocialData;

/// Attention level, lowest first. `InsufficientData` means the social slice
/// could not support a reading at all, which is not the same as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypeLevel {
    InsufficientData,
    Normal,
    Moderate,
    High,
    Extreme,
}

impl HypeLevel {
    fn escalate(self) -> Self {
        match self {
            Self::Moderate => Self::High,
            Self::High | Self::Extreme => Self::Extreme,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPattern {
    InsufficientHistory,
    Stable,
    /// Steady day-over-day increases: organic interest
    SustainedGrowth,
    /// Sudden jump off a flat baseline: likely a short-lived pump
    Spike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypeAssessment {
    pub hype_score: u32,
    pub level: HypeLevel,
    pub pattern: GrowthPattern,
    pub signals: Vec<String>,
    pub recommended_action: String,
    pub data_source: String,
}

impl HypeAssessment {
    pub fn insufficient(source: &str) -> Self {
        Self {
            hype_score: 0,
            level: HypeLevel::InsufficientData,
            pattern: GrowthPattern::InsufficientHistory,
            signals: vec!["no live social data for this token".to_string()],
            recommended_action: "Social analysis unavailable, rely on fundamentals and momentum"
                .to_string(),
            data_source: source.to_string(),
        }
    }
}

const MIN_HISTORY: usize = 3;
// Largest max/min ratio a baseline may have and still count as flat
const FLAT_BASELINE_RATIO: f64 = 1.3;

pub fn growth_pattern(history: &[f64]) -> GrowthPattern {
    if history.len() < MIN_HISTORY {
        return GrowthPattern::InsufficientHistory;
    }

    let (prior, last) = history.split_at(history.len() - 1);
    let last = last[0];
    let mean = prior.iter().sum::<f64>() / prior.len() as f64;
    let max = prior.iter().cloned().fold(f64::MIN, f64::max);
    let min = prior.iter().cloned().fold(f64::MAX, f64::min);

    if mean > 0.0 && min > 0.0 && last >= 2.0 * mean && max / min <= FLAT_BASELINE_RATIO {
        return GrowthPattern::Spike;
    }

    let decreases = history.windows(2).filter(|w| w[1] < w[0]).count();
    let first = history[0];
    if decreases <= 1 && first > 0.0 && last > first * 1.2 {
        return GrowthPattern::SustainedGrowth;
    }

    GrowthPattern::Stable
}

pub struct HypeDetector {
    thresholds: HypeThresholds,
}

impl HypeDetector {
    pub fn new(thresholds: HypeThresholds) -> Self {
        Self { thresholds }
    }

    /// Band reached by a percentage change. Boundaries belong to the higher band.
    pub fn band(&self, change_pct: f64) -> HypeLevel {
        if change_pct >= self.thresholds.extreme {
            HypeLevel::Extreme
        } else if change_pct >= self.thresholds.high {
            HypeLevel::High
        } else if change_pct >= self.thresholds.moderate {
            HypeLevel::Moderate
        } else {
            HypeLevel::Normal
        }
    }

    fn band_points(&self, change_pct: f64) -> u32 {
        match self.band(change_pct) {
            HypeLevel::Extreme => 40,
            HypeLevel::High => 25,
            HypeLevel::Moderate => 15,
            _ if change_pct >= self.thresholds.normal => 5,
            _ => 0,
        }
    }

    pub fn detect(&self, token: &str, social: &SocialData) -> HypeAssessment {
        info!("Detecting hype for {}", token);
        let source = social.provenance.source.as_str();

        // Neutral fallbacks carry no signal; reporting "normal" here would be a false negative
        if social.provenance.is_absent() || !social.has_core_metrics() {
            debug!("{}: social data from {} is not usable", token, source);
            return HypeAssessment::insufficient(source);
        }

        let mut score: u32 = 0;
        let mut signals = Vec::new();

        // Social volume and engagement deltas
        let volume_change = social.social_volume_change;
        let engagement_change = social.engagement_change;
        let volume_level = self.band(volume_change);
        let engagement_level = self.band(engagement_change);
        let mut level = volume_level.max(engagement_level);

        let volume_points = self.band_points(volume_change);
        if volume_points > 0 {
            score += volume_points;
            signals.push(format!(
                "social volume {:+.0}% ({:?})",
                volume_change, volume_level
            ));
        }
        let engagement_points = self.band_points(engagement_change) / 2;
        if engagement_points > 0 {
            score += engagement_points;
            signals.push(format!(
                "engagement {:+.0}% ({:?})",
                engagement_change, engagement_level
            ));
        }

        if social.galaxy_score_change > 50.0 {
            score += 20;
            signals.push(format!("galaxy score up {:.0}%", social.galaxy_score_change));
        }

        if social.sentiment_bullish > 85.0 {
            score += 15;
            signals.push(format!("{:.0}% bullish sentiment (very high)", social.sentiment_bullish));
        } else if social.sentiment_bullish > 70.0 {
            score += 10;
            signals.push(format!("{:.0}% bullish sentiment", social.sentiment_bullish));
        }

        if social.social_volume > 1000.0 || social.tweets > 100 {
            score += 10;
            signals.push("high social activity".to_string());
        }

        match social.alt_rank {
            Some(rank) if rank < 10 => {
                score += 10;
                signals.push(format!("alt rank #{} (top 10)", rank));
            }
            Some(rank) if rank < 50 => {
                score += 5;
                signals.push(format!("alt rank #{}", rank));
            }
            _ => {}
        }

        // Shape of the recent contributor history
        let pattern = growth_pattern(&social.history_7d);
        match pattern {
            GrowthPattern::Spike => {
                score += 15;
                signals.push("contributor spike off a flat baseline".to_string());
                if level >= HypeLevel::Moderate {
                    level = level.escalate();
                }
            }
            GrowthPattern::SustainedGrowth => {
                score = score.saturating_sub(10);
                signals.push("steady contributor growth (organic)".to_string());
            }
            _ => {}
        }

        HypeAssessment {
            hype_score: score,
            level,
            pattern,
            signals,
            recommended_action: recommended_action(level, pattern).to_string(),
            data_source: source.to_string(),
        }
    }
}

fn recommended_action(level: HypeLevel, pattern: GrowthPattern) -> &'static str {
    match (level, pattern) {
        (HypeLevel::Extreme, _) => "Possible local top: wait for a pullback or take partial profits",
        (HypeLevel::High, GrowthPattern::Spike) => {
            "Pump pattern: avoid chasing, use tight stops if already in"
        }
        (HypeLevel::High, _) => "Enter with caution: reduced position and tight stops",
        (HypeLevel::Moderate, GrowthPattern::SustainedGrowth) => {
            "Attention growing organically: prepare an entry plan"
        }
        (HypeLevel::Moderate, _) => "Monitor closely, attention is building",
        (HypeLevel::Normal, _) => "No abnormal attention, focus on fundamentals",
        (HypeLevel::InsufficientData, _) => {
            "Social analysis unavailable, rely on fundamentals and momentum"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;

    fn detector() -> HypeDetector {
        HypeDetector::new(HypeThresholds::default())
    }

    fn live_social(volume_change: f64) -> SocialData {
        SocialData {
            galaxy_score: 55.0,
            social_volume: 400.0,
            social_volume_change: volume_change,
            provenance: Provenance::live("lunarcrush_v4"),
            ..SocialData::default()
        }
    }

    #[test]
    fn test_band_boundaries_belong_to_higher_band() {
        let d = detector();
        assert_eq!(d.detect("x", &live_social(300.0)).level, HypeLevel::Extreme);
        assert_eq!(d.detect("x", &live_social(150.0)).level, HypeLevel::High);
        assert_eq!(d.detect("x", &live_social(75.0)).level, HypeLevel::Moderate);
        assert_eq!(d.detect("x", &live_social(10.0)).level, HypeLevel::Normal);
        assert_eq!(d.detect("x", &live_social(299.9)).level, HypeLevel::High);
    }

    #[test]
    fn test_limited_fallback_is_insufficient_not_normal() {
        let assessment = detector().detect("x", &SocialData::limited("limited"));
        assert_eq!(assessment.level, HypeLevel::InsufficientData);
        assert_eq!(assessment.hype_score, 0);
        assert_eq!(assessment.data_source, "limited");
    }

    #[test]
    fn test_zeroed_metrics_are_insufficient_even_when_tagged_live() {
        let social = SocialData {
            provenance: Provenance::degraded("cryptocompare"),
            ..SocialData::limited("cryptocompare")
        };
        assert_eq!(
            detector().detect("x", &social).level,
            HypeLevel::InsufficientData
        );
    }

    #[test]
    fn test_engagement_can_raise_the_level() {
        let social = SocialData {
            engagement_change: 160.0,
            ..live_social(20.0)
        };
        let assessment = detector().detect("x", &social);
        assert_eq!(assessment.level, HypeLevel::High);
        // 25 points for the band, halved for engagement
        assert_eq!(assessment.hype_score, 12);
    }

    #[test]
    fn test_score_accumulates_signals() {
        let social = SocialData {
            galaxy_score_change: 60.0,
            sentiment_bullish: 90.0,
            social_volume: 5_000.0,
            alt_rank: Some(4),
            ..live_social(320.0)
        };
        let assessment = detector().detect("x", &social);
        assert_eq!(assessment.hype_score, 40 + 20 + 15 + 10 + 10);
        assert_eq!(assessment.signals.len(), 5);
    }

    #[test]
    fn test_growth_patterns() {
        assert_eq!(growth_pattern(&[1.0, 2.0]), GrowthPattern::InsufficientHistory);
        assert_eq!(
            growth_pattern(&[100.0, 105.0, 98.0, 102.0, 260.0]),
            GrowthPattern::Spike
        );
        assert_eq!(
            growth_pattern(&[100.0, 110.0, 125.0, 123.0, 140.0, 160.0]),
            GrowthPattern::SustainedGrowth
        );
        assert_eq!(
            growth_pattern(&[100.0, 90.0, 110.0, 95.0, 105.0]),
            GrowthPattern::Stable
        );
    }

    #[test]
    fn test_spike_escalates_and_growth_is_organic() {
        let spiking = SocialData {
            history_7d: vec![100.0, 102.0, 99.0, 101.0, 350.0],
            ..live_social(160.0)
        };
        let assessment = detector().detect("x", &spiking);
        assert_eq!(assessment.pattern, GrowthPattern::Spike);
        assert_eq!(assessment.level, HypeLevel::Extreme);

        let growing = SocialData {
            history_7d: vec![100.0, 120.0, 140.0, 170.0],
            ..live_social(80.0)
        };
        let assessment = detector().detect("x", &growing);
        assert_eq!(assessment.pattern, GrowthPattern::SustainedGrowth);
        assert_eq!(assessment.level, HypeLevel::Moderate);
        assert_eq!(assessment.hype_score, 5);
    }
}
