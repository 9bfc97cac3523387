use tracing::debug;

use crate::models::{MarketData, PriceHistory, Provenance, TechnicalSnapshot, Trend};

const ESTIMATE_SOURCE: &str = "price_change_estimate";
const RSI_PERIOD: usize = 14;

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn pct_above(current: f64, reference: f64) -> Option<f64> {
    if reference > 0.0 {
        Some((current / reference - 1.0) * 100.0)
    } else {
        None
    }
}

/// Simple-average RSI over the last `period` changes.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() <= period {
        return None;
    }

    let recent = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for w in recent.windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    if losses == 0.0 {
        return Some(if gains == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn trend_for(momentum: i32) -> Trend {
    match momentum {
        m if m >= 4 => Trend::StrongUp,
        m if m >= 2 => Trend::Up,
        m if m >= -1 => Trend::Neutral,
        m if m >= -3 => Trend::Down,
        _ => Trend::StrongDown,
    }
}

/// Price momentum from daily history, or a rougher read from the
/// 7d/30d changes when no history is available.
pub struct MomentumAnalyzer;

impl MomentumAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, market: &MarketData, history: Option<&PriceHistory>) -> TechnicalSnapshot {
        match history {
            Some(h) if h.prices.len() >= 7 => self.from_history(h),
            _ => self.from_changes(market),
        }
    }

    fn from_history(&self, history: &PriceHistory) -> TechnicalSnapshot {
        let prices = &history.prices;
        let current = prices[prices.len() - 1];
        let mut momentum = 0;
        let mut signals = Vec::new();

        // Distance from the 7-day average
        if let Some(dev) = mean(&prices[prices.len() - 7..]).and_then(|avg| pct_above(current, avg)) {
            if dev > 5.0 {
                momentum += 2;
                signals.push(format!("{:+.1}% above 7d average", dev));
            } else if dev < -5.0 {
                momentum -= 2;
                signals.push(format!("{:+.1}% below 7d average", dev));
            }
        }

        // Distance from the 30-day average
        if prices.len() >= 30 {
            if let Some(dev) =
                mean(&prices[prices.len() - 30..]).and_then(|avg| pct_above(current, avg))
            {
                if dev > 10.0 {
                    momentum += 3;
                    signals.push(format!("{:+.1}% above 30d average", dev));
                } else if dev < -10.0 {
                    momentum -= 3;
                    signals.push(format!("{:+.1}% below 30d average", dev));
                }
            }
        }

        // Position in the window's range
        let high = prices.iter().cloned().fold(f64::MIN, f64::max);
        let low = prices.iter().cloned().fold(f64::MAX, f64::min);
        if high > low {
            let position = (current - low) / (high - low) * 100.0;
            if position > 80.0 {
                momentum += 1;
                signals.push(format!("near range high ({:.0}%)", position));
            } else if position < 20.0 {
                momentum -= 1;
                signals.push(format!("near range low ({:.0}%)", position));
            }
        }

        let rsi = rsi(prices, RSI_PERIOD);
        match rsi {
            Some(value) if value > 70.0 => {
                momentum -= 1;
                signals.push(format!("RSI {:.0} overbought", value));
            }
            Some(value) if value < 30.0 => {
                momentum += 1;
                signals.push(format!("RSI {:.0} oversold", value));
            }
            _ => {}
        }

        // Last week's volume against the week before
        let volumes = &history.volumes;
        if volumes.len() >= 14 {
            let n = volumes.len();
            let change = mean(&volumes[n - 7..])
                .zip(mean(&volumes[n - 14..n - 7]))
                .and_then(|(recent, prior)| pct_above(recent, prior));
            match change {
                Some(c) if c > 50.0 => {
                    momentum += 1;
                    signals.push(format!("volume {:+.0}% week over week", c));
                }
                Some(c) if c < -30.0 => {
                    momentum -= 1;
                    signals.push(format!("volume {:+.0}% week over week", c));
                }
                _ => {}
            }
        }

        debug!("Momentum from {} daily closes: {}", prices.len(), momentum);
        TechnicalSnapshot {
            trend: trend_for(momentum),
            momentum_score: momentum,
            rsi,
            signals,
            provenance: history.provenance.clone(),
        }
    }

    fn from_changes(&self, market: &MarketData) -> TechnicalSnapshot {
        if market.price_change_7d.is_none() && market.price_change_30d.is_none() {
            return TechnicalSnapshot {
                signals: vec!["no price history".to_string()],
                ..TechnicalSnapshot::default()
            };
        }

        let mut momentum = 0;
        let mut signals = Vec::new();

        match market.price_change_7d {
            Some(c) if c > 5.0 => {
                momentum += 2;
                signals.push(format!("7d {:+.1}%", c));
            }
            Some(c) if c < -5.0 => {
                momentum -= 2;
                signals.push(format!("7d {:+.1}%", c));
            }
            _ => {}
        }
        match market.price_change_30d {
            Some(c) if c > 10.0 => {
                momentum += 3;
                signals.push(format!("30d {:+.1}%", c));
            }
            Some(c) if c < -10.0 => {
                momentum -= 3;
                signals.push(format!("30d {:+.1}%", c));
            }
            _ => {}
        }

        TechnicalSnapshot {
            trend: trend_for(momentum),
            momentum_score: momentum,
            rsi: None,
            signals,
            provenance: Provenance::degraded(ESTIMATE_SOURCE),
        }
    }

    /// Technical sub-score on 0-10. Estimates without history sit lower than
    /// history-backed readings with the same momentum.
    pub fn score(&self, snapshot: &TechnicalSnapshot) -> (f64, Vec<String>) {
        let m = snapshot.momentum_score as f64;
        let mut factors = snapshot.signals.clone();

        let score = if snapshot.trend == Trend::Undetermined {
            factors.push("no momentum data, penalized".to_string());
            4.0
        } else if snapshot.provenance.source == ESTIMATE_SOURCE {
            factors.push("estimated from 7d/30d changes".to_string());
            4.0 + m * 0.5
        } else {
            5.0 + m * 0.625
        };

        (score.clamp(0.0, 10.0), factors)
    }
}

impl Default for MomentumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(prices: Vec<f64>, volumes: Vec<f64>) -> PriceHistory {
        PriceHistory {
            prices,
            volumes,
            provenance: Provenance::live("coingecko_market_chart"),
        }
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        let flat = vec![5.0; 20];
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..10], 14), None);

        let falling: Vec<f64> = (1..=20).rev().map(|i| i as f64).collect();
        assert!(rsi(&falling, 14).unwrap() < 1.0);
    }

    #[test]
    fn test_rally_is_strong_uptrend() {
        let prices: Vec<f64> = (0..90).map(|i| 100.0 * 1.03f64.powi(i)).collect();
        let mut volumes = vec![1_000.0; 83];
        volumes.extend(vec![2_000.0; 7]);

        let snapshot =
            MomentumAnalyzer::new().analyze(&MarketData::default(), Some(&history(prices, volumes)));

        // +2 (7d) +3 (30d) +1 (range) -1 (RSI overbought) +1 (volume)
        assert_eq!(snapshot.momentum_score, 6);
        assert_eq!(snapshot.trend, Trend::StrongUp);
        let (score, _) = MomentumAnalyzer::new().score(&snapshot);
        assert_eq!(score, 5.0 + 6.0 * 0.625);
    }

    #[test]
    fn test_estimate_without_history_is_penalized() {
        let market = MarketData {
            price_change_7d: Some(8.0),
            price_change_30d: Some(15.0),
            ..MarketData::default()
        };
        let analyzer = MomentumAnalyzer::new();
        let snapshot = analyzer.analyze(&market, None);

        assert_eq!(snapshot.momentum_score, 5);
        assert_eq!(snapshot.provenance.source, ESTIMATE_SOURCE);
        assert_eq!(analyzer.score(&snapshot).0, 6.5);
    }

    #[test]
    fn test_nothing_known_scores_four() {
        let analyzer = MomentumAnalyzer::new();
        let snapshot = analyzer.analyze(&MarketData::default(), None);
        assert_eq!(snapshot.trend, Trend::Undetermined);
        assert!(snapshot.provenance.is_absent());
        assert_eq!(analyzer.score(&snapshot).0, 4.0);
    }
}
