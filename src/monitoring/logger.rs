use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::analyzer::{AnalysisStatus, TokenAnalysis};
use crate::evaluator::{Classification, HypeLevel, MarketTier};

/// One line of the analysis report log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisLog {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub token_id: Option<String>,
    pub status: AnalysisStatus,
    pub total_score: f64,
    pub classification: Classification,
    pub hype_level: HypeLevel,
    pub tier: Option<MarketTier>,
    #[serde(default)]
    pub class: Option<String>,
    pub notes: Vec<String>,
}

impl From<&TokenAnalysis> for AnalysisLog {
    fn from(analysis: &TokenAnalysis) -> Self {
        Self {
            timestamp: analysis.analyzed_at,
            query: analysis.query.clone(),
            token_id: analysis.record.token.as_ref().map(|t| t.id.clone()),
            status: analysis.status,
            total_score: analysis.score.total,
            classification: analysis.score.classification,
            hype_level: analysis.hype.level,
            tier: analysis.tier,
            class: analysis.class.as_ref().map(|c| c.label.clone()),
            notes: analysis.provider_notes.clone(),
        }
    }
}

/// Appends analysis summaries to `analyses.jsonl`, one JSON object per line.
pub struct ReportLogger {
    log_path: PathBuf,
}

impl ReportLogger {
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("creating reports directory {}", log_dir.display()))?;

        Ok(Self {
            log_path: log_dir.join("analyses.jsonl"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub async fn log_analysis(&self, analysis: &TokenAnalysis) -> Result<()> {
        let entry = AnalysisLog::from(analysis);
        info!("Logging analysis of {} to {}", entry.query, self.log_path.display());

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .with_context(|| format!("opening {}", self.log_path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Every logged analysis, oldest first. Lines that fail to parse are skipped.
    pub async fn history(&self) -> Result<Vec<AnalysisLog>> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("reading analysis log"),
        };

        let mut logs = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => logs.push(entry),
                Err(e) => warn!("Skipping malformed log line {}: {}", idx + 1, e),
            }
        }

        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{AnalysisPoints, HypeAssessment, MarketContext, ScoreBreakdown};
    use crate::models::{CompositeTokenRecord, SentimentIndex};

    fn analysis(query: &str) -> TokenAnalysis {
        TokenAnalysis {
            query: query.to_string(),
            status: AnalysisStatus::Degraded,
            analyzed_at: Utc::now(),
            record: CompositeTokenRecord::default(),
            score: ScoreBreakdown::rejected(vec!["market data unavailable".to_string()]),
            hype: HypeAssessment::insufficient("limited"),
            tier: None,
            class: None,
            points: AnalysisPoints::default(),
            market_context: MarketContext::from_sentiment(&SentimentIndex::default()),
            provider_notes: vec!["market: coingecko_full failed".to_string()],
        }
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ReportLogger::new(dir.path()).unwrap();

        logger.log_analysis(&analysis("btc")).await.unwrap();
        logger.log_analysis(&analysis("eth")).await.unwrap();

        let history = logger.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "btc");
        assert_eq!(history[1].classification, Classification::Rejected);
        assert_eq!(history[1].hype_level, HypeLevel::InsufficientData);

        let raw = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_missing_log_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ReportLogger::new(&dir.path().join("nested")).unwrap();
        assert!(logger.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ReportLogger::new(dir.path()).unwrap();
        logger.log_analysis(&analysis("sol")).await.unwrap();
        std::fs::write(
            logger.path(),
            format!("{}not json\n", std::fs::read_to_string(logger.path()).unwrap()),
        )
        .unwrap();

        assert_eq!(logger.history().await.unwrap().len(), 1);
    }
}
