pub mod analyzer;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod monitoring;
pub mod providers;

pub use analyzer::{AnalysisStatus, TokenAnalysis, TokenAnalyzer};
pub use config::Config;
pub use error::{Result, TokenSeerError};
