pub mod logger;

pub use logger::{AnalysisLog, ReportLogger};
