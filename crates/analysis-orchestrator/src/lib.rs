pub mod analyzer;
pub mod refresh;

pub use analyzer::DivergenceAnalyzer;
pub use refresh::{RefreshPipeline, RefreshSummary};
