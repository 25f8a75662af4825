pub mod cache;
pub mod filter;
pub mod metrics;
pub mod ranker;

pub use cache::*;
pub use filter::*;
pub use metrics::*;
pub use ranker::*;
