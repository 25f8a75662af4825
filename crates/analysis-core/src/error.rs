use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
///
/// The analytics core raises these typed failures; the HTTP boundary maps
/// them to status codes (see api-server's AppError).
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Bad symbol, interval, date window or request body. Surfaces as 400.
    #[error("validation failed: {0}")]
    Validation(String),

    /// TradingConfig lookup missed. Surfaces as 404.
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    /// Invariant violation on config create/update, with per-field messages.
    /// Surfaces as 400.
    #[error("config validation failed: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    /// Fewer bars than the analysis needs. Surfaces as 500, logged at warn.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Upstream returned non-2xx or the transport failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// 429s survived the full retry ladder. Treated like a fetch failure.
    #[error("rate limit exhausted: {0}")]
    RateLimitExhausted(String),

    /// Screener filter before the first refresh. Surfaces as 503.
    #[error("screener cache not ready")]
    CacheNotReady,

    /// Context cancellation. Propagated without error-level logging.
    #[error("operation cancelled")]
    Cancelled,

    /// Concurrent operation already in flight (refresh, scheduler start).
    /// Surfaces as 409.
    #[error("{0}")]
    Conflict(String),

    /// Log-only in the refresh path; never invalidates an in-memory publish.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// True for failures that per-symbol contexts record and skip rather
    /// than abort on.
    pub fn is_per_symbol_recoverable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Fetch(_)
                | AnalysisError::RateLimitExhausted(_)
                | AnalysisError::InsufficientData(_)
        )
    }
}
