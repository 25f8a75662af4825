use std::time::Duration;

use analysis_core::AnalysisError;
use tokio_util::sync::CancellationToken;

/// Pre-declared retry schedule for vendor 429 responses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Backoff before each retry; the last entry is reused for any
    /// additional attempts.
    pub backoffs: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoffs: vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoffs
            .get(retry as usize)
            .or_else(|| self.backoffs.last())
            .copied()
            .unwrap_or(Duration::from_secs(5))
    }
}

/// Decorator around a base reqwest client that retries 429 responses.
///
/// Network errors pass through unretried; non-429 responses are returned
/// unchanged. Backoff waits observe the cancellation context.
#[derive(Debug, Clone)]
pub struct RetryTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, AnalysisError> {
        let mut retry = 0u32;
        loop {
            let attempt = request.try_clone().ok_or_else(|| {
                AnalysisError::Internal("request body is not cloneable".to_string())
            })?;

            let response = tokio::select! {
                _ = ctx.cancelled() => return Err(AnalysisError::Cancelled),
                result = self.client.execute(attempt) => {
                    result.map_err(|e| AnalysisError::Fetch(e.to_string()))?
                }
            };

            if response.status().as_u16() != 429 {
                return Ok(response);
            }
            if retry >= self.policy.max_retries {
                return Err(AnalysisError::RateLimitExhausted(format!(
                    "vendor still rate limiting after {} retries",
                    self.policy.max_retries
                )));
            }

            let backoff = self.policy.backoff_for(retry);
            tracing::warn!(
                retry = retry + 1,
                max_retries = self.policy.max_retries,
                backoff_secs = backoff.as_secs(),
                "vendor returned 429, backing off"
            );
            tokio::select! {
                _ = ctx.cancelled() => return Err(AnalysisError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            retry += 1;
        }
    }
}
