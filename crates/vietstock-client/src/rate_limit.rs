use std::time::Duration;

use analysis_core::AnalysisError;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Token bucket governing outbound request rate.
///
/// Capacity equals the per-minute budget; a background task adds one token
/// every `minute / requests_per_minute`, dropping tokens when the bucket is
/// full. Each request consumes one token, waiting for the next tick when
/// none is stored. A waiting acquirer aborts with `Cancelled` when its
/// operation context is cancelled.
pub struct TokenBucket {
    tokens: Mutex<mpsc::Receiver<()>>,
    refill: tokio::task::JoinHandle<()>,
}

impl TokenBucket {
    pub fn new(requests_per_minute: usize) -> Self {
        let capacity = requests_per_minute.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let tick = Duration::from_secs_f64(60.0 / capacity as f64);

        let refill = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                match tx.try_send(()) {
                    Ok(()) => {}
                    // Bucket full: the token is forfeited, keeping stored
                    // burst capacity bounded.
                    Err(mpsc::error::TrySendError::Full(())) => {}
                    Err(mpsc::error::TrySendError::Closed(())) => break,
                }
            }
        });

        Self {
            tokens: Mutex::new(rx),
            refill,
        }
    }

    /// Take one token, waiting for refill if necessary.
    pub async fn acquire(&self, ctx: &CancellationToken) -> Result<(), AnalysisError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(AnalysisError::Cancelled),
            token = async {
                let mut rx = self.tokens.lock().await;
                rx.recv().await
            } => match token {
                Some(()) => Ok(()),
                None => Err(AnalysisError::Internal(
                    "rate limiter refill task stopped".to_string(),
                )),
            },
        }
    }
}

impl Drop for TokenBucket {
    fn drop(&mut self) {
        self.refill.abort();
    }
}
