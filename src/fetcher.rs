use std::future::Future;

use thiserror::Error;
use tracing::warn;

use crate::config::RetryPolicy;

#[derive(Debug, Error)]
pub enum FetchError<E: std::error::Error + 'static> {
    #[error("{label}: gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> FetchError<E> {
    /// Error returned by the final attempt.
    pub fn last_cause(&self) -> &E {
        match self {
            FetchError::Exhausted { source, .. } => source,
        }
    }
}

/// Runs chain calls with bounded retry and a fixed pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Call `operation` until it succeeds or `max_retries` attempts have failed.
    ///
    /// The pause is a `tokio::time::sleep`, so no lock or thread is held while
    /// waiting. `label` only feeds log lines and the final error.
    pub async fn fetch<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, FetchError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.policy.max_retries.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    return Err(FetchError::Exhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("{label} failed, retrying ({attempt}/{attempts}): {e}");
                    tokio::time::sleep(self.policy.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
