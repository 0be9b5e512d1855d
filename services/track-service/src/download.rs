//!
//! src/download.rs  Oct 18th, 2025
//!
//! Byte downloads with a fixed attempt budget and a fixed pause between
//! attempts. Only the calling task sleeps while waiting to retry.
//!

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::errors::ServiceError;

#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

#[async_trait]
impl<T: ByteFetcher + ?Sized> ByteFetcher for std::sync::Arc<T> {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        (**self).fetch_bytes(url).await
    }
}

pub struct RetryingDownloader<F> {
    fetcher: F,
    policy: RetryConfig
}

impl<F: ByteFetcher> RetryingDownloader<F> {
    pub fn new(fetcher: F, policy: RetryConfig) -> Self {
        Self { fetcher, policy }
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0_u8;
        loop {
            attempt += 1;
            info!(url = %url, attempt, "download.attempt");

            let failure = match self.fetcher.fetch_bytes(url).await {
                Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
                Ok(_) => ServiceError::Download(format!("empty response body from {url}")),
                Err(e) if !e.is_transient() => {
                    warn!(url = %url, error = %e, "download.fatal");
                    return Err(ServiceError::Download(format!("{url}: {e}")));
                }
                Err(e) => e
            };

            if attempt >= max_attempts {
                warn!(url = %url, attempts = attempt, error = %failure, "download.exhausted");
                return Err(ServiceError::Download(
                    format!("{url}: {failure} after {attempt} attempts")
                ));
            }
            warn!(
                url = %url, attempt, error = %failure,
                delay = ?self.policy.delay.as_millis(), "download.retry"
            );
            sleep(self.policy.delay).await;
        }
    }
}
