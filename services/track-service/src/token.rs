//!
//! src/token.rs  Oct 18th, 2025
//!
//! Holds the catalog bearer credential. Refreshes are serialized behind a
//! single section and re-validated inside it, so a burst of callers that
//! all observe an expired token produces one token request.
//!

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;

/// Subtracted from the declared lifetime of every grant
pub const TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Result of one successful client-credentials exchange
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant
}

impl Credential {
    fn from_grant(grant: TokenGrant, now: Instant) -> Self {
        let lifetime = grant.expires_in.saturating_sub(TOKEN_SAFETY_MARGIN);
        Self { token: grant.access_token, expires_at: now + lifetime }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<TokenGrant, ServiceError>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for std::sync::Arc<T> {
    async fn fetch_token(&self) -> Result<TokenGrant, ServiceError> {
        (**self).fetch_token().await
    }
}

pub struct TokenCache<S> {
    source: S,
    current: RwLock<Option<Credential>>,
    refresh: Mutex<()>
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self { source, current: RwLock::new(None), refresh: Mutex::new(()) }
    }

    pub async fn get_token(&self) -> Result<String, ServiceError> {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _section = self.refresh.lock().await;
        // another caller may have refreshed while we waited
        if let Some(token) = self.valid_token().await {
            debug!("token.refresh.skipped");
            return Ok(token);
        }

        info!("token.refresh");
        let grant = self.source.fetch_token().await.map_err(|e| {
            warn!(error = %e, "token.refresh.failed");
            match e {
                ServiceError::Auth(_) => e,
                other => ServiceError::Auth(other.to_string())
            }
        })?;

        let credential = Credential::from_grant(grant, Instant::now());
        let token = credential.token.clone();
        *self.current.write().await = Some(credential);
        Ok(token)
    }

    /// Drops the held credential; the next call refreshes
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    #[cfg(test)]
    pub async fn seed(&self, token: &str, lifetime: Duration) {
        *self.current.write().await = Some(Credential {
            token: token.to_string(),
            expires_at: Instant::now() + lifetime
        });
    }

    pub(crate) async fn valid_token(&self) -> Option<String> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|c| !c.is_expired(Instant::now()))
            .map(|c| c.token.clone())
    }
}
