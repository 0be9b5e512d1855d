//!
//! src/fetch.rs  Oct 18th, 2025
//!
//! Defines the catalog clients: request builders for the Spotify Web API,
//! the client-credentials token exchange, the authenticated track/album
//! lookups, and the plain byte fetch used for cover images
//!

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header, redirect};
use tracing::{debug, error};

use crate::config::{HttpConfig, SpotifyConfig};
use crate::download::ByteFetcher;
use crate::errors::ServiceError;
use crate::token::{TokenCache, TokenGrant, TokenSource};
use crate::types::{Isrc, SearchResponse, UpstreamAlbum, UpstreamTrack};

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, ServiceError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| ServiceError::Config(format!("build client: {e}")))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, ServiceError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_with_headers(http, h)
}

/// Client for binary downloads; no json accept header
pub fn download_client(http: &HttpConfig) -> Result<Client, ServiceError> {
    client_with_headers(http, header::HeaderMap::new())
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, ServiceError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    /// POST token_url, grant_type=client_credentials with basic auth
    pub fn token_request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/search?type=track&q=isrc:{ISRC}
    pub fn search_isrc(&self, isrc: &Isrc, bearer: &str) ->
        Result<reqwest::RequestBuilder, ServiceError> {
        let url = self.endpoint("search")?;
        let query = format!("isrc:{isrc}");
        Ok(self.http.get(url).bearer_auth(bearer).query(&[
            ("type", "track"),
            ("q", query.as_str())
        ]))
    }

    /// GET /v1/albums/{id}
    pub fn album(&self, album_id: &str, bearer: &str) ->
        Result<reqwest::RequestBuilder, ServiceError> {
        let url = self.endpoint(&format!("albums/{album_id}"))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ServiceError> {
        self.cfg.api_base.join(path)
            .map_err(|e| ServiceError::Config(format!("bad endpoint {path}: {e}")))
    }
}

///
/// Interprets a token endpoint reply. An `error` field fails the exchange
/// even on a 2xx status.
///
pub fn parse_token_response(status: StatusCode, body: &str) ->
    Result<TokenGrant, ServiceError> {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();

    if let Some(err) = json.as_ref().and_then(|v| v.get("error")) {
        let detail = json.as_ref()
            .and_then(|v| v.get("error_description"))
            .and_then(|v| v.as_str())
            .or_else(|| err.as_str())
            .unwrap_or("unknown authentication error");
        return Err(ServiceError::Auth(format!("token endpoint returned an error: {detail}")));
    }
    if !status.is_success() {
        return Err(ServiceError::Auth(format!("token request failed with status {status}")));
    }

    let json = json.ok_or_else(|| ServiceError::Auth("token response is not json".into()))?;
    let access_token = json.get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::Auth("no access_token in response".into()))?
        .to_string();
    let expires_in = json.get("expires_in")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ServiceError::Auth("no usable expires_in in response".into()))?;

    Ok(TokenGrant { access_token, expires_in: Duration::from_secs(expires_in) })
}

#[async_trait]
impl TokenSource for SpotifyClient {
    async fn fetch_token(&self) -> Result<TokenGrant, ServiceError> {
        let response = self.token_request()
            .send()
            .await
            .map_err(|e| ServiceError::Auth(format!("token request: {e}")))?;
        let status = response.status();
        let body = response.text()
            .await
            .map_err(|e| ServiceError::Auth(format!("token body: {e}")))?;
        let grant = parse_token_response(status, &body)?;
        debug!(expires_in = grant.expires_in.as_secs(), "token.granted");
        Ok(grant)
    }
}

///
/// Authenticated catalog lookups the acquisition workflow depends on
///
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// First search hit for the key; `NotFound` when there is none
    async fn track_by_isrc(&self, isrc: &Isrc) -> Result<UpstreamTrack, ServiceError>;

    async fn album_by_id(&self, album_id: &str) -> Result<UpstreamAlbum, ServiceError>;
}

pub struct SpotifyCatalog {
    client: Arc<SpotifyClient>,
    tokens: TokenCache<Arc<SpotifyClient>>
}

impl SpotifyCatalog {
    pub fn new(client: SpotifyClient) -> Self {
        let client = Arc::new(client);
        Self { tokens: TokenCache::new(client.clone()), client }
    }

    /// A rejected bearer drops the held credential so the next lookup refreshes
    async fn check_status(&self, status: StatusCode, what: &str) -> Result<(), ServiceError> {
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("{what} not found in catalog")));
        }
        error!(status = %status, what, "catalog.request.status");
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(ServiceError::Auth(format!("{what}: bearer rejected")));
        }
        Err(ServiceError::Http(format!("{what}: status {status}")))
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, what, "catalog.request.failed");
            ServiceError::from(e)
        })?;
        self.check_status(response.status(), what).await?;
        let body = response.bytes().await?;
        serde_json::from_slice::<T>(&body)
            .map_err(|e| ServiceError::Parse(format!("{what}: {e}")))
    }
}

#[async_trait]
impl CatalogApi for SpotifyCatalog {
    async fn track_by_isrc(&self, isrc: &Isrc) -> Result<UpstreamTrack, ServiceError> {
        debug!(isrc = %isrc, "catalog.search");
        let bearer = self.tokens.get_token().await?;
        let response: SearchResponse = self.send_json(
            self.client.search_isrc(isrc, &bearer)?,
            "track search"
        ).await?;
        response.tracks.items
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("No track found for ISRC: {isrc}")))
    }

    async fn album_by_id(&self, album_id: &str) -> Result<UpstreamAlbum, ServiceError> {
        debug!(album_id, "catalog.album");
        let bearer = self.tokens.get_token().await?;
        self.send_json(self.client.album(album_id, &bearer)?, "album").await
    }
}

/// Cover downloads over plain HTTP
pub struct HttpByteFetcher {
    http: Client
}

impl HttpByteFetcher {
    pub fn new(http_config: &HttpConfig) -> Result<Self, ServiceError> {
        Ok( Self { http: download_client(http_config)? } )
    }
}

#[async_trait]
impl ByteFetcher for HttpByteFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Http(format!("GET {url}: status {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
