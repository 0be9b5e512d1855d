//!
//! src/config.rs  Oct 18th, 2025
//!
//! Environment driven configuration for the track service
//!

use url::Url;
use std::time;
use crate::errors::ServiceError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const DOWNLOAD_MAX_ATTEMPTS: u8 = 3;
pub const DOWNLOAD_RETRY_DELAY: u64 = 1000;

/// Wrapper over env::var to return an invalid enviroment var error
fn env_check(s: &str) -> Result<String, ServiceError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::Config(format!("{s} was not set"))),
    }
}

fn env_or(s: &str, default: &str) -> String {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string()
    }
}

fn env_parse<T: std::str::FromStr>(s: &str, default: T) -> T {
    std::env::var(s)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

// url.join drops the last segment unless the base ends in '/'
fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
}

// never print the secret
impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url.as_str())
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

fn parse_spotify_urls(token_url: &str, api_base: &str) -> Result<(Url, Url), ServiceError> {
    let token_url = Url::parse(token_url)
        .map_err(|e| ServiceError::Config(format!("SPOTIFY_TOKEN_URL invalid {e}")))?;

    let mut api_base = Url::parse(api_base)
        .map_err(|e| ServiceError::Config(format!("SPOTIFY_API_BASE invalid {e}")))?;

    // ensure valid https and hostname for both urls
    ensure_https(&token_url).map_err(ServiceError::Config)?;
    ensure_https(&api_base).map_err(ServiceError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com").map_err(ServiceError::Config)?;
    ensure_host(&api_base, "api.spotify.com").map_err(ServiceError::Config)?;

    ensure_trailing_slash(&mut api_base);
    Ok((token_url, api_base))
}

fn build_spotify() -> Result<SpotifyConfig, ServiceError> {
    let client_id     = env_check("SPOTIFY_CLIENT_ID")?;
    let client_secret = env_check("SPOTIFY_CLIENT_SECRET")?;

    let token_url = env_or("SPOTIFY_TOKEN_URL", "https://accounts.spotify.com/api/token");
    let api_base  = env_or("SPOTIFY_API_BASE", "https://api.spotify.com/v1/");
    let (token_url, api_base) = parse_spotify_urls(&token_url, &api_base)?;

    Ok( SpotifyConfig { client_id, client_secret, token_url, api_base })
}

///
/// Configuration for Http timeouts and the cover download retry policy
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub delay: time::Duration
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DOWNLOAD_MAX_ATTEMPTS,
            delay: time::Duration::from_millis(DOWNLOAD_RETRY_DELAY)
        }
    }
}

fn build_retry() -> RetryConfig {
    let defaults = RetryConfig::default();
    RetryConfig {
        max_attempts: env_parse("DOWNLOAD_MAX_ATTEMPTS", defaults.max_attempts).max(1),
        delay: time::Duration::from_millis(
            env_parse("DOWNLOAD_RETRY_DELAY_MS", DOWNLOAD_RETRY_DELAY)
        )
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for the track database and the cover image directory
///
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub db_url: String,
    pub cover_root: String
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite:./data/tracks.db".to_string(),
            cover_root: "./data/covers".to_string()
        }
    }
}

fn build_persistence() -> PersistenceConfig {
    let defaults = PersistenceConfig::default();
    PersistenceConfig {
        db_url: env_or("DATABASE_URL", &defaults.db_url),
        cover_root: env_or("COVER_STORAGE_DIR", &defaults.cover_root)
    }
}

/// Where the routing layer is reachable; cover urls are built from it
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub public_base_url: Url
}

fn build_service() -> Result<ServiceConfig, ServiceError> {
    let raw = env_or("PUBLIC_BASE_URL", "http://localhost:8080");
    let mut public_base_url = Url::parse(&raw)
        .map_err(|e| ServiceError::Config(format!("PUBLIC_BASE_URL invalid {e}")))?;
    ensure_trailing_slash(&mut public_base_url);
    Ok( ServiceConfig { public_base_url } )
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,track_service=debug,reqwest=warn,sqlx=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: true,
            include_file_line: true,
            include_target: true
        }
    }
}

fn build_logging() -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if env_or("LOG_FORMAT", "json").eq_ignore_ascii_case("pretty") {
        logging.format = LogFormat::Pretty;
    }
    logging
}

///
/// AppConfig which holds everything the service wires together
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub http: HttpConfig,
    pub persistence: PersistenceConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, ServiceError> {
    dotenvy::dotenv().ok();

    let spotify     = build_spotify()?;
    let http        = HttpConfig { retry: build_retry(), ..HttpConfig::default() };
    let persistence = build_persistence();
    let service     = build_service()?;
    let logging     = build_logging();

    Ok( AppConfig { spotify, http, persistence, service, logging } )
}
