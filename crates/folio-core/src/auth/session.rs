//! Session state and the refresh protocol against the auth backend.
//!
//! `SessionStore` is the only owner of the access credential. It is built
//! once at start-up, shared behind an `Arc`, and handed to the
//! [`AuthorizedHttpClient`](crate::api::AuthorizedHttpClient).

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::cache::CredentialCache;
use crate::api::ApiError;
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

const REFRESH_PATH: &str = "/auth/refresh";
const IDENTITY_PATH: &str = "/auth/me";
const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const LOGOUT_PATH: &str = "/auth/logout";

/// Name of the long-lived cookie the auth backend sets on login.
pub const REFRESH_COOKIE: &str = "refreshToken";

// ============================================================================
// Credential / Identity
// ============================================================================

/// Short-lived bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Accepts a non-empty token that can travel in an Authorization header.
    pub(crate) fn parse(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() || HeaderValue::from_str(&token).is_err() {
            return None;
        }
        Some(Self(token))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub(crate) fn bearer_header(&self) -> Result<HeaderValue, ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))
            .map_err(|_| ApiError::InvalidRequest("credential is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// The signed-in user as reported by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Coarse view of the session for display and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Authenticated { identity_resolved: bool },
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Serialize)]
struct AccountRequest<'a> {
    email: &'a str,
    password: &'a str,
}

// ============================================================================
// SessionStore
// ============================================================================

#[derive(Debug, Default)]
struct SessionData {
    credential: Option<Credential>,
    identity: Option<Identity>,
    /// Bumped on every credential change (install or clear).
    generation: u64,
}

pub struct SessionStore {
    http: Client,
    jar: Arc<Jar>,
    base_url: String,
    cookie_url: Url,
    state: RwLock<SessionData>,
    /// Serializes refresh/login/clear so outcomes apply in completion order.
    refresh_lock: Mutex<()>,
    cache: Option<CredentialCache>,
}

impl SessionStore {
    /// Create an empty session for the configured API.
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let cookie_url = Url::parse(&base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .timeout(config.request_timeout())
            .cookie_provider(jar.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            jar,
            base_url,
            cookie_url,
            state: RwLock::new(SessionData::default()),
            refresh_lock: Mutex::new(()),
            cache: None,
        })
    }

    /// Attach a local credential cache used to seed the session at start-up.
    pub fn with_cache(mut self, cache: CredentialCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Client shared with the request pipeline; carries the cookie jar.
    pub(crate) fn http_client(&self) -> Client {
        self.http.clone()
    }

    /// Absolute URL for a backend path. Absolute URLs pass through.
    pub(crate) fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    // ===== Reads =====

    /// Cached credential. No network activity.
    pub(crate) async fn credential(&self) -> Option<Credential> {
        self.state.read().await.credential.clone()
    }

    /// User identity resolved from the current credential, if any.
    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    pub async fn state(&self) -> SessionState {
        let state = self.state.read().await;
        match state.credential {
            None => SessionState::Empty,
            Some(_) => SessionState::Authenticated {
                identity_resolved: state.identity.is_some(),
            },
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.credential.is_some()
    }

    // ===== Lifecycle =====

    /// Seed from the local cache (if any), then always attempt one refresh.
    ///
    /// The cached token is only a hint; a failed refresh discards it.
    pub async fn start(&self) -> Option<Credential> {
        if let Some(cached) = self.cache.as_ref().and_then(|cache| match cache.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable credential cache");
                None
            }
        }) {
            let mut state = self.state.write().await;
            if state.credential.is_none() {
                debug!("Seeded session from credential cache");
                state.credential = Some(cached);
                state.generation += 1;
            }
        }

        self.refresh().await
    }

    /// Exchange the refresh cookie for a new credential.
    ///
    /// Concurrent callers coalesce: whoever waits on an exchange that
    /// finishes first receives that exchange's outcome instead of starting
    /// another one. Failures clear the session and yield `None`.
    pub async fn refresh(&self) -> Option<Credential> {
        let observed = self.state.read().await.generation;
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.generation != observed {
                debug!(
                    generation = state.generation,
                    "Session changed while waiting, reusing latest outcome"
                );
                return state.credential.clone();
            }
        }

        match self.exchange_refresh().await {
            Ok(credential) => {
                debug!("Access token refreshed");
                self.install(credential.clone()).await;
                self.resolve_identity(&credential).await;
                Some(credential)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.clear_state().await;
                None
            }
        }
    }

    /// Look up the identity for `credential` via `/auth/me`.
    ///
    /// Failures leave the identity absent but never touch the credential.
    /// A result is only stored while `credential` is still the current one.
    pub async fn resolve_identity(&self, credential: &Credential) -> Option<Identity> {
        let lookup = self.lookup_identity(credential).await;

        let mut state = self.state.write().await;
        if state.credential.as_ref() != Some(credential) {
            debug!("Credential replaced during identity lookup, discarding result");
            return lookup.ok();
        }

        match lookup {
            Ok(identity) => {
                debug!(user_id = %identity.id, "Identity resolved");
                state.identity = Some(identity.clone());
                Some(identity)
            }
            Err(e) => {
                warn!(error = %e, "Identity lookup failed");
                state.identity = None;
                None
            }
        }
    }

    /// Sign out locally: drop credential, identity and the refresh cookie.
    pub async fn clear(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.clear_state().await;
        self.expire_refresh_proof();
    }

    // ===== Explicit sign-in / sign-out =====

    /// Create an account. Does not sign in.
    ///
    /// An email that is already registered yields [`ApiError::Conflict`].
    pub async fn register(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let email = email.trim().to_lowercase();
        let response = self
            .http
            .post(self.resolve_url(REGISTER_PATH))
            .json(&AccountRequest {
                email: &email,
                password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        info!(email = %email, "Account registered");
        Ok(())
    }

    /// Sign in with email and password. The backend's refresh cookie lands
    /// in this store's cookie jar.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let email = email.trim().to_lowercase();
        let response = self
            .http
            .post(self.resolve_url(LOGIN_PATH))
            .json(&AccountRequest {
                email: &email,
                password,
            })
            .send()
            .await?;

        let credential = Self::read_token(response).await?;
        info!(email = %email, "Signed in");
        self.install(credential.clone()).await;
        self.resolve_identity(&credential).await;
        Ok(credential)
    }

    /// Ask the backend to expire the refresh cookie, then clear locally.
    ///
    /// The local session and the cookie are dropped even when the request
    /// fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let result = self
            .http
            .post(self.resolve_url(LOGOUT_PATH))
            .send()
            .await;
        self.clear_state().await;
        self.expire_refresh_proof();

        let response = result?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        info!("Signed out");
        Ok(())
    }

    // ===== Refresh proof =====

    /// Current value of the refresh cookie held in the jar.
    pub fn refresh_proof(&self) -> Option<String> {
        let cookies = self.jar.cookies(&self.cookie_url)?;
        let cookies = cookies.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == REFRESH_COOKIE)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
    }

    /// Put a previously saved refresh cookie back into the jar.
    pub fn seed_refresh_proof(&self, proof: &str) {
        let cookie = format!("{}={}; Path=/", REFRESH_COOKIE, proof);
        self.jar.add_cookie_str(&cookie, &self.cookie_url);
    }

    fn expire_refresh_proof(&self) {
        let cookie = format!("{}=; Path=/; Max-Age=0", REFRESH_COOKIE);
        self.jar.add_cookie_str(&cookie, &self.cookie_url);
    }

    // ===== Internals =====

    async fn exchange_refresh(&self) -> Result<Credential, ApiError> {
        let response = self.http.post(self.resolve_url(REFRESH_PATH)).send().await?;
        Self::read_token(response).await
    }

    async fn read_token(response: reqwest::Response) -> Result<Credential, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("token response: {}", e)))?;

        parsed
            .access_token
            .and_then(Credential::parse)
            .ok_or_else(|| ApiError::InvalidResponse("token response without accessToken".into()))
    }

    async fn lookup_identity(&self, credential: &Credential) -> Result<Identity, ApiError> {
        let response = self
            .http
            .get(self.resolve_url(IDENTITY_PATH))
            .header(header::AUTHORIZATION, credential.bearer_header()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let parsed: IdentityResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("identity response: {}", e)))?;

        match parsed.id.filter(|id| !id.is_empty()) {
            Some(id) => Ok(Identity {
                id,
                email: parsed.email,
            }),
            None => Err(ApiError::InvalidResponse("identity response without id".into())),
        }
    }

    /// Replacing the credential drops the identity until it is resolved
    /// again.
    async fn install(&self, credential: Credential) {
        {
            let mut state = self.state.write().await;
            if state.credential.as_ref() != Some(&credential) {
                state.identity = None;
            }
            state.credential = Some(credential.clone());
            state.generation += 1;
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&credential) {
                warn!(error = %e, "Failed to write credential cache");
            }
        }
    }

    async fn clear_state(&self) {
        {
            let mut state = self.state.write().await;
            state.credential = None;
            state.identity = None;
            state.generation += 1;
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                warn!(error = %e, "Failed to remove credential cache");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
