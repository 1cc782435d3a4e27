//! Core library for folio, the portfolio dashboard client.
//!
//! Every authenticated call to the dashboard API goes through
//! [`AuthorizedHttpClient::authorized_request`], which attaches the bearer
//! credential held by the [`SessionStore`] and retries once after a silent
//! refresh when the backend answers 401.
//!
//! ```ignore
//! let config = Config::load()?.with_env_overrides();
//! let session = Arc::new(SessionStore::new(&config)?);
//! session.start().await;
//!
//! let api = DashboardApi::new(AuthorizedHttpClient::new(session.clone()));
//! let me = api.require_identity().await?;
//! let portfolio = api.portfolio(&me.id).await?;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiRequest, AuthorizedHttpClient, DashboardApi, Outcome};
pub use auth::{Credential, CredentialCache, Identity, RefreshProofStore, SessionState, SessionStore};
pub use config::Config;
