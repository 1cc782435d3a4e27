//! Authentication module: the session store and its persistence helpers.
//!
//! This module provides:
//! - `SessionStore`: owner of the access credential and the refresh protocol
//! - `CredentialCache`: best-effort on-disk copy of the last access token
//! - `RefreshProofStore`: OS keychain storage for the long-lived refresh cookie
//!
//! The session always refreshes at start-up; cached tokens are hints only.

pub mod cache;
pub mod credentials;
pub mod session;

pub use cache::CredentialCache;
pub use credentials::RefreshProofStore;
pub use session::{Credential, Identity, SessionState, SessionStore, REFRESH_COOKIE};
