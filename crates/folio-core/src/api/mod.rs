//! REST client module for the dashboard API.
//!
//! This module provides the `AuthorizedHttpClient`, the one path by which
//! authenticated requests reach the backend, and `DashboardApi`, the typed
//! calls the front-end pages use on top of it.
//!
//! The API uses short-lived JWT bearer tokens renewed from a long-lived
//! refresh cookie; see [`crate::auth::SessionStore`].

pub mod client;
pub mod dashboard;
pub mod error;
pub mod request;

pub use client::AuthorizedHttpClient;
pub use dashboard::DashboardApi;
pub use error::ApiError;
pub use request::{ApiRequest, Outcome};
