//! The single choke point for authenticated calls to the dashboard API.
//!
//! `AuthorizedHttpClient` attaches the session's bearer credential to every
//! request and, when the backend answers 401, refreshes the session once and
//! resends once. Callers never handle the credential themselves.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ApiError, ApiRequest, Outcome};
use crate::auth::{Credential, Identity, SessionStore};

/// Authenticated client for the dashboard API.
/// Clone is cheap - the reqwest client and the session are shared.
#[derive(Clone)]
pub struct AuthorizedHttpClient {
    client: Client,
    session: Arc<SessionStore>,
}

impl AuthorizedHttpClient {
    /// Create a client bound to `session`, sharing its connection pool and
    /// cookie jar.
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            client: session.http_client(),
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Identity of the signed-in user, for building request paths.
    pub async fn identity(&self) -> Option<Identity> {
        self.session.identity().await
    }

    /// Send `request` with the current credential.
    ///
    /// - No cached credential: refresh first; if that yields nothing the
    ///   request goes out without Authorization and the 401 path decides.
    /// - 401: refresh exactly once; resend once with the new credential, or
    ///   return the original 401 when the refresh yields nothing.
    /// - Anything else is returned untouched.
    ///
    /// Only transport failures are errors.
    pub async fn authorized_request(&self, request: ApiRequest) -> Result<Outcome, ApiError> {
        let credential = match self.session.credential().await {
            Some(credential) => Some(credential),
            None => {
                debug!(url = %request.url, "No credential cached, refreshing before request");
                self.session.refresh().await
            }
        };

        let first = self.send(&request, credential.as_ref()).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(Outcome::Response(first));
        }

        debug!(method = %request.method, url = %request.url, "Request unauthorized, refreshing credential");
        let Some(fresh) = self.session.refresh().await else {
            return Ok(Outcome::Unauthorized {
                response: first,
                retried: false,
            });
        };

        let retry = self.send(&request, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!(method = %request.method, url = %request.url, "Request still unauthorized after refresh");
            return Ok(Outcome::Unauthorized {
                response: retry,
                retried: true,
            });
        }
        Ok(Outcome::Response(retry))
    }

    /// Like [`authorized_request`](Self::authorized_request), but gives up
    /// with [`ApiError::Cancelled`] as soon as `cancel` fires.
    pub async fn authorized_request_with_cancel(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %request.url, "Request cancelled");
                Err(ApiError::Cancelled)
            }
            outcome = self.authorized_request(request.clone()) => outcome,
        }
    }

    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<Response, ApiError> {
        let url = self.session.resolve_url(&request.url);
        let headers = Self::request_headers(&request.headers, credential)?;

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        debug!(
            method = %request.method,
            url = %url,
            status = response.status().as_u16(),
            authorized = credential.is_some(),
            "Request completed"
        );
        Ok(response)
    }

    /// Defaults, then caller headers, then the client-owned Authorization.
    fn request_headers(
        extra: &HeaderMap,
        credential: Option<&Credential>,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        for name in extra.keys() {
            headers.remove(name);
        }
        for (name, value) in extra.iter() {
            headers.append(name.clone(), value.clone());
        }

        headers.remove(header::AUTHORIZATION);
        if let Some(credential) = credential {
            headers.insert(header::AUTHORIZATION, credential.bearer_header()?);
        }
        Ok(headers)
    }
}
