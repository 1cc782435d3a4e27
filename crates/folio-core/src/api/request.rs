//! Request description and typed outcome of the authorized pipeline.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;

use super::ApiError;

/// A request that can be sent more than once (the body is kept as bytes).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) headers: HeaderMap,
}

impl ApiRequest {
    /// `url` is either absolute or a path relative to the API base URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not serializable: {}", e)))?;
        self.body = Some(bytes);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Extra header; replaces the default of the same name. An
    /// `Authorization` header set here is ignored by the pipeline.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// What `authorized_request` produced when the backend answered.
#[derive(Debug)]
pub enum Outcome {
    /// Any answer other than an unresolved 401, returned untouched.
    Response(Response),
    /// The 401 survived the pipeline. With `retried == false` the refresh
    /// yielded nothing and `response` is the original answer; with
    /// `retried == true` the single retry was rejected too.
    Unauthorized { response: Response, retried: bool },
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        self.response().status()
    }

    pub fn response(&self) -> &Response {
        match self {
            Outcome::Response(response) => response,
            Outcome::Unauthorized { response, .. } => response,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Outcome::Response(response) => response,
            Outcome::Unauthorized { response, .. } => response,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Outcome::Unauthorized { .. })
    }
}
